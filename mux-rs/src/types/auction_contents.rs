use crate::types::{deneb, electra, Fork};

/// The versioned payload body a relay returns when unblinding a block.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(tag = "version", content = "data", rename_all = "lowercase")]
pub enum AuctionContents {
    Deneb(deneb::ExecutionPayloadAndBlobsBundle),
    Electra(electra::ExecutionPayloadAndBlobsBundle),
}

impl AuctionContents {
    pub fn version(&self) -> Fork {
        match self {
            Self::Deneb(..) => Fork::Deneb,
            Self::Electra(..) => Fork::Electra,
        }
    }

    pub fn execution_payload(&self) -> &deneb::ExecutionPayload {
        match self {
            Self::Deneb(contents) => &contents.execution_payload,
            Self::Electra(contents) => &contents.execution_payload,
        }
    }

    pub fn blobs_bundle(&self) -> &deneb::BlobsBundle {
        match self {
            Self::Deneb(contents) => &contents.blobs_bundle,
            Self::Electra(contents) => &contents.blobs_bundle,
        }
    }
}
