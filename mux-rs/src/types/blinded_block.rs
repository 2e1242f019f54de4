use crate::types::{deneb, electra, Fork};
use ethereum_consensus::{
    deneb::{mainnet::MAX_BLOB_COMMITMENTS_PER_BLOCK, polynomial_commitments::KzgCommitment},
    primitives::{Hash32, Slot},
    ssz::prelude::List,
};

/// A signed blinded beacon block as submitted by the proposer.
///
/// The wire format carries no version tag; Electra is tried first since its
/// body is a strict superset of Deneb's.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum SignedBlindedBeaconBlock {
    Electra(electra::SignedBlindedBeaconBlock),
    Deneb(deneb::SignedBlindedBeaconBlock),
}

impl SignedBlindedBeaconBlock {
    pub fn version(&self) -> Fork {
        match self {
            Self::Electra(..) => Fork::Electra,
            Self::Deneb(..) => Fork::Deneb,
        }
    }

    pub fn slot(&self) -> Slot {
        match self {
            Self::Electra(block) => block.message.slot,
            Self::Deneb(block) => block.message.slot,
        }
    }

    pub fn execution_payload_header(&self) -> &deneb::ExecutionPayloadHeader {
        match self {
            Self::Electra(block) => &block.message.body.execution_payload_header,
            Self::Deneb(block) => &block.message.body.execution_payload_header,
        }
    }

    pub fn block_hash(&self) -> &Hash32 {
        &self.execution_payload_header().block_hash
    }

    pub fn parent_hash(&self) -> &Hash32 {
        &self.execution_payload_header().parent_hash
    }

    pub fn blob_kzg_commitments(&self) -> &List<KzgCommitment, MAX_BLOB_COMMITMENTS_PER_BLOCK> {
        match self {
            Self::Electra(block) => &block.message.body.blob_kzg_commitments,
            Self::Deneb(block) => &block.message.body.blob_kzg_commitments,
        }
    }
}
