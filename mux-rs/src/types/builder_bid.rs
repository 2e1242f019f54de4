use crate::{
    signing::verify_signed_builder_message,
    types::{deneb, electra, Fork},
};
use ethereum_consensus::{
    primitives::{BlsPublicKey, BlsSignature, Hash32, Root, U256},
    state_transition::Context,
    Error,
};
use std::fmt;

/// The signed, versioned envelope a relay returns from the header endpoint.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(tag = "version", content = "data", rename_all = "lowercase")]
pub enum SignedBuilderBid {
    Deneb(deneb::SignedBuilderBid),
    Electra(electra::SignedBuilderBid),
}

/// The handful of bid fields the auction inspects, pulled out of the
/// fork-specific envelope once so downstream code stays fork-agnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BidInfo {
    pub value: U256,
    pub block_hash: Hash32,
    pub parent_hash: Hash32,
    pub block_number: u64,
    pub transactions_root: Root,
    pub builder_public_key: BlsPublicKey,
}

impl SignedBuilderBid {
    pub fn version(&self) -> Fork {
        match self {
            Self::Deneb(..) => Fork::Deneb,
            Self::Electra(..) => Fork::Electra,
        }
    }

    pub fn header(&self) -> &deneb::ExecutionPayloadHeader {
        match self {
            Self::Deneb(bid) => &bid.message.header,
            Self::Electra(bid) => &bid.message.header,
        }
    }

    pub fn value(&self) -> U256 {
        match self {
            Self::Deneb(bid) => bid.message.value,
            Self::Electra(bid) => bid.message.value,
        }
    }

    pub fn public_key(&self) -> &BlsPublicKey {
        match self {
            Self::Deneb(bid) => &bid.message.public_key,
            Self::Electra(bid) => &bid.message.public_key,
        }
    }

    pub fn signature(&self) -> &BlsSignature {
        match self {
            Self::Deneb(bid) => &bid.signature,
            Self::Electra(bid) => &bid.signature,
        }
    }

    pub fn bid_info(&self) -> BidInfo {
        let header = self.header();
        BidInfo {
            value: self.value(),
            block_hash: header.block_hash.clone(),
            parent_hash: header.parent_hash.clone(),
            block_number: header.block_number,
            transactions_root: header.transactions_root.clone(),
            builder_public_key: self.public_key().clone(),
        }
    }

    /// Verifies the builder signature over the bid message under `public_key`
    /// and the builder domain for the configured network.
    pub fn verify_signature(
        &mut self,
        public_key: &BlsPublicKey,
        context: &Context,
    ) -> Result<(), Error> {
        match self {
            Self::Deneb(bid) => {
                let signature = bid.signature.clone();
                verify_signed_builder_message(&mut bid.message, &signature, public_key, context)
            }
            Self::Electra(bid) => {
                let signature = bid.signature.clone();
                verify_signed_builder_message(&mut bid.message, &signature, public_key, context)
            }
        }
    }
}

impl fmt::Display for SignedBuilderBid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let block_hash = &self.header().block_hash;
        let value = self.value();
        write!(f, "block hash {block_hash} and value {value}")
    }
}
