use ethereum_consensus::primitives::{BlsPublicKey, Hash32, Slot};

/// Names one auction: the proposal slot plus the parent hash and proposer
/// public key every relay quotes against.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct AuctionRequest {
    pub slot: Slot,
    pub parent_hash: Hash32,
    pub public_key: BlsPublicKey,
}

impl std::fmt::Display for AuctionRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "auction at slot {} on parent {} for proposer {:?}",
            self.slot, self.parent_hash, self.public_key
        )
    }
}
