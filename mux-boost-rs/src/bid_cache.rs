use ethereum_consensus::primitives::{Hash32, Slot};
use mux_rs::{
    types::{BidInfo, SignedBuilderBid},
    Relay,
};
use std::{collections::HashMap, sync::Mutex, time::SystemTime};

/// The winning bid of one auction, kept until the proposer unblinds it.
#[derive(Debug, Clone)]
pub struct BidRecord {
    pub response: SignedBuilderBid,
    pub bid_info: BidInfo,
    /// Every relay that delivered the winning block hash.
    pub relays: Vec<Relay>,
    pub received_at: SystemTime,
}

/// Winning bids keyed by `(slot, block_hash)`.
#[derive(Debug, Default)]
pub struct BidCache {
    bids: Mutex<HashMap<(Slot, Hash32), BidRecord>>,
}

impl BidCache {
    pub fn put(&self, slot: Slot, block_hash: Hash32, record: BidRecord) {
        if record.relays.is_empty() {
            tracing::warn!(slot, %block_hash, "refusing to record a winning bid without relays");
            return
        }
        self.bids.lock().unwrap().insert((slot, block_hash), record);
    }

    pub fn get(&self, slot: Slot, block_hash: &Hash32) -> Option<BidRecord> {
        self.bids.lock().unwrap().get(&(slot, block_hash.clone())).cloned()
    }

    /// Drops every record for a slot older than `slot`, returning how many
    /// were removed.
    pub fn prune_below(&self, slot: Slot) -> usize {
        let mut bids = self.bids.lock().unwrap();
        let before = bids.len();
        bids.retain(|(bid_slot, _), _| *bid_slot >= slot);
        before - bids.len()
    }
}
