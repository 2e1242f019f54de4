use ethereum_consensus::primitives::Slot;
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Debug)]
struct State {
    slot: Slot,
    uid: Uuid,
}

/// Tracks the per-slot correlation identifier forwarded to relays.
///
/// The slot never moves backwards: observing an older slot after a newer one
/// returns the identifier of the newer slot.
#[derive(Debug)]
pub struct SlotUidRegistry {
    state: Mutex<State>,
}

impl SlotUidRegistry {
    pub fn new() -> Self {
        Self { state: Mutex::new(State { slot: 0, uid: Uuid::new_v4() }) }
    }

    /// Advances the registry to `slot` if it is newer, minting a fresh
    /// identifier, and returns the current identifier.
    pub fn observe(&self, slot: Slot) -> Uuid {
        let mut state = self.state.lock().unwrap();
        if slot > state.slot {
            state.slot = slot;
            state.uid = Uuid::new_v4();
        }
        state.uid
    }

    pub fn current(&self) -> (Slot, Uuid) {
        let state = self.state.lock().unwrap();
        (state.slot, state.uid)
    }
}

impl Default for SlotUidRegistry {
    fn default() -> Self {
        Self::new()
    }
}
