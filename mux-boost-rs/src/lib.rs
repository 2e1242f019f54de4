mod bid_cache;
mod config;
mod metrics;
mod relay_mux;
mod service;
mod slot_uid;

pub use bid_cache::{BidCache, BidRecord};
pub use config::{Config, ConfigFile};
pub use relay_mux::RelayMux;
pub use service::Service;
pub use slot_uid::SlotUidRegistry;
