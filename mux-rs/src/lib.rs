pub mod blinded_block_provider;
mod error;
mod network;
mod relay;
pub mod serde;
pub mod signing;
pub mod types;

pub use blinded_block_provider::BlindedBlockProvider;
pub use error::Error;
pub use network::Network;
pub use relay::{Relay, RelayEndpoint};
