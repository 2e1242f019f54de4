mod auction_contents;
mod auction_request;
mod blinded_block;
mod builder_bid;
pub mod deneb;
pub mod electra;

use std::fmt;

pub use auction_contents::*;
pub use auction_request::*;
pub use blinded_block::*;
pub use builder_bid::*;
pub use ethereum_consensus::builder::SignedValidatorRegistration;

/// Forks with builder support carried by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Fork {
    Deneb,
    Electra,
}

impl fmt::Display for Fork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deneb => write!(f, "deneb"),
            Self::Electra => write!(f, "electra"),
        }
    }
}
