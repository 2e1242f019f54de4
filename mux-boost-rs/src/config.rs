use ethereum_consensus::primitives::U256;
use mux_rs::Network;
use serde::Deserialize;
use std::{io, net::Ipv4Addr, path::Path};
use thiserror::Error;

pub const MAINNET_GENESIS_TIME: u64 = 1_606_824_023;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("could not parse TOML: {0}")]
    Toml(#[from] toml::de::Error),
}

/// On-disk layout of the config file the binary loads.
#[derive(Debug, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub network: Network,
    #[serde(default)]
    pub boost: Config,
}

impl ConfigFile {
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let config_data = std::fs::read_to_string(path.as_ref())?;
        toml::from_str(&config_data).map_err(From::from)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub host: Ipv4Addr,
    pub port: u16,
    /// Relay endpoints, each with the relay public key in the URL userinfo.
    pub relays: Vec<String>,
    /// Unix timestamp (seconds) of the chain genesis.
    pub genesis_time: u64,
    pub slot_time_sec: u64,
    /// Bids below this value (wei) are dropped.
    #[serde(with = "mux_rs::serde::as_str")]
    pub min_bid_wei: U256,
    pub skip_relay_signature_check: bool,
    /// Total deadline for one header request to one relay.
    pub get_header_timeout_ms: u64,
    /// Wall-clock deadline for the whole unblinding race, and the deadline
    /// for each individual payload request.
    pub get_payload_timeout_ms: u64,
    /// Payload requests only; header requests are never retried.
    pub request_max_retries: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: Ipv4Addr::UNSPECIFIED,
            port: 18550,
            relays: vec![],
            genesis_time: MAINNET_GENESIS_TIME,
            slot_time_sec: 12,
            min_bid_wei: U256::ZERO,
            skip_relay_signature_check: false,
            get_header_timeout_ms: 950,
            get_payload_timeout_ms: 4000,
            request_max_retries: 5,
        }
    }
}
