use crate::{config::Config, relay_mux::RelayMux};
use futures::future::join_all;
use mux_rs::{blinded_block_provider::Server, Error, Network, Relay, RelayEndpoint};
use std::{net::Ipv4Addr, str::FromStr, time::Duration};
use tokio::task::JoinHandle;

fn parse_relay(input: &str) -> Option<RelayEndpoint> {
    if input.is_empty() {
        return None
    }
    RelayEndpoint::from_str(input)
        .map_err(|err| {
            tracing::warn!("error parsing relay from URL: `{err}`");
            err
        })
        .ok()
}

pub struct Service {
    host: Ipv4Addr,
    port: u16,
    network: Network,
    config: Config,
    relays: Vec<RelayEndpoint>,
}

impl Service {
    pub fn from(network: Network, config: Config) -> Self {
        let relays = config.relays.iter().filter_map(|input| parse_relay(input)).collect::<Vec<_>>();

        if relays.is_empty() {
            tracing::error!("no valid relays provided; please restart with correct configuration");
        }

        Self { host: config.host, port: config.port, network, config, relays }
    }

    pub async fn run(self) -> Result<(), Error> {
        let context = self.network.context()?;

        let header_client = reqwest::Client::builder()
            .timeout(Duration::from_millis(self.config.get_header_timeout_ms))
            .build()?;
        let payload_client = reqwest::Client::builder()
            .timeout(Duration::from_millis(self.config.get_payload_timeout_ms))
            .build()?;

        let relays = self
            .relays
            .iter()
            .cloned()
            .map(|endpoint| Relay::new(endpoint, header_client.clone(), payload_client.clone()))
            .collect::<Vec<_>>();
        for relay in &relays {
            tracing::info!(%relay, public_key = ?relay.public_key, "configured with relay");
        }

        let relay_mux = RelayMux::new(relays, context, &self.config);

        let mut tasks: Vec<JoinHandle<()>> = vec![];

        let relay_mux_clone = relay_mux.clone();
        tasks.push(tokio::spawn(async move {
            relay_mux_clone.run().await;
        }));

        let server = Server::new(self.host, self.port, relay_mux);
        tasks.push(tokio::spawn(async move {
            if let Err(err) = server.run().await {
                tracing::error!(%err, "builder API server failed");
            }
        }));

        join_all(tasks).await;
        Ok(())
    }

    /// Spawns the service on a new task returning the handle for it
    pub fn spawn(self) -> JoinHandle<Result<(), Error>> {
        tokio::spawn(self.run())
    }
}
