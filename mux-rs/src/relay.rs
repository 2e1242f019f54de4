use crate::{blinded_block_provider::Client, error::Error};
use ethereum_consensus::primitives::BlsPublicKey;
use std::{fmt, ops::Deref, str::FromStr};
use url::Url;

/// Identity of one upstream relay: its base URL and the long-lived public key
/// the relay signs bids with, carried in the userinfo part of the URL.
#[derive(Clone, Debug)]
pub struct RelayEndpoint {
    pub url: Url,
    pub public_key: BlsPublicKey,
}

impl TryFrom<Url> for RelayEndpoint {
    type Error = Error;

    fn try_from(url: Url) -> Result<Self, Self::Error> {
        if url.username().len() != 98 {
            return Err(Error::RelayUrlPublicKey(
                url,
                "public key field of relay URL must be 48 bytes of `0x`-prefixed hex".to_string(),
            ))
        }

        let bytes = hex::decode(url.username().trim_start_matches("0x"))
            .map_err(|err| Error::RelayUrlPublicKey(url.clone(), err.to_string()))?;
        let public_key = BlsPublicKey::try_from(bytes.as_ref())
            .map_err(|err| Error::RelayUrlPublicKey(url.clone(), err.to_string()))?;

        Ok(Self { url, public_key })
    }
}

impl FromStr for RelayEndpoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let url = Url::parse(s).map_err(|err| Error::RelayUrlParse(s.to_string(), err))?;
        Self::try_from(url)
    }
}

impl fmt::Display for RelayEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url.as_str())
    }
}

#[derive(Clone)]
pub struct Relay {
    api: Client,
    pub public_key: BlsPublicKey,
    pub endpoint: Url,
}

impl fmt::Debug for Relay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Relay")
            .field("public_key", &self.public_key)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl fmt::Display for Relay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.endpoint.as_str())
    }
}

impl Deref for Relay {
    type Target = Client;

    fn deref(&self) -> &Self::Target {
        &self.api
    }
}

impl Relay {
    pub fn new(
        endpoint: RelayEndpoint,
        header_client: reqwest::Client,
        payload_client: reqwest::Client,
    ) -> Self {
        let RelayEndpoint { url, public_key } = endpoint;
        let api = Client::new(url.clone(), header_client, payload_client);
        Self { api, public_key, endpoint: url }
    }
}
