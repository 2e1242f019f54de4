use crate::{
    error::Error,
    types::{
        AuctionContents, AuctionRequest, SignedBlindedBeaconBlock, SignedBuilderBid,
        SignedValidatorRegistration,
    },
};
use reqwest::{header::USER_AGENT, RequestBuilder, StatusCode};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio_util::sync::CancellationToken;
use url::Url;

/// Correlates the header and payload requests of one auction across relays.
pub const SLOT_UID_HEADER: &str = "X-MEVBoost-SlotUID";
/// Wall-clock request start in milliseconds since the unix epoch.
pub const START_TIME_UNIX_MS_HEADER: &str = "X-MEVBoost-StartTimeUnixMS";

/// Per-request metadata forwarded to every relay.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub slot_uid: String,
    pub user_agent: Option<String>,
}

fn unix_timestamp_ms() -> u128 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|duration| duration.as_millis()).unwrap_or_default()
}

/// A `Client` for a relay implementing the Builder APIs.
#[derive(Clone, Debug)]
pub struct Client {
    endpoint: Url,
    header_client: reqwest::Client,
    payload_client: reqwest::Client,
}

impl Client {
    pub fn new(endpoint: Url, header_client: reqwest::Client, payload_client: reqwest::Client) -> Self {
        // relay URLs carry the public key in the userinfo; it must not leak
        // into the request line or turn into basic auth
        let mut endpoint = endpoint;
        let _ = endpoint.set_username("");
        let _ = endpoint.set_password(None);
        Self { endpoint, header_client, payload_client }
    }

    fn url(&self, path: &str) -> Result<Url, Error> {
        self.endpoint
            .join(path)
            .map_err(|err| Error::RelayUrlParse(format!("{}{path}", self.endpoint), err))
    }

    fn apply_context(request: RequestBuilder, context: &RequestContext) -> RequestBuilder {
        let request = request
            .header(SLOT_UID_HEADER, &context.slot_uid)
            .header(START_TIME_UNIX_MS_HEADER, unix_timestamp_ms().to_string());
        match &context.user_agent {
            Some(user_agent) => request.header(USER_AGENT, user_agent),
            None => request,
        }
    }

    async fn api_error_for(response: reqwest::Response) -> Error {
        let status = response.status().as_u16();
        let message = response.text().await.unwrap_or_default();
        Error::Api { status, message }
    }

    pub async fn check_status(&self) -> Result<(), Error> {
        let response = self.header_client.get(self.url("/eth/v1/builder/status")?).send().await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::api_error_for(response).await)
        }
    }

    pub async fn register_validators(
        &self,
        registrations: &[SignedValidatorRegistration],
        context: &RequestContext,
    ) -> Result<(), Error> {
        let request =
            self.header_client.post(self.url("/eth/v1/builder/validators")?).json(&registrations);
        let response = Self::apply_context(request, context).send().await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::api_error_for(response).await)
        }
    }

    /// Fetches this relay's bid for the auction, if it prepared one.
    ///
    /// Returns `Ok(None)` on an empty (204) response. The request deadline is
    /// the header client's configured timeout; header requests are never
    /// retried.
    pub async fn fetch_best_bid(
        &self,
        auction_request: &AuctionRequest,
        context: &RequestContext,
    ) -> Result<Option<SignedBuilderBid>, Error> {
        let AuctionRequest { slot, parent_hash, public_key } = auction_request;
        let target = self.url(&format!("/eth/v1/builder/header/{slot}/{parent_hash:?}/{public_key:?}"))?;
        let request = Self::apply_context(self.header_client.get(target), context);
        let response = request.send().await?;

        if response.status() == StatusCode::NO_CONTENT {
            return Ok(None)
        }
        if !response.status().is_success() {
            return Err(Self::api_error_for(response).await)
        }

        let signed_bid: SignedBuilderBid = response.json().await?;
        Ok(Some(signed_bid))
    }

    /// Posts the signed blinded block to this relay to recover the full
    /// payload, retrying up to `max_retries` times.
    ///
    /// Cancelling `cancel` aborts the request (including any retries still
    /// pending) with [`Error::Cancelled`].
    pub async fn open_bid(
        &self,
        signed_block: &SignedBlindedBeaconBlock,
        context: &RequestContext,
        cancel: &CancellationToken,
        max_retries: u32,
    ) -> Result<AuctionContents, Error> {
        let target = self.url("/eth/v1/builder/blinded_blocks")?;
        let mut attempt = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled)
            }

            let request = self.payload_client.post(target.clone()).json(signed_block);
            let request = Self::apply_context(request, context);
            let outcome = tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                outcome = async {
                    let response = request.send().await?;
                    if !response.status().is_success() {
                        return Err(Self::api_error_for(response).await)
                    }
                    let contents: AuctionContents = response.json().await?;
                    Ok(contents)
                } => outcome,
            };

            let err = match outcome {
                Ok(contents) => return Ok(contents),
                Err(err) => err,
            };
            if attempt >= max_retries {
                return Err(err)
            }
            attempt += 1;
            tracing::debug!(%target, attempt, %err, "retrying payload request");
        }
    }
}
