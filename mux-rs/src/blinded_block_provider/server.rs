use crate::{
    blinded_block_provider::BlindedBlockProvider,
    error::Error,
    types::{
        AuctionContents, AuctionRequest, SignedBlindedBeaconBlock, SignedBuilderBid,
        SignedValidatorRegistration,
    },
};
use axum::{
    extract::{Json, Path, State},
    http::{header::USER_AGENT, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use ethereum_consensus::{
    primitives::{BlsPublicKey, Hash32, Slot},
    serde::try_bytes_from_hex_str,
};
use std::net::{Ipv4Addr, SocketAddr};
use tokio::{net::TcpListener, task::JoinHandle};

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let code = match self {
            Self::InvalidPublicKey | Self::InvalidHash => StatusCode::BAD_REQUEST,
            Self::NoBids => return StatusCode::NO_CONTENT.into_response(),
            Self::MissingPayload(..) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = serde_json::json!({
            "code": code.as_u16(),
            "message": self.to_string(),
        });
        (code, Json(body)).into_response()
    }
}

fn user_agent(headers: &HeaderMap) -> Option<&str> {
    headers.get(USER_AGENT).and_then(|value| value.to_str().ok())
}

pub(crate) async fn handle_status_check() -> impl IntoResponse {
    StatusCode::OK
}

pub(crate) async fn handle_validator_registration<B: BlindedBlockProvider>(
    State(builder): State<B>,
    headers: HeaderMap,
    Json(mut registrations): Json<Vec<SignedValidatorRegistration>>,
) -> Result<(), Error> {
    tracing::trace!(count = registrations.len(), "processing validator registrations");
    builder.register_validators(&mut registrations, user_agent(&headers)).await
}

pub(crate) async fn handle_fetch_bid<B: BlindedBlockProvider>(
    State(builder): State<B>,
    headers: HeaderMap,
    Path((slot, parent_hash, public_key)): Path<(Slot, String, String)>,
) -> Result<Json<SignedBuilderBid>, Error> {
    if public_key.len() != 98 {
        return Err(Error::InvalidPublicKey)
    }
    if parent_hash.len() != 66 {
        return Err(Error::InvalidHash)
    }
    let parent_hash = try_bytes_from_hex_str(&parent_hash)
        .map_err(|_| Error::InvalidHash)
        .and_then(|bytes| Hash32::try_from(bytes.as_ref()).map_err(|_| Error::InvalidHash))?;
    let public_key = try_bytes_from_hex_str(&public_key)
        .map_err(|_| Error::InvalidPublicKey)
        .and_then(|bytes| BlsPublicKey::try_from(bytes.as_ref()).map_err(|_| Error::InvalidPublicKey))?;

    let auction_request = AuctionRequest { slot, parent_hash, public_key };
    let signed_bid = builder.fetch_best_bid(&auction_request, user_agent(&headers)).await?;
    tracing::trace!(%auction_request, %signed_bid, "returning bid");
    Ok(Json(signed_bid))
}

pub(crate) async fn handle_open_bid<B: BlindedBlockProvider>(
    State(builder): State<B>,
    headers: HeaderMap,
    Json(block): Json<SignedBlindedBeaconBlock>,
) -> Result<Json<AuctionContents>, Error> {
    let auction_contents = builder.open_bid(&block, user_agent(&headers)).await?;
    let block_hash = auction_contents.execution_payload().block_hash.clone();
    let slot = block.slot();
    tracing::trace!(%slot, %block_hash, "returning payload");
    Ok(Json(auction_contents))
}

pub struct Server<B: BlindedBlockProvider> {
    host: Ipv4Addr,
    port: u16,
    builder: B,
}

impl<B: BlindedBlockProvider + Clone + Send + Sync + 'static> Server<B> {
    pub fn new(host: Ipv4Addr, port: u16, builder: B) -> Self {
        Self { host, port, builder }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/eth/v1/builder/status", get(handle_status_check))
            .route("/eth/v1/builder/validators", post(handle_validator_registration::<B>))
            .route(
                "/eth/v1/builder/header/:slot/:parent_hash/:public_key",
                get(handle_fetch_bid::<B>),
            )
            .route("/eth/v1/builder/blinded_blocks", post(handle_open_bid::<B>))
            .with_state(self.builder.clone())
    }

    pub async fn run(&self) -> Result<(), Error> {
        let router = self.router();
        let addr = SocketAddr::from((self.host, self.port));
        let listener = TcpListener::bind(addr).await?;
        tracing::info!("listening at {addr}...");
        axum::serve(listener, router).await.map_err(From::from)
    }

    /// Spawns the server on a new task returning the handle for it
    pub fn spawn(self) -> JoinHandle<Result<(), Error>> {
        tokio::spawn(async move {
            let result = self.run().await;
            if let Err(ref err) = result {
                tracing::error!(%err, "error while listening for incoming")
            }
            result
        })
    }
}
