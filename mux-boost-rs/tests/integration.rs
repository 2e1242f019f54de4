use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use ethereum_consensus::{
    crypto::SecretKey,
    primitives::{BlsPublicKey, Hash32, U256},
    serde::try_bytes_from_hex_str,
    ssz::prelude::ByteList,
    state_transition::Context,
};
use mux_boost_rs::{Config, RelayMux, Service};
use mux_rs::{
    blinded_block_provider::{Client as RelayClient, RequestContext},
    signing::sign_builder_message,
    types::{
        deneb, AuctionContents, AuctionRequest, SignedBlindedBeaconBlock, SignedBuilderBid,
        SignedValidatorRegistration,
    },
    BlindedBlockProvider, Error, Network, Relay, RelayEndpoint,
};
use rand::Rng;
use std::{
    str::FromStr,
    sync::Arc,
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use url::Url;

fn setup_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "error".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

fn get_time() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs()
}

fn hash(fill: u8) -> Hash32 {
    Hash32::try_from([fill; 32].as_ref()).unwrap()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum HeaderMode {
    Normal,
    WrongParentHash,
    UnsignedBid,
    NoBid,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PayloadMode {
    Normal { delay_ms: u64 },
    WrongBlockHash { delay_ms: u64 },
    Silent,
}

#[derive(Clone)]
struct MockRelay {
    signing_key: Arc<SecretKey>,
    public_key: BlsPublicKey,
    context: Arc<Context>,
    value: u64,
    block_hash: Hash32,
    /// Stamped into the payload's `extra_data` so tests can tell which relay won.
    marker: u8,
    header_mode: HeaderMode,
    payload_mode: PayloadMode,
}

impl MockRelay {
    fn new(
        context: Arc<Context>,
        value: u64,
        block_hash: u8,
        marker: u8,
        header_mode: HeaderMode,
        payload_mode: PayloadMode,
    ) -> Self {
        let mut rng = rand::thread_rng();
        let signing_key = SecretKey::random(&mut rng).unwrap();
        let public_key = signing_key.public_key();
        Self {
            signing_key: Arc::new(signing_key),
            public_key,
            context,
            value,
            block_hash: hash(block_hash),
            marker,
            header_mode,
            payload_mode,
        }
    }
}

async fn handle_mock_header(
    State(relay): State<MockRelay>,
    Path((_slot, parent_hash, _public_key)): Path<(u64, String, String)>,
) -> Response {
    if relay.header_mode == HeaderMode::NoBid {
        return StatusCode::NO_CONTENT.into_response()
    }

    let parent_hash = match relay.header_mode {
        HeaderMode::WrongParentHash => hash(0xee),
        _ => {
            let bytes = try_bytes_from_hex_str(&parent_hash).unwrap();
            Hash32::try_from(bytes.as_ref()).unwrap()
        }
    };

    let mut bid = deneb::SignedBuilderBid::default();
    bid.message.header.parent_hash = parent_hash;
    bid.message.header.block_hash = relay.block_hash.clone();
    bid.message.header.transactions_root =
        ethereum_consensus::primitives::Root::try_from([0x33u8; 32].as_ref()).unwrap();
    bid.message.value = U256::from(relay.value);
    bid.message.public_key = relay.public_key.clone();
    if relay.header_mode != HeaderMode::UnsignedBid {
        bid.signature =
            sign_builder_message(&mut bid.message, &relay.signing_key, &relay.context).unwrap();
    }

    Json(SignedBuilderBid::Deneb(bid)).into_response()
}

async fn handle_mock_payload(
    State(relay): State<MockRelay>,
    Json(block): Json<SignedBlindedBeaconBlock>,
) -> Response {
    let delay_ms = match relay.payload_mode {
        PayloadMode::Silent => {
            tokio::time::sleep(Duration::from_secs(60)).await;
            return StatusCode::NO_CONTENT.into_response()
        }
        PayloadMode::Normal { delay_ms } | PayloadMode::WrongBlockHash { delay_ms } => delay_ms,
    };
    tokio::time::sleep(Duration::from_millis(delay_ms)).await;

    let mut contents = deneb::ExecutionPayloadAndBlobsBundle::default();
    contents.execution_payload.block_hash = match relay.payload_mode {
        PayloadMode::WrongBlockHash { .. } => hash(0xde),
        _ => block.block_hash().clone(),
    };
    contents.execution_payload.extra_data = ByteList::try_from(vec![relay.marker]).unwrap();

    Json(AuctionContents::Deneb(contents)).into_response()
}

async fn start_relay(port: u16, relay: MockRelay) -> RelayEndpoint {
    let public_key = relay.public_key.clone();
    let router = Router::new()
        .route("/eth/v1/builder/status", get(|| async { StatusCode::OK }))
        .route("/eth/v1/builder/validators", post(|| async { StatusCode::OK }))
        .route(
            "/eth/v1/builder/header/:slot/:parent_hash/:public_key",
            get(handle_mock_header),
        )
        .route("/eth/v1/builder/blinded_blocks", post(handle_mock_payload))
        .with_state(relay);
    let listener = TcpListener::bind(("127.0.0.1", port)).await.unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    RelayEndpoint::from_str(&format!("http://{public_key:?}@127.0.0.1:{port}")).unwrap()
}

fn test_config(payload_timeout_ms: u64) -> Config {
    Config {
        genesis_time: get_time(),
        slot_time_sec: 12,
        get_header_timeout_ms: 1000,
        get_payload_timeout_ms: payload_timeout_ms,
        request_max_retries: 0,
        ..Default::default()
    }
}

fn build_mux(endpoints: Vec<RelayEndpoint>, config: &Config) -> RelayMux {
    let header_client = reqwest::Client::builder()
        .timeout(Duration::from_millis(config.get_header_timeout_ms))
        .build()
        .unwrap();
    let payload_client = reqwest::Client::builder()
        .timeout(Duration::from_millis(config.get_payload_timeout_ms))
        .build()
        .unwrap();
    let relays = endpoints
        .into_iter()
        .map(|endpoint| Relay::new(endpoint, header_client.clone(), payload_client.clone()))
        .collect();
    RelayMux::new(relays, Context::for_mainnet(), config)
}

fn auction_request(slot: u64, parent_hash: u8) -> AuctionRequest {
    AuctionRequest { slot, parent_hash: hash(parent_hash), public_key: Default::default() }
}

fn blinded_block(slot: u64, block_hash: &Hash32) -> SignedBlindedBeaconBlock {
    let mut block = deneb::SignedBlindedBeaconBlock::default();
    block.message.slot = slot;
    block.message.body.execution_payload_header.block_hash = block_hash.clone();
    SignedBlindedBeaconBlock::Deneb(block)
}

fn payload_marker(contents: &AuctionContents) -> u8 {
    contents.execution_payload().extra_data.as_ref()[0]
}

#[tokio::test]
async fn test_auction_selects_highest_value() {
    setup_logging();
    let context = Arc::new(Context::for_mainnet());
    let config = test_config(1000);

    let relay_a = MockRelay::new(
        context.clone(),
        1000,
        0xaa,
        0xa1,
        HeaderMode::Normal,
        PayloadMode::Normal { delay_ms: 0 },
    );
    let relay_b = MockRelay::new(
        context.clone(),
        2000,
        0xbb,
        0xb2,
        HeaderMode::Normal,
        PayloadMode::Normal { delay_ms: 0 },
    );
    let winner_public_key = relay_b.public_key.clone();
    let endpoints = vec![
        start_relay(28600, relay_a).await,
        start_relay(28601, relay_b).await,
    ];

    let mux = build_mux(endpoints, &config);
    let request = auction_request(1, 0x01);
    let bid = mux.fetch_best_bid(&request, Some("mev-boost/test")).await.unwrap();
    assert_eq!(bid.value(), U256::from(2000u64));
    assert_eq!(bid.header().block_hash, hash(0xbb));

    // the cached record names the winning relay and the race returns its payload
    let block = blinded_block(1, &bid.header().block_hash);
    let (payload, original_bid) = mux.unblind_payload(&block, None).await;
    let original_bid = original_bid.unwrap();
    assert_eq!(original_bid.relays.len(), 1);
    assert_eq!(original_bid.relays[0].public_key, winner_public_key);
    assert_eq!(payload.unwrap().execution_payload().block_hash, hash(0xbb));
}

#[tokio::test]
async fn test_auction_tie_breaks_by_block_hash() {
    setup_logging();
    let context = Arc::new(Context::for_mainnet());
    let config = test_config(1000);

    let relay_a = MockRelay::new(
        context.clone(),
        1000,
        0x22,
        0xa1,
        HeaderMode::Normal,
        PayloadMode::Normal { delay_ms: 0 },
    );
    let relay_b = MockRelay::new(
        context.clone(),
        1000,
        0x11,
        0xb2,
        HeaderMode::Normal,
        PayloadMode::Normal { delay_ms: 0 },
    );
    let endpoints = vec![
        start_relay(28610, relay_a).await,
        start_relay(28611, relay_b).await,
    ];

    let mux = build_mux(endpoints, &config);
    let bid = mux.fetch_best_bid(&auction_request(1, 0x01), None).await.unwrap();
    assert_eq!(bid.value(), U256::from(1000u64));
    assert_eq!(bid.header().block_hash, hash(0x11));
}

#[tokio::test]
async fn test_auction_records_every_relay_offering_the_winning_hash() {
    setup_logging();
    let context = Arc::new(Context::for_mainnet());
    let config = test_config(1000);

    let relay_a = MockRelay::new(
        context.clone(),
        1000,
        0x33,
        0xa1,
        HeaderMode::Normal,
        PayloadMode::Normal { delay_ms: 0 },
    );
    let relay_b = MockRelay::new(
        context.clone(),
        1000,
        0x33,
        0xb2,
        HeaderMode::Normal,
        PayloadMode::Normal { delay_ms: 0 },
    );
    let endpoints = vec![
        start_relay(28620, relay_a).await,
        start_relay(28621, relay_b).await,
    ];

    let mux = build_mux(endpoints, &config);
    let bid = mux.fetch_best_bid(&auction_request(1, 0x01), None).await.unwrap();
    assert_eq!(bid.header().block_hash, hash(0x33));

    let block = blinded_block(1, &hash(0x33));
    let (_, original_bid) = mux.unblind_payload(&block, None).await;
    assert_eq!(original_bid.unwrap().relays.len(), 2);
}

#[tokio::test]
async fn test_auction_rejects_unsigned_bids_unless_check_disabled() {
    setup_logging();
    let context = Arc::new(Context::for_mainnet());

    let relay = MockRelay::new(
        context.clone(),
        1000,
        0xaa,
        0xa1,
        HeaderMode::UnsignedBid,
        PayloadMode::Normal { delay_ms: 0 },
    );
    let endpoint = start_relay(28630, relay).await;

    let config = test_config(1000);
    let mux = build_mux(vec![endpoint.clone()], &config);
    let result = mux.fetch_best_bid(&auction_request(1, 0x01), None).await;
    assert!(matches!(result, Err(Error::NoBids)));

    let mut config = test_config(1000);
    config.skip_relay_signature_check = true;
    let mux = build_mux(vec![endpoint], &config);
    let bid = mux.fetch_best_bid(&auction_request(1, 0x01), None).await.unwrap();
    assert_eq!(bid.value(), U256::from(1000u64));
}

#[tokio::test]
async fn test_auction_rejects_parent_hash_mismatch() {
    setup_logging();
    let context = Arc::new(Context::for_mainnet());
    let config = test_config(200);

    let relay = MockRelay::new(
        context.clone(),
        1000,
        0xaa,
        0xa1,
        HeaderMode::WrongParentHash,
        PayloadMode::Silent,
    );
    let endpoint = start_relay(28640, relay).await;

    let mux = build_mux(vec![endpoint], &config);
    let result = mux.fetch_best_bid(&auction_request(1, 0x01), None).await;
    assert!(matches!(result, Err(Error::NoBids)));

    // nothing was recorded for the rejected bid
    let block = blinded_block(1, &hash(0xaa));
    let (payload, original_bid) = mux.unblind_payload(&block, None).await;
    assert!(payload.is_none());
    assert!(original_bid.is_none());
}

#[tokio::test]
async fn test_payload_race_first_valid_wins() {
    setup_logging();
    let context = Arc::new(Context::for_mainnet());
    let config = test_config(2000);

    let relay_a = MockRelay::new(
        context.clone(),
        1000,
        0xaa,
        0xa1,
        HeaderMode::Normal,
        PayloadMode::Normal { delay_ms: 500 },
    );
    let relay_b = MockRelay::new(
        context.clone(),
        1000,
        0xaa,
        0xb2,
        HeaderMode::Normal,
        PayloadMode::Normal { delay_ms: 100 },
    );
    let endpoints = vec![
        start_relay(28650, relay_a).await,
        start_relay(28651, relay_b).await,
    ];

    let mux = build_mux(endpoints, &config);
    let block = blinded_block(1, &hash(0xaa));
    let started = Instant::now();
    let (payload, _) = mux.unblind_payload(&block, None).await;
    let elapsed = started.elapsed();

    let payload = payload.unwrap();
    assert_eq!(payload_marker(&payload), 0xb2);
    // the slower relay was not waited for
    assert!(elapsed < Duration::from_millis(450), "race took {elapsed:?}");
}

#[tokio::test]
async fn test_payload_race_skips_invalid_response() {
    setup_logging();
    let context = Arc::new(Context::for_mainnet());
    let config = test_config(2000);

    let relay_a = MockRelay::new(
        context.clone(),
        1000,
        0xaa,
        0xa1,
        HeaderMode::Normal,
        PayloadMode::WrongBlockHash { delay_ms: 50 },
    );
    let relay_b = MockRelay::new(
        context.clone(),
        1000,
        0xaa,
        0xb2,
        HeaderMode::Normal,
        PayloadMode::Normal { delay_ms: 300 },
    );
    let endpoints = vec![
        start_relay(28660, relay_a).await,
        start_relay(28661, relay_b).await,
    ];

    let mux = build_mux(endpoints, &config);
    let block = blinded_block(1, &hash(0xaa));
    let (payload, _) = mux.unblind_payload(&block, None).await;

    let payload = payload.unwrap();
    assert_eq!(payload_marker(&payload), 0xb2);
    assert_eq!(payload.execution_payload().block_hash, hash(0xaa));
}

#[tokio::test]
async fn test_payload_race_times_out_when_relays_are_silent() {
    setup_logging();
    let context = Arc::new(Context::for_mainnet());
    let config = test_config(300);

    let relay_a =
        MockRelay::new(context.clone(), 1000, 0xaa, 0xa1, HeaderMode::Normal, PayloadMode::Silent);
    let relay_b =
        MockRelay::new(context.clone(), 1000, 0xaa, 0xb2, HeaderMode::Normal, PayloadMode::Silent);
    let endpoints = vec![
        start_relay(28670, relay_a).await,
        start_relay(28671, relay_b).await,
    ];

    let mux = build_mux(endpoints, &config);
    let bid = mux.fetch_best_bid(&auction_request(1, 0x01), None).await.unwrap();

    let block = blinded_block(1, &bid.header().block_hash);
    let started = Instant::now();
    let (payload, original_bid) = mux.unblind_payload(&block, None).await;
    let elapsed = started.elapsed();

    assert!(payload.is_none());
    // the cached bid is still handed back so the caller can report it
    assert!(original_bid.is_some());
    assert!(elapsed >= Duration::from_millis(300), "race returned after {elapsed:?}");
    assert!(elapsed < Duration::from_millis(1500), "race took {elapsed:?}");
}

#[tokio::test]
async fn test_header_requests_with_malformed_inputs_are_rejected() {
    setup_logging();
    let context = Arc::new(Context::for_mainnet());

    let relay = MockRelay::new(
        context.clone(),
        1000,
        0xaa,
        0xa1,
        HeaderMode::Normal,
        PayloadMode::Normal { delay_ms: 0 },
    );
    let endpoint = start_relay(28691, relay).await;

    let mux_port = 28690;
    let mut config = test_config(1000);
    config.port = mux_port;
    config.relays.push(endpoint.to_string());
    let service = Service::from(Network::Mainnet, config);
    tokio::spawn(async move {
        let _ = service.run().await;
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut rng = rand::thread_rng();
    let public_key = SecretKey::random(&mut rng).unwrap().public_key();
    let valid_parent_hash = format!("{:?}", hash(0x01));
    let valid_public_key = format!("{public_key:?}");

    let http = reqwest::Client::new();

    // public key short of the 98-character form
    let response = http
        .get(format!(
            "http://127.0.0.1:{mux_port}/eth/v1/builder/header/1/{valid_parent_hash}/0x1234"
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["code"], 400);

    // parent hash short of the 66-character form
    let response = http
        .get(format!(
            "http://127.0.0.1:{mux_port}/eth/v1/builder/header/1/0xabcd/{valid_public_key}"
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["code"], 400);

    // right length but not hex is still a bad request
    let bad_hash = format!("0x{}", "zz".repeat(32));
    let response = http
        .get(format!(
            "http://127.0.0.1:{mux_port}/eth/v1/builder/header/1/{bad_hash}/{valid_public_key}"
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);

    // a well-formed request against the same instance still produces a bid
    let response = http
        .get(format!(
            "http://127.0.0.1:{mux_port}/eth/v1/builder/header/1/{valid_parent_hash}/{valid_public_key}"
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
}

#[tokio::test]
async fn test_end_to_end() {
    setup_logging();
    let context = Arc::new(Context::for_mainnet());

    let relay = MockRelay::new(
        context.clone(),
        1234,
        0xaa,
        0xa1,
        HeaderMode::Normal,
        PayloadMode::Normal { delay_ms: 0 },
    );
    let endpoint = start_relay(28680, relay).await;

    let mux_port = 28681;
    let mut config = test_config(1000);
    config.port = mux_port;
    config.relays.push(endpoint.to_string());
    let service = Service::from(Network::Mainnet, config);
    tokio::spawn(async move {
        let _ = service.run().await;
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let http = reqwest::Client::new();
    let beacon_node = RelayClient::new(
        Url::parse(&format!("http://127.0.0.1:{mux_port}")).unwrap(),
        http.clone(),
        http,
    );
    beacon_node.check_status().await.unwrap();

    let mut rng = rand::thread_rng();
    let signing_key = SecretKey::random(&mut rng).unwrap();
    let public_key = signing_key.public_key();
    let request_context = RequestContext {
        slot_uid: String::new(),
        user_agent: Some("mev-boost/test".to_string()),
    };

    let registration = ethereum_consensus::builder::ValidatorRegistration {
        fee_recipient: Default::default(),
        gas_limit: 30_000_000,
        timestamp: get_time(),
        public_key: public_key.clone(),
    };
    let signed_registration =
        SignedValidatorRegistration { message: registration, signature: Default::default() };
    beacon_node.register_validators(&[signed_registration], &request_context).await.unwrap();

    let slot = rng.gen_range(32..64);
    let auction_request =
        AuctionRequest { slot, parent_hash: hash(0x01), public_key: public_key.clone() };
    let signed_bid =
        beacon_node.fetch_best_bid(&auction_request, &request_context).await.unwrap().unwrap();
    assert_eq!(signed_bid.value(), U256::from(1234u64));
    assert_eq!(signed_bid.header().parent_hash, hash(0x01));

    let block = blinded_block(slot, &signed_bid.header().block_hash);
    let cancel = CancellationToken::new();
    let contents = beacon_node.open_bid(&block, &request_context, &cancel, 0).await.unwrap();
    assert_eq!(contents.execution_payload().block_hash, signed_bid.header().block_hash);
}
