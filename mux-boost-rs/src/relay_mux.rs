use crate::{
    bid_cache::{BidCache, BidRecord},
    config::Config,
    metrics::{self, ApiMethod, RaceOutcome},
    slot_uid::SlotUidRegistry,
};
use async_trait::async_trait;
use ethereum_consensus::{
    primitives::{BlsPublicKey, Hash32, Slot, U256},
    state_transition::Context,
};
use futures::future::join_all;
use mux_rs::{
    blinded_block_provider::RequestContext,
    types::{
        AuctionContents, AuctionRequest, BidInfo, Fork, SignedBlindedBeaconBlock, SignedBuilderBid,
        SignedValidatorRegistration,
    },
    BlindedBlockProvider, Error, Relay,
};
use std::{
    collections::HashMap,
    ops::Deref,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    time::{Duration, SystemTime, UNIX_EPOCH},
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// SSZ hash tree root of an empty transaction list.
const EMPTY_TRANSACTIONS_ROOT: [u8; 32] = [
    0x7f, 0xfe, 0x24, 0x1e, 0xa6, 0x01, 0x87, 0xfd, 0xb0, 0x18, 0x7b, 0xfa, 0x22, 0xde, 0x35,
    0xd1, 0xf9, 0xbe, 0xd7, 0xab, 0x06, 0x1d, 0x94, 0x01, 0xfd, 0x47, 0xe3, 0x4a, 0x54, 0xfb,
    0xed, 0xe1,
];

/// Cached auctions this many slots behind the head are dropped.
const BID_RETENTION_SLOTS: u64 = 4;

fn unix_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis() as u64)
        .unwrap_or_default()
}

fn ms_into_slot(genesis_time: u64, slot_time_sec: u64, slot: Slot) -> i64 {
    let slot_start_ms = (genesis_time + slot * slot_time_sec) as i64 * 1000;
    unix_timestamp_ms() as i64 - slot_start_ms
}

/// Reasons one relay's bid is dropped from the auction. Logged per relay,
/// never surfaced to the proposer.
#[derive(Debug, thiserror::Error)]
enum BidRejection {
    #[error("bid has an empty block hash")]
    EmptyBlockHash,
    #[error("bid public key {bid:?} does not match the relay public key {relay:?}")]
    PublicKeyMismatch { relay: BlsPublicKey, bid: BlsPublicKey },
    #[error("bid signature does not verify: {0}")]
    InvalidSignature(#[source] ethereum_consensus::Error),
    #[error("bid parent hash {bid} does not match the proposer parent hash {expected}")]
    ParentHashMismatch { expected: Hash32, bid: Hash32 },
    #[error("bid has zero value or an empty transaction list")]
    ZeroValueOrEmptyTransactions,
    #[error("bid value {value} is below the minimum bid {min_bid}")]
    BelowMinBid { value: U256, min_bid: U256 },
}

/// Applies every acceptance predicate to a candidate bid.
fn validate_bid(
    bid: &mut SignedBuilderBid,
    relay_public_key: &BlsPublicKey,
    auction_request: &AuctionRequest,
    context: &Context,
    min_bid: &U256,
    skip_signature_check: bool,
) -> Result<BidInfo, BidRejection> {
    let bid_info = bid.bid_info();

    if bid_info.block_hash == Hash32::default() {
        return Err(BidRejection::EmptyBlockHash)
    }
    if &bid_info.builder_public_key != relay_public_key {
        return Err(BidRejection::PublicKeyMismatch {
            relay: relay_public_key.clone(),
            bid: bid_info.builder_public_key,
        })
    }
    if !skip_signature_check {
        bid.verify_signature(relay_public_key, context).map_err(BidRejection::InvalidSignature)?;
    }
    if bid_info.parent_hash != auction_request.parent_hash {
        return Err(BidRejection::ParentHashMismatch {
            expected: auction_request.parent_hash.clone(),
            bid: bid_info.parent_hash,
        })
    }
    if bid_info.value == U256::ZERO
        || bid_info.transactions_root.as_ref() == EMPTY_TRANSACTIONS_ROOT.as_slice()
    {
        return Err(BidRejection::ZeroValueOrEmptyTransactions)
    }
    if bid_info.value < *min_bid {
        return Err(BidRejection::BelowMinBid { value: bid_info.value, min_bid: *min_bid })
    }

    Ok(bid_info)
}

/// Reasons an unblinded payload is dropped from the race. Logged per relay,
/// never surfaced to the proposer.
#[derive(Debug, thiserror::Error)]
enum PayloadRejection {
    #[error("response version {response} does not match the blinded block fork {expected}")]
    VersionMismatch { expected: Fork, response: Fork },
    #[error("response carries an empty payload")]
    EmptyPayload,
    #[error("response block hash {response} does not match the requested block hash {expected}")]
    BlockHashMismatch { expected: Hash32, response: Hash32 },
    #[error(
        "blob bundle lengths (blobs {blobs}, commitments {commitments}, proofs {proofs}) \
         do not match the {expected} blinded commitments"
    )]
    BlobBundleLengthMismatch { expected: usize, blobs: usize, commitments: usize, proofs: usize },
    #[error("blob commitment at index {index} does not match the blinded block")]
    BlobCommitmentMismatch { index: usize },
}

/// Checks structural equality between an unblinded payload and the blinded
/// block it was requested for, including the blob commitment vectors.
fn validate_payload(
    blinded_block: &SignedBlindedBeaconBlock,
    contents: &AuctionContents,
) -> Result<(), PayloadRejection> {
    if contents.version() != blinded_block.version() {
        return Err(PayloadRejection::VersionMismatch {
            expected: blinded_block.version(),
            response: contents.version(),
        })
    }

    let payload = contents.execution_payload();
    if payload.block_hash == Hash32::default() {
        return Err(PayloadRejection::EmptyPayload)
    }
    if &payload.block_hash != blinded_block.block_hash() {
        return Err(PayloadRejection::BlockHashMismatch {
            expected: blinded_block.block_hash().clone(),
            response: payload.block_hash.clone(),
        })
    }

    let commitments = blinded_block.blob_kzg_commitments();
    let blobs_bundle = contents.blobs_bundle();
    if commitments.len() != blobs_bundle.blobs.len()
        || commitments.len() != blobs_bundle.commitments.len()
        || commitments.len() != blobs_bundle.proofs.len()
    {
        return Err(PayloadRejection::BlobBundleLengthMismatch {
            expected: commitments.len(),
            blobs: blobs_bundle.blobs.len(),
            commitments: blobs_bundle.commitments.len(),
            proofs: blobs_bundle.proofs.len(),
        })
    }
    for (index, (expected, commitment)) in
        commitments.iter().zip(blobs_bundle.commitments.iter()).enumerate()
    {
        if expected != commitment {
            return Err(PayloadRejection::BlobCommitmentMismatch { index })
        }
    }

    Ok(())
}

#[derive(Debug, Default)]
struct AuctionState {
    best: Option<(BidInfo, SignedBuilderBid)>,
    /// Every relay that delivered a bid for each block hash; multiple relays
    /// may deliver the winning bid.
    slot_book: HashMap<Hash32, Vec<Relay>>,
}

/// Adopts `candidate` as the best bid if it wins under the total order
/// `(value descending, block hash ascending)`.
fn rank_bid(state: &mut AuctionState, bid_info: BidInfo, response: SignedBuilderBid) -> bool {
    let adopt = match &state.best {
        None => true,
        Some((best_info, _)) => {
            if bid_info.value != best_info.value {
                bid_info.value > best_info.value
            } else {
                bid_info.block_hash.as_ref() < best_info.block_hash.as_ref()
            }
        }
    };
    if adopt {
        state.best = Some((bid_info, response));
    }
    adopt
}

#[derive(Clone)]
pub struct RelayMux(Arc<RelayMuxInner>);

impl Deref for RelayMux {
    type Target = RelayMuxInner;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

pub struct RelayMuxInner {
    relays: Vec<Relay>,
    context: Arc<Context>,
    genesis_time: u64,
    slot_time_sec: u64,
    min_bid: U256,
    skip_relay_signature_check: bool,
    request_max_retries: u32,
    payload_timeout: Duration,
    slot_uid: SlotUidRegistry,
    bids: BidCache,
}

impl RelayMux {
    pub fn new(relays: Vec<Relay>, context: Context, config: &Config) -> Self {
        let inner = RelayMuxInner {
            relays,
            context: Arc::new(context),
            genesis_time: config.genesis_time,
            slot_time_sec: config.slot_time_sec,
            min_bid: config.min_bid_wei,
            skip_relay_signature_check: config.skip_relay_signature_check,
            request_max_retries: config.request_max_retries,
            payload_timeout: Duration::from_millis(config.get_payload_timeout_ms),
            slot_uid: SlotUidRegistry::new(),
            bids: BidCache::default(),
        };
        Self(Arc::new(inner))
    }

    /// Ticks once per slot and evicts auctions old enough that no proposer
    /// will unblind them anymore.
    pub async fn run(&self) {
        let mut timer = tokio::time::interval(Duration::from_secs(self.slot_time_sec));
        loop {
            timer.tick().await;
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|duration| duration.as_secs())
                .unwrap_or_default();
            let slot = now.saturating_sub(self.genesis_time) / self.slot_time_sec;
            let removed = self.bids.prune_below(slot.saturating_sub(BID_RETENTION_SLOTS));
            if removed > 0 {
                debug!(slot, removed, "pruned stale auctions from the bid cache");
            }
        }
    }

    fn request_context(&self, slot_uid: String, user_agent: Option<&str>) -> RequestContext {
        RequestContext { slot_uid, user_agent: user_agent.map(str::to_string) }
    }

    /// Races the configured relays to unblind `signed_block`, returning the
    /// first structurally valid payload (if any arrives before the deadline)
    /// along with the locally cached winning bid for this block.
    pub async fn unblind_payload(
        &self,
        signed_block: &SignedBlindedBeaconBlock,
        user_agent: Option<&str>,
    ) -> (Option<AuctionContents>, Option<BidRecord>) {
        let slot = signed_block.slot();
        let block_hash = signed_block.block_hash().clone();

        let (current_slot, current_uid) = self.slot_uid.current();
        let slot_uid = if current_slot == slot {
            current_uid.to_string()
        } else {
            warn!(current_slot, slot, "latest slot UID is not for the payload slot");
            String::new()
        };

        info!(
            slot,
            %block_hash,
            parent_hash = %signed_block.parent_hash(),
            %slot_uid,
            ms_into_slot = ms_into_slot(self.genesis_time, self.slot_time_sec, slot),
            "unblinding block"
        );

        let original_bid = self.bids.get(slot, &block_hash);
        match &original_bid {
            None => error!(slot, %block_hash, "no bid in the cache for this block, was the header served by this instance?"),
            Some(bid) if bid.relays.is_empty() => warn!(slot, %block_hash, "bid found but no associated relays"),
            Some(..) => {}
        }

        let request_context = self.request_context(slot_uid, user_agent);
        let (tx, mut rx) = mpsc::channel::<Option<AuctionContents>>(self.relays.len() + 1);
        let received = Arc::new(AtomicBool::new(false));
        let cancel = CancellationToken::new();

        // deadline sentinel: the race never outlives the payload timeout
        {
            let tx = tx.clone();
            let cancel = cancel.clone();
            let timeout = self.payload_timeout;
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                cancel.cancel();
                let _ = tx.send(None).await;
            });
        }

        for relay in self.relays.iter().cloned() {
            let signed_block = signed_block.clone();
            let request_context = request_context.clone();
            let tx = tx.clone();
            let received = received.clone();
            let cancel = cancel.clone();
            let max_retries = self.request_max_retries;
            metrics::inc_api_int_counter_vec(
                &metrics::API_REQUESTS_COUNTER,
                ApiMethod::GetPayload,
                &relay.public_key,
            );
            tokio::spawn(async move {
                debug!(%relay, "requesting unblinded payload");
                let contents = match relay
                    .open_bid(&signed_block, &request_context, &cancel, max_retries)
                    .await
                {
                    Ok(contents) => contents,
                    Err(Error::Cancelled) => {
                        // expected once another relay has already delivered
                        info!(%relay, "payload request cancelled");
                        metrics::inc_payload_race_counter(RaceOutcome::Cancelled, &relay.public_key);
                        return
                    }
                    Err(err) => {
                        error!(%relay, %err, "error unblinding payload from relay");
                        metrics::inc_payload_race_counter(RaceOutcome::Errored, &relay.public_key);
                        return
                    }
                };

                if let Err(rejection) = validate_payload(&signed_block, &contents) {
                    error!(%relay, %rejection, "rejecting unblinded payload");
                    metrics::inc_payload_race_counter(RaceOutcome::Invalid, &relay.public_key);
                    return
                }

                cancel.cancel();
                if received.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_ok()
                {
                    info!(%relay, "received payload from relay");
                    metrics::inc_payload_race_counter(RaceOutcome::Won, &relay.public_key);
                    let _ = tx.send(Some(contents)).await;
                } else {
                    trace!(%relay, "discarding payload, already received a valid response");
                    metrics::inc_payload_race_counter(RaceOutcome::Lost, &relay.public_key);
                }
            });
        }
        drop(tx);

        let result = rx.recv().await.flatten();
        (result, original_bid)
    }
}

#[async_trait]
impl BlindedBlockProvider for RelayMux {
    async fn register_validators(
        &self,
        registrations: &mut [SignedValidatorRegistration],
        user_agent: Option<&str>,
    ) -> Result<(), Error> {
        let request_context = self.request_context(String::new(), user_agent);
        let handles = self
            .relays
            .iter()
            .cloned()
            .map(|relay| {
                let registrations = registrations.to_vec();
                let request_context = request_context.clone();
                metrics::inc_api_int_counter_vec(
                    &metrics::API_REQUESTS_COUNTER,
                    ApiMethod::Register,
                    &relay.public_key,
                );
                tokio::spawn(async move {
                    let result = relay.register_validators(&registrations, &request_context).await;
                    if let Err(ref err) = result {
                        warn!(%relay, %err, "error registering validators with relay");
                    }
                    result
                })
            })
            .collect::<Vec<_>>();

        let responses = join_all(handles).await;
        let any_success = responses
            .into_iter()
            .any(|response| matches!(response, Ok(Ok(()))));
        if any_success {
            Ok(())
        } else {
            Err(Error::CouldNotRegister)
        }
    }

    async fn fetch_best_bid(
        &self,
        auction_request: &AuctionRequest,
        user_agent: Option<&str>,
    ) -> Result<SignedBuilderBid, Error> {
        let slot = auction_request.slot;
        let slot_uid = self.slot_uid.observe(slot);

        info!(
            slot,
            parent_hash = %auction_request.parent_hash,
            public_key = ?auction_request.public_key,
            %slot_uid,
            ms_into_slot = ms_into_slot(self.genesis_time, self.slot_time_sec, slot),
            "fetching best bid"
        );

        let request_context = self.request_context(slot_uid.to_string(), user_agent);
        let state = Arc::new(Mutex::new(AuctionState::default()));

        let handles = self
            .relays
            .iter()
            .cloned()
            .map(|relay| {
                let auction_request = auction_request.clone();
                let request_context = request_context.clone();
                let context = self.context.clone();
                let min_bid = self.min_bid;
                let skip_signature_check = self.skip_relay_signature_check;
                let state = state.clone();
                metrics::inc_api_int_counter_vec(
                    &metrics::API_REQUESTS_COUNTER,
                    ApiMethod::GetHeader,
                    &relay.public_key,
                );
                tokio::spawn(async move {
                    let mut bid = match relay.fetch_best_bid(&auction_request, &request_context).await
                    {
                        Ok(Some(bid)) => bid,
                        Ok(None) => {
                            debug!(%relay, "relay has no bid for this auction");
                            return
                        }
                        Err(err) => {
                            warn!(%relay, %err, "error fetching bid from relay");
                            return
                        }
                    };

                    let bid_info = match validate_bid(
                        &mut bid,
                        &relay.public_key,
                        &auction_request,
                        &context,
                        &min_bid,
                        skip_signature_check,
                    ) {
                        Ok(bid_info) => bid_info,
                        Err(rejection) => {
                            warn!(%relay, %rejection, "rejecting bid");
                            metrics::inc_auction_int_counter_vec(
                                &metrics::AUCTION_INVALID_BIDS_COUNTER,
                                &relay.public_key,
                            );
                            return
                        }
                    };
                    debug!(
                        %relay,
                        value = %bid_info.value,
                        block_hash = %bid_info.block_hash,
                        block_number = bid_info.block_number,
                        "bid received"
                    );

                    let mut state = state.lock().unwrap();
                    state
                        .slot_book
                        .entry(bid_info.block_hash.clone())
                        .or_default()
                        .push(relay.clone());
                    if rank_bid(&mut state, bid_info, bid) {
                        debug!(%relay, "new best bid");
                    }
                })
            })
            .collect::<Vec<_>>();

        // every relay gets its full request deadline; no early cut-off
        join_all(handles).await;

        let mut state = state.lock().unwrap();
        let Some((bid_info, response)) = state.best.take() else { return Err(Error::NoBids) };
        let relays = state.slot_book.remove(&bid_info.block_hash).unwrap_or_default();
        info!(
            slot,
            value = %bid_info.value,
            block_hash = %bid_info.block_hash,
            relays = relays.len(),
            "found best bid"
        );

        let block_hash = bid_info.block_hash.clone();
        let record = BidRecord {
            response: response.clone(),
            bid_info,
            relays,
            received_at: SystemTime::now(),
        };
        self.bids.put(slot, block_hash, record);

        Ok(response)
    }

    async fn open_bid(
        &self,
        signed_block: &SignedBlindedBeaconBlock,
        user_agent: Option<&str>,
    ) -> Result<AuctionContents, Error> {
        let block_hash = signed_block.block_hash().clone();
        let (payload, _original_bid) = self.unblind_payload(signed_block, user_agent).await;
        payload.ok_or(Error::MissingPayload(block_hash))
    }
}
