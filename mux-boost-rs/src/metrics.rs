use std::ops::Deref;

use ethereum_consensus::primitives::BlsPublicKey;
use lazy_static::lazy_static;
use prometheus::{register_int_counter_vec, IntCounterVec, Opts};

const NAMESPACE: &str = "mux";
const SUBSYSTEM: &str = "boost";

const API_METHOD_LABEL: &str = "method";
const RELAY_LABEL: &str = "relay";
const OUTCOME_LABEL: &str = "outcome";

lazy_static! {
    pub static ref API_REQUESTS_COUNTER: IntCounterVec = register_int_counter_vec!(
        Opts::new("api_requests_total", "total number of builder API requests")
            .namespace(NAMESPACE)
            .subsystem(SUBSYSTEM),
        &[API_METHOD_LABEL, RELAY_LABEL]
    )
    .unwrap();
    pub static ref AUCTION_INVALID_BIDS_COUNTER: IntCounterVec = register_int_counter_vec!(
        Opts::new("auction_invalid_bids_total", "total number of rejected builder bids")
            .namespace(NAMESPACE)
            .subsystem(SUBSYSTEM),
        &[RELAY_LABEL]
    )
    .unwrap();
    pub static ref PAYLOAD_RACE_COUNTER: IntCounterVec = register_int_counter_vec!(
        Opts::new("payload_race_total", "outcomes of unblinding races by relay")
            .namespace(NAMESPACE)
            .subsystem(SUBSYSTEM),
        &[OUTCOME_LABEL, RELAY_LABEL]
    )
    .unwrap();
}

pub fn inc_api_int_counter_vec<C: Deref<Target = IntCounterVec>>(
    counter_vec: &C,
    meth: ApiMethod,
    relay: &BlsPublicKey,
) {
    counter_vec.with_label_values(&[meth.as_str(), &format!("{relay:?}")]).inc();
}

pub fn inc_auction_int_counter_vec<C: Deref<Target = IntCounterVec>>(
    counter_vec: &C,
    relay: &BlsPublicKey,
) {
    counter_vec.with_label_values(&[&format!("{relay:?}")]).inc();
}

pub fn inc_payload_race_counter(outcome: RaceOutcome, relay: &BlsPublicKey) {
    PAYLOAD_RACE_COUNTER.with_label_values(&[outcome.as_str(), &format!("{relay:?}")]).inc();
}

#[derive(Copy, Clone, Debug)]
pub enum ApiMethod {
    Register,
    GetHeader,
    GetPayload,
}

impl ApiMethod {
    pub const fn as_str(&self) -> &str {
        match self {
            Self::Register => "register",
            Self::GetHeader => "get_header",
            Self::GetPayload => "get_payload",
        }
    }
}

#[derive(Copy, Clone, Debug)]
pub enum RaceOutcome {
    Won,
    Lost,
    Cancelled,
    Errored,
    Invalid,
}

impl RaceOutcome {
    pub const fn as_str(&self) -> &str {
        match self {
            Self::Won => "won",
            Self::Lost => "lost",
            Self::Cancelled => "cancelled",
            Self::Errored => "errored",
            Self::Invalid => "invalid",
        }
    }
}
