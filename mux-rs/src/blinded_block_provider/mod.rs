mod client;
mod server;

pub use client::{Client, RequestContext, SLOT_UID_HEADER, START_TIME_UNIX_MS_HEADER};
pub use server::Server;

use crate::{
    error::Error,
    types::{
        AuctionContents, AuctionRequest, SignedBlindedBeaconBlock, SignedBuilderBid,
        SignedValidatorRegistration,
    },
};
use async_trait::async_trait;

#[async_trait]
pub trait BlindedBlockProvider: Send + Sync {
    async fn register_validators(
        &self,
        registrations: &mut [SignedValidatorRegistration],
        user_agent: Option<&str>,
    ) -> Result<(), Error>;

    async fn fetch_best_bid(
        &self,
        auction_request: &AuctionRequest,
        user_agent: Option<&str>,
    ) -> Result<SignedBuilderBid, Error>;

    async fn open_bid(
        &self,
        signed_block: &SignedBlindedBeaconBlock,
        user_agent: Option<&str>,
    ) -> Result<AuctionContents, Error>;
}
