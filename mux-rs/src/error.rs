use ethereum_consensus::primitives::Hash32;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum Error {
    #[error("public key in request is invalid")]
    InvalidPublicKey,
    #[error("hash in request is invalid")]
    InvalidHash,
    #[error("no valid bids returned for proposal")]
    NoBids,
    #[error("no payload returned for opened bid with block hash {0}")]
    MissingPayload(Hash32),
    #[error("could not register with any relay")]
    CouldNotRegister,
    #[error("request was cancelled")]
    Cancelled,
    #[error("relay responded with status {status}: {message}")]
    Api { status: u16, message: String },
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Consensus(#[from] ethereum_consensus::Error),
    #[error("unable to parse relay URL {0}: {1}")]
    RelayUrlParse(String, #[source] url::ParseError),
    #[error("unable to parse relay public key from URL {0}: {1}")]
    RelayUrlPublicKey(Url, String),
}

impl Error {
    /// Whether the underlying request failed because its deadline elapsed.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Http(err) if err.is_timeout())
    }
}
