use ethereum_consensus::state_transition::{Context, Error};

/// Chains the middleware can auction blocks for. Only networks running a
/// fork with builder support are listed; anything else goes through
/// `Custom` with a chain config file.
#[derive(Default, Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Mainnet,
    Sepolia,
    Holesky,
    Custom(String),
}

impl Network {
    /// Resolves the chain context the builder signing domain is derived from.
    pub fn context(&self) -> Result<Context, Error> {
        match self {
            Self::Mainnet => Ok(Context::for_mainnet()),
            Self::Sepolia => Ok(Context::for_sepolia()),
            Self::Holesky => Ok(Context::for_holesky()),
            Self::Custom(config) => Context::try_from_file(config),
        }
    }
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mainnet => write!(f, "mainnet"),
            Self::Sepolia => write!(f, "sepolia"),
            Self::Holesky => write!(f, "holesky"),
            Self::Custom(config) => write!(f, "custom network with config at `{config}`"),
        }
    }
}
