//! Network configuration for the Disperse SDK

use crate::error::DisperseError;
use crate::types::Spenders;
use alloy::primitives::Address;

/// Meta-transaction relay endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// Relay base URL
    pub url: String,
    /// API key; without it the relay cannot be initialized
    pub api_key: Option<String>,
}

/// Network configuration containing RPC URL, contract addresses and relay endpoints
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkConfig {
    /// Chain ID; the RPC must report the same one before anything is sent
    pub chain_id: u64,
    /// RPC endpoint URL
    pub rpc_url: String,
    /// Disperse contract called directly from the wallet
    pub disperse: Address,
    /// Disperse contract called through the relay
    pub disperse_gasless: Address,
    /// Meta-transaction relay
    pub relay: RelayConfig,
    /// Base URL of the permit relay backend (`POST {url}/approve-gasless`)
    pub permit_relay_url: String,
}

fn env_var(name: &str) -> Result<String, DisperseError> {
    std::env::var(name).map_err(|_| DisperseError::Config(format!("{} environment variable must be set", name)))
}

fn env_address(name: &str) -> Result<Address, DisperseError> {
    env_var(name)?
        .parse()
        .map_err(|_| DisperseError::Config(format!("{} is not a valid address", name)))
}

impl NetworkConfig {
    /// Create a configuration with explicit values
    pub fn new(
        chain_id: u64,
        rpc_url: impl Into<String>,
        disperse: Address,
        disperse_gasless: Address,
    ) -> Self {
        Self {
            chain_id,
            rpc_url: rpc_url.into(),
            disperse,
            disperse_gasless,
            relay: RelayConfig {
                url: String::new(),
                api_key: None,
            },
            permit_relay_url: String::new(),
        }
    }

    /// Load from the environment (and `.env`, if present)
    ///
    /// Reads `DISPERSE_CHAIN_ID`, `DISPERSE_RPC_URL`, `DISPERSE_ADDRESS`,
    /// `DISPERSE_GASLESS_ADDRESS`, `DISPERSE_RELAY_URL`,
    /// `DISPERSE_RELAY_API_KEY` (optional) and `DISPERSE_PERMIT_RELAY_URL`.
    pub fn from_env() -> Result<Self, DisperseError> {
        let _ = dotenvy::dotenv();

        let chain_id = env_var("DISPERSE_CHAIN_ID")?
            .parse()
            .map_err(|_| DisperseError::Config("DISPERSE_CHAIN_ID is not a number".to_string()))?;

        Ok(Self {
            chain_id,
            rpc_url: env_var("DISPERSE_RPC_URL")?,
            disperse: env_address("DISPERSE_ADDRESS")?,
            disperse_gasless: env_address("DISPERSE_GASLESS_ADDRESS")?,
            relay: RelayConfig {
                url: env_var("DISPERSE_RELAY_URL")?,
                api_key: std::env::var("DISPERSE_RELAY_API_KEY").ok().filter(|k| !k.is_empty()),
            },
            permit_relay_url: env_var("DISPERSE_PERMIT_RELAY_URL")?,
        })
    }

    /// Override the RPC URL
    pub fn with_rpc_url(mut self, rpc_url: impl Into<String>) -> Self {
        self.rpc_url = rpc_url.into();
        self
    }

    /// Set the meta-transaction relay
    pub fn with_relay(mut self, url: impl Into<String>, api_key: Option<String>) -> Self {
        self.relay = RelayConfig {
            url: url.into(),
            api_key,
        };
        self
    }

    /// Set the permit relay backend
    pub fn with_permit_relay(mut self, url: impl Into<String>) -> Self {
        self.permit_relay_url = url.into();
        self
    }

    /// The two spender contracts allowances are tracked for
    pub fn spenders(&self) -> Spenders {
        Spenders {
            direct: self.disperse,
            gasless: self.disperse_gasless,
        }
    }
}
