//! Disperse SDK for Rust
//!
//! Send native currency or an ERC-20 token to many recipients in one
//! transaction, either paying gas from the connected wallet or through a
//! meta-transaction relay ("gasless").
//!
//! # Features
//!
//! - Validate recipient lists and convert decimal amounts exactly
//! - Read balances and allowances for both disperse contracts
//! - Approve directly or with a relayed EIP-2612 permit
//! - Remember the connected wallet between runs
//!
//! # Example
//!
//! ```rust,ignore
//! use disperse_sdk::{Asset, DisperseClient, DisperseRequest, LocalSigner, NetworkConfig, Recipient, SpenderMode};
//!
//! #[tokio::main]
//! async fn main() -> eyre::Result<()> {
//!     let config = NetworkConfig::from_env()?;
//!     let signer = LocalSigner::from_private_key("0x...", &config.rpc_url)?;
//!     let client = DisperseClient::new(signer, config)?;
//!
//!     let token = "0x...".parse()?;
//!     client.authorize_if_needed(token, SpenderMode::Gasless).await?;
//!
//!     let handle = client
//!         .disperse(&DisperseRequest::token(
//!             Asset::erc20(token),
//!             true,
//!             vec![Recipient::new("0x...", "1.5"), Recipient::new("0x...", "2.5")],
//!         ))
//!         .await?;
//!     println!("sent {}", handle.hash);
//!
//!     Ok(())
//! }
//! ```

pub mod amount;
pub mod authorization;
pub mod client;
pub mod config;
pub mod constants;
pub mod contracts;
pub mod disperse;
pub mod error;
pub mod permit;
pub mod reader;
pub mod session;
pub mod settle;
pub mod signer;
pub mod types;

// Re-export main types for convenience
pub use amount::{format_ether, format_units, is_decimal, minimum_amount, parse_units};
pub use authorization::{needs_authorization, AuthState, Authorizer};
pub use client::DisperseClient;
pub use config::{NetworkConfig, RelayConfig};
pub use disperse::{DisperseRequest, Disperser, PreparedDisperse};
pub use error::{eyre, Context, DisperseError, Report, Result};
pub use permit::{PermitForwarder, PermitRelayClient, PermitRelayer};
pub use reader::{ChainReader, RpcReader, StateReader};
pub use session::{persist_wallet_labels, restore_session, SessionStore, Subscription, WalletConnector};
pub use settle::{settle, Settled};
pub use signer::{
    Channel, LocalSigner, RelayClient, RelaySession, TransactionSigner, TxHandle, TxRequest,
    TypedDataSigner, Wallet,
};
pub use types::{
    Asset, DisperseIntent, FieldError, PermitMessage, PermitRelayRequest, Recipient, SpenderMode,
    TokenRef, TokenState,
};
