//! Error types for the Disperse SDK
//!
//! Adapters (RPC, wallet, HTTP, storage) use `eyre` for ergonomic error handling
//! with context. The orchestration layer reports a typed [`DisperseError`] so
//! callers can branch on what went wrong.

use crate::types::FieldError;
use alloy::primitives::U256;

pub use eyre::{eyre, Context, Report, Result};

/// Typed failures surfaced by the reader, resolver, submitter and relay client
#[derive(Debug, thiserror::Error)]
pub enum DisperseError {
    /// Chain state could not be read
    #[error("chain read failed: {0:#}")]
    ReadFailure(Report),

    /// One or more recipient rows are malformed
    #[error("{} invalid recipient field(s)", .0.len())]
    Validation(Vec<FieldError>),

    /// A decimal amount string could not be converted to base units
    #[error("invalid amount {input:?}: {reason}")]
    InvalidAmount { input: String, reason: &'static str },

    /// Not a `0x`-prefixed 40 hex digit address
    #[error("invalid address {0:?}")]
    InvalidAddress(String),

    /// Total to send is not strictly below the sender's balance
    #[error("insufficient balance: total {total} >= balance {balance}")]
    InsufficientBalance { total: U256, balance: U256 },

    /// The wallet refused to produce a signature
    #[error("signature denied: {0:#}")]
    SignatureDenied(Report),

    /// The allowance transaction was rejected or reverted
    #[error("approval failed: {0:#}")]
    ApprovalFailed(Report),

    /// The multi-recipient transfer was rejected or reverted
    #[error("disperse failed: {0:#}")]
    DisperseFailed(Report),

    /// Reads needed to build a permit failed; nothing was signed
    #[error("cannot build permit: {0:#}")]
    CannotBuildPermit(Report),

    /// The permit deadline exceeds the relay's accepted window
    #[error("permit deadline {deadline} is too far in the future (max {max})")]
    DeadlineTooFar { deadline: u64, max: u64 },

    /// The RPC endpoint serves a different chain than the one configured
    #[error("wrong network: configured chain {expected}, RPC reports {actual}")]
    WrongNetwork { expected: u64, actual: u64 },

    /// The meta-transaction relay could not be initialized
    #[error("relay unavailable: {0:#}")]
    RelayUnavailable(Report),

    /// The relay rejected the payload
    #[error("relay submit failed: {0:#}")]
    RelaySubmitFailed(Report),

    /// The requested combination cannot be carried out
    #[error("unsupported: {0}")]
    Unsupported(&'static str),

    /// Missing or malformed configuration
    #[error("configuration error: {0}")]
    Config(String),
}

impl DisperseError {
    /// Per-field validation failures, if this is a validation error
    pub fn field_errors(&self) -> &[FieldError] {
        match self {
            DisperseError::Validation(errors) => errors,
            _ => &[],
        }
    }
}
