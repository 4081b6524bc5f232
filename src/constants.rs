//! Constants and precision values for the Disperse SDK

use std::time::{SystemTime, UNIX_EPOCH};

/// Decimals assumed for a token until `decimals()` has been read
pub const DEFAULT_DECIMALS: u8 = 18;

/// Native currency (ETH) uses 18 decimals
pub const NATIVE_DECIMALS: u8 = 18;

/// Maximum fraction digits shown when formatting an amount
pub const DISPLAY_FRACTION_DIGITS: u8 = 6;

/// Smallest amount a recipient row may carry, in display units
pub const MIN_RECIPIENT_AMOUNT: &str = "0.0001";

/// Lifetime of a permit signature (10 minutes). The permit relay rejects
/// anything with a later deadline.
pub const PERMIT_DEADLINE_WINDOW_SECS: u64 = 600;

/// EIP-712 domain version used by standard ERC-2612 tokens
pub const PERMIT_DOMAIN_VERSION: &str = "1";

/// Signature type tag understood by the meta-transaction relay
pub const RELAY_SIGNATURE_TYPE: &str = "EIP712_SIGN";

/// Receipt polling: 60 attempts * 2 seconds = 2 minutes
pub const RECEIPT_POLL_ATTEMPTS: u32 = 60;
pub const RECEIPT_POLL_INTERVAL_SECS: u64 = 2;

/// HTTP timeout for relay and permit relay calls
pub const HTTP_TIMEOUT_SECS: u64 = 30;

/// Source of the current unix time, injectable for tests
pub type Clock = fn() -> u64;

/// Current unix time in seconds
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Latest deadline the permit relay accepts at time `now`
pub fn max_permit_deadline(now: u64) -> u64 {
    now + PERMIT_DEADLINE_WINDOW_SECS
}
