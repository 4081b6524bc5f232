//! Transaction submission abstraction for the Disperse SDK
//!
//! A transaction reaches the chain through one of two channels: signed and
//! broadcast by the user's own wallet ([`LocalSigner`]), or forwarded to a
//! meta-transaction relay that pays the gas ([`RelaySession`]). Both implement
//! [`TransactionSigner`] and hand back the same [`TxHandle`], so the resolver
//! and submitter never care which one they were given.

mod local;
mod relay;

pub use local::LocalSigner;
pub use relay::{RelayClient, RelaySession};

use alloy::primitives::{Address, Bytes, Signature, TxHash, B256, U256};
use eyre::Result;
use tokio::sync::{Mutex, MutexGuard};

/// Transaction request parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxRequest {
    /// Target contract address
    pub to: Address,
    /// Account the call is made on behalf of (required by the relay)
    pub from: Option<Address>,
    /// Transaction value in wei
    pub value: U256,
    /// Encoded calldata
    pub data: Bytes,
    /// Optional gas limit override
    pub gas_limit: Option<u64>,
}

impl TxRequest {
    /// Create a new transaction request
    pub fn new(to: Address, data: impl Into<Bytes>) -> Self {
        Self {
            to,
            from: None,
            value: U256::ZERO,
            data: data.into(),
            gas_limit: None,
        }
    }

    /// Set the sender
    pub fn with_from(mut self, from: Address) -> Self {
        self.from = Some(from);
        self
    }

    /// Set transaction value
    pub fn with_value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }

    /// Set gas limit
    pub fn with_gas_limit(mut self, gas_limit: u64) -> Self {
        self.gas_limit = Some(gas_limit);
        self
    }
}

/// How a transaction was submitted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// Signed and sent by the user's wallet
    Direct,
    /// Executed by a relayer that paid the gas
    Relay,
}

/// Uniform result of a submission, whichever channel carried it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxHandle {
    pub hash: TxHash,
    pub channel: Channel,
}

impl TxHandle {
    pub fn direct(hash: TxHash) -> Self {
        Self {
            hash,
            channel: Channel::Direct,
        }
    }

    pub fn relayed(hash: TxHash) -> Self {
        Self {
            hash,
            channel: Channel::Relay,
        }
    }
}

/// Trait for submitting EVM transactions through one channel
pub trait TransactionSigner: Send + Sync {
    /// Returns the address transactions are sent from
    fn address(&self) -> Address;

    /// Submits a transaction, returning its handle
    fn submit(&self, tx: TxRequest) -> impl std::future::Future<Output = Result<TxHandle>> + Send;
}

/// Trait for producing EIP-712 signatures over a precomputed digest
pub trait TypedDataSigner: Send + Sync {
    /// Signs `hash`; an error means the wallet refused or failed
    fn sign_hash(&self, hash: B256) -> impl std::future::Future<Output = Result<Signature>> + Send;
}

/// The connected wallet, injected wherever a signature may be requested.
///
/// Only one signature request can be outstanding at a time: every caller
/// goes through [`Wallet::lock`], and holds the guard for as long as its
/// signing flow must not be interleaved with another one.
pub struct Wallet<S> {
    address: Address,
    signer: Mutex<S>,
}

impl<S: TransactionSigner> Wallet<S> {
    pub fn new(signer: S) -> Self {
        Self {
            address: signer.address(),
            signer: Mutex::new(signer),
        }
    }

    /// Connected account, available without waiting for the gate
    pub fn address(&self) -> Address {
        self.address
    }

    /// Wait for exclusive use of the signer
    pub async fn lock(&self) -> MutexGuard<'_, S> {
        self.signer.lock().await
    }

    /// Exclusive use of the signer if no other request is in flight
    pub fn try_lock(&self) -> Option<MutexGuard<'_, S>> {
        self.signer.try_lock().ok()
    }

    /// Whether a signing flow currently holds the wallet
    pub fn is_busy(&self) -> bool {
        self.signer.try_lock().is_err()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory signer used by the crate's tests

    use super::*;
    use alloy::signers::local::PrivateKeySigner;
    use alloy::signers::SignerSync;
    use std::sync::Mutex as StdMutex;

    pub const TEST_KEY: &str = "4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

    pub struct FakeSigner {
        pub address: Address,
        pub channel: Channel,
        pub fail_with: Option<String>,
        pub key: Option<PrivateKeySigner>,
        pub deny_signatures: bool,
        pub sent: StdMutex<Vec<TxRequest>>,
        pub signed: StdMutex<Vec<B256>>,
    }

    impl FakeSigner {
        pub fn new(address: Address) -> Self {
            Self {
                address,
                channel: Channel::Direct,
                fail_with: None,
                key: None,
                deny_signatures: false,
                sent: StdMutex::new(Vec::new()),
                signed: StdMutex::new(Vec::new()),
            }
        }

        /// Signer backed by a real key, able to produce EIP-712 signatures
        pub fn with_test_key() -> Self {
            let key: PrivateKeySigner = TEST_KEY.parse().unwrap();
            let mut signer = Self::new(key.address());
            signer.key = Some(key);
            signer
        }

        pub fn denying_signatures(mut self) -> Self {
            self.deny_signatures = true;
            self
        }

        pub fn signed(&self) -> Vec<B256> {
            self.signed.lock().unwrap().clone()
        }

        pub fn relayed(mut self) -> Self {
            self.channel = Channel::Relay;
            self
        }

        pub fn failing(mut self, reason: &str) -> Self {
            self.fail_with = Some(reason.to_string());
            self
        }

        pub fn sent(&self) -> Vec<TxRequest> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl TransactionSigner for FakeSigner {
        fn address(&self) -> Address {
            self.address
        }

        async fn submit(&self, tx: TxRequest) -> Result<TxHandle> {
            if let Some(reason) = &self.fail_with {
                eyre::bail!("{}", reason);
            }
            let mut sent = self.sent.lock().unwrap();
            sent.push(tx);
            let hash = TxHash::with_last_byte(sent.len() as u8);
            Ok(TxHandle {
                hash,
                channel: self.channel,
            })
        }
    }

    impl TypedDataSigner for FakeSigner {
        async fn sign_hash(&self, hash: B256) -> Result<Signature> {
            if self.deny_signatures {
                eyre::bail!("User denied message signature");
            }
            let key = self
                .key
                .as_ref()
                .ok_or_else(|| eyre::eyre!("signer has no key"))?;
            self.signed.lock().unwrap().push(hash);
            Ok(key.sign_hash_sync(&hash)?)
        }
    }
}
