//! Chain state reads: balances, decimals, allowances and permit inputs

use crate::contracts::IERC20Permit;
use crate::error::DisperseError;
use crate::settle::settle;
use crate::types::{Allowances, ReadStatus, Spenders, TokenState};
use alloy::network::{Ethereum, TransactionBuilder};
use alloy::primitives::{Address, Bytes, U256};
use alloy::providers::{Provider, ProviderBuilder, RootProvider};
use alloy::sol_types::SolCall;
use alloy::transports::http::reqwest::Url;
use eyre::{Context, Result};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Read-only view of the chain used by the SDK
pub trait ChainReader: Send + Sync {
    fn chain_id(&self) -> impl Future<Output = Result<u64>> + Send;

    fn native_balance(&self, account: Address) -> impl Future<Output = Result<U256>> + Send;

    fn token_balance(&self, token: Address, account: Address) -> impl Future<Output = Result<U256>> + Send;

    fn decimals(&self, token: Address) -> impl Future<Output = Result<u8>> + Send;

    fn allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> impl Future<Output = Result<U256>> + Send;

    /// EIP-712 domain name of the token
    fn token_name(&self, token: Address) -> impl Future<Output = Result<String>> + Send;

    /// Current permit nonce of `owner` on `token`
    fn permit_nonce(&self, token: Address, owner: Address) -> impl Future<Output = Result<U256>> + Send;
}

impl<T: ChainReader> ChainReader for Arc<T> {
    fn chain_id(&self) -> impl Future<Output = Result<u64>> + Send {
        (**self).chain_id()
    }

    fn native_balance(&self, account: Address) -> impl Future<Output = Result<U256>> + Send {
        (**self).native_balance(account)
    }

    fn token_balance(&self, token: Address, account: Address) -> impl Future<Output = Result<U256>> + Send {
        (**self).token_balance(token, account)
    }

    fn decimals(&self, token: Address) -> impl Future<Output = Result<u8>> + Send {
        (**self).decimals(token)
    }

    fn allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> impl Future<Output = Result<U256>> + Send {
        (**self).allowance(token, owner, spender)
    }

    fn token_name(&self, token: Address) -> impl Future<Output = Result<String>> + Send {
        (**self).token_name(token)
    }

    fn permit_nonce(&self, token: Address, owner: Address) -> impl Future<Output = Result<U256>> + Send {
        (**self).permit_nonce(token, owner)
    }
}

/// Type alias for read-only provider
type ReadProvider = Arc<RootProvider<Ethereum>>;

/// [`ChainReader`] over a JSON-RPC HTTP endpoint
#[derive(Clone)]
pub struct RpcReader {
    provider: ReadProvider,
}

impl RpcReader {
    pub fn new(rpc_url: &str) -> Result<Self> {
        let url: Url = rpc_url.parse().context("Invalid RPC URL")?;
        // Read-only provider without fillers (we only do eth_call operations)
        let provider = ProviderBuilder::new()
            .disable_recommended_fillers()
            .network::<Ethereum>()
            .connect_http(url);

        Ok(Self {
            provider: Arc::new(provider),
        })
    }

    async fn call<C: SolCall + Send>(&self, to: Address, call: C, what: &'static str) -> Result<C::Return> {
        let result: Bytes = self
            .provider
            .call(
                alloy::rpc::types::TransactionRequest::default()
                    .with_to(to)
                    .with_input(call.abi_encode()),
            )
            .await
            .with_context(|| format!("Failed to call {}", what))?;

        C::abi_decode_returns(&result).with_context(|| format!("Failed to decode {}", what))
    }
}

impl ChainReader for RpcReader {
    async fn chain_id(&self) -> Result<u64> {
        self.provider.get_chain_id().await.context("Failed to get chain id")
    }

    async fn native_balance(&self, account: Address) -> Result<U256> {
        self.provider
            .get_balance(account)
            .await
            .context("Failed to get balance")
    }

    async fn token_balance(&self, token: Address, account: Address) -> Result<U256> {
        self.call(token, IERC20Permit::balanceOfCall { account }, "balanceOf").await
    }

    async fn decimals(&self, token: Address) -> Result<u8> {
        self.call(token, IERC20Permit::decimalsCall {}, "decimals").await
    }

    async fn allowance(&self, token: Address, owner: Address, spender: Address) -> Result<U256> {
        self.call(token, IERC20Permit::allowanceCall { owner, spender }, "allowance")
            .await
    }

    async fn token_name(&self, token: Address) -> Result<String> {
        self.call(token, IERC20Permit::nameCall {}, "name").await
    }

    async fn permit_nonce(&self, token: Address, owner: Address) -> Result<U256> {
        self.call(token, IERC20Permit::noncesCall { owner }, "nonces").await
    }
}

/// Cache key: one snapshot per (account, token)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct StateKey {
    account: Address,
    token: Address,
}

/// Snapshot cache plus the invalidation counters that guard it.
///
/// A fetch records the ticket of its key before reading and may only store
/// its result if the ticket is unchanged afterwards.
#[derive(Debug, Default)]
struct Cache {
    entries: HashMap<StateKey, TokenState>,
    generations: HashMap<StateKey, u64>,
    /// Bumped by the bulk invalidations
    epoch: u64,
}

impl Cache {
    fn ticket(&self, key: &StateKey) -> (u64, u64) {
        (self.epoch, self.generations.get(key).copied().unwrap_or_default())
    }
}

/// Cached, all-or-nothing token snapshots on top of a [`ChainReader`].
///
/// Nothing expires on its own: after an approval or disperse the caller must
/// [`invalidate`](Self::invalidate) the affected entry.
pub struct StateReader<R> {
    reader: R,
    spenders: Spenders,
    cache: RwLock<Cache>,
}

impl<R: ChainReader> StateReader<R> {
    pub fn new(reader: R, spenders: Spenders) -> Self {
        Self {
            reader,
            spenders,
            cache: RwLock::new(Cache::default()),
        }
    }

    /// The underlying reader, for reads that must never be cached
    pub fn chain(&self) -> &R {
        &self.reader
    }

    pub fn spenders(&self) -> Spenders {
        self.spenders
    }

    /// Native balance of `account`; zero (and an error log) if it can't be read
    pub async fn native_balance(&self, account: Address) -> U256 {
        tracing::debug!("Fetching native balance of {}", account);
        let settled = settle(self.reader.native_balance(account)).await;
        match settled.into_result() {
            Ok(balance) => {
                tracing::debug!("Native balance of {} is {}", account, balance);
                balance
            }
            Err(err) => {
                tracing::error!("Error fetching native balance of {}: {:#}", account, err);
                U256::ZERO
            }
        }
    }

    /// Like [`native_balance`](Self::native_balance) but surfaces the failure
    pub async fn try_native_balance(&self, account: Address) -> Result<U256, DisperseError> {
        self.reader
            .native_balance(account)
            .await
            .map_err(DisperseError::ReadFailure)
    }

    /// Read balance, decimals and both allowances concurrently, bypassing the cache.
    ///
    /// If any of the four reads fails the whole snapshot is the safe default;
    /// a partial merge is never returned.
    pub async fn fetch_token_state(&self, token: Address, account: Address) -> TokenState {
        tracing::debug!("Fetching token state of {} for {}", token, account);

        let (balance, decimals, direct, gasless) = futures::future::join4(
            settle(self.reader.token_balance(token, account)),
            settle(self.reader.decimals(token)),
            settle(self.reader.allowance(token, account, self.spenders.direct)),
            settle(self.reader.allowance(token, account, self.spenders.gasless)),
        )
        .await;

        let snapshot = (|| -> Result<TokenState> {
            Ok(TokenState {
                token,
                account,
                balance: balance.into_result()?,
                decimals: decimals.into_result()?,
                allowance: Allowances {
                    direct: direct.into_result()?,
                    gasless: gasless.into_result()?,
                },
                status: ReadStatus::Fresh,
            })
        })();

        match snapshot {
            Ok(state) => {
                tracing::debug!(
                    "Token {} for {}: balance {}, decimals {}",
                    token,
                    account,
                    state.balance,
                    state.decimals
                );
                state
            }
            Err(err) => {
                tracing::error!("Error fetching token state of {} for {}: {:#}", token, account, err);
                TokenState::default_for(token, account)
            }
        }
    }

    /// Cached snapshot, fetched on first use. Defaulted snapshots are not
    /// cached, so the next call reads the chain again.
    ///
    /// A fetch that overlaps an invalidation of its key is returned to this
    /// caller but never stored.
    pub async fn token_state(&self, token: Address, account: Address) -> TokenState {
        let key = StateKey { account, token };
        let ticket = {
            let cache = self.cache.read().await;
            if let Some(state) = cache.entries.get(&key) {
                return state.clone();
            }
            cache.ticket(&key)
        };

        let state = self.fetch_token_state(token, account).await;
        if state.is_fresh() {
            let mut cache = self.cache.write().await;
            if cache.ticket(&key) == ticket {
                cache.entries.insert(key, state.clone());
            } else {
                tracing::debug!("Token state of {} for {} was invalidated mid-fetch, not caching", token, account);
            }
        }
        state
    }

    /// Whether `state` still answers the question the caller is asking now.
    /// Results of superseded fetches should be dropped when this is false.
    pub fn is_current(state: &TokenState, token: Address, account: Address) -> bool {
        state.token == token && state.account == account
    }

    /// Drop the cached snapshot for (account, token)
    pub async fn invalidate(&self, account: Address, token: Address) {
        tracing::debug!("Invalidating token state of {} for {}", token, account);
        let key = StateKey { account, token };
        let mut cache = self.cache.write().await;
        cache.entries.remove(&key);
        *cache.generations.entry(key).or_default() += 1;
    }

    /// Drop every cached snapshot of `account`
    pub async fn invalidate_account(&self, account: Address) {
        let mut cache = self.cache.write().await;
        cache.entries.retain(|key, _| key.account != account);
        cache.epoch += 1;
    }

    pub async fn invalidate_all(&self) {
        let mut cache = self.cache.write().await;
        cache.entries.clear();
        cache.epoch += 1;
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Programmable in-memory chain used by the crate's tests

    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct FakeChain {
        pub chain_id: u64,
        pub native: HashMap<Address, U256>,
        pub balances: HashMap<(Address, Address), U256>,
        pub decimals: HashMap<Address, u8>,
        pub allowances: HashMap<(Address, Address, Address), U256>,
        pub names: HashMap<Address, String>,
        pub nonces: Mutex<HashMap<(Address, Address), U256>>,
        /// Names of reads that should fail
        pub failing: Vec<&'static str>,
        pub token_reads: AtomicUsize,
        pub nonce_reads: AtomicUsize,
    }

    impl FakeChain {
        pub fn new(chain_id: u64) -> Self {
            Self {
                chain_id,
                ..Default::default()
            }
        }

        pub fn fail(mut self, read: &'static str) -> Self {
            self.failing.push(read);
            self
        }

        pub fn set_nonce(&self, token: Address, owner: Address, nonce: u64) {
            self.nonces.lock().unwrap().insert((token, owner), U256::from(nonce));
        }

        fn check(&self, read: &'static str) -> Result<()> {
            if self.failing.contains(&read) {
                eyre::bail!("{} reverted", read);
            }
            Ok(())
        }
    }

    impl ChainReader for FakeChain {
        async fn chain_id(&self) -> Result<u64> {
            self.check("chain_id")?;
            Ok(self.chain_id)
        }

        async fn native_balance(&self, account: Address) -> Result<U256> {
            self.check("native_balance")?;
            Ok(self.native.get(&account).copied().unwrap_or_default())
        }

        async fn token_balance(&self, token: Address, account: Address) -> Result<U256> {
            self.token_reads.fetch_add(1, Ordering::SeqCst);
            self.check("balance")?;
            Ok(self.balances.get(&(token, account)).copied().unwrap_or_default())
        }

        async fn decimals(&self, token: Address) -> Result<u8> {
            self.check("decimals")?;
            Ok(self.decimals.get(&token).copied().unwrap_or(18))
        }

        async fn allowance(&self, token: Address, owner: Address, spender: Address) -> Result<U256> {
            self.check("allowance")?;
            Ok(self
                .allowances
                .get(&(token, owner, spender))
                .copied()
                .unwrap_or_default())
        }

        async fn token_name(&self, token: Address) -> Result<String> {
            self.check("name")?;
            Ok(self.names.get(&token).cloned().unwrap_or_else(|| "Token".to_string()))
        }

        async fn permit_nonce(&self, token: Address, owner: Address) -> Result<U256> {
            self.nonce_reads.fetch_add(1, Ordering::SeqCst);
            self.check("nonce")?;
            Ok(self
                .nonces
                .lock()
                .unwrap()
                .get(&(token, owner))
                .copied()
                .unwrap_or_default())
        }
    }
}
