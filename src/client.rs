//! DisperseClient - main entry point for the SDK

use crate::authorization::{needs_authorization, AuthState, Authorizer};
use crate::config::NetworkConfig;
use crate::constants::{unix_now, Clock, NATIVE_DECIMALS};
use crate::disperse::{DisperseRequest, Disperser};
use crate::error::DisperseError;
use crate::permit::{PermitForwarder, PermitRelayClient};
use crate::reader::{ChainReader, RpcReader, StateReader};
use crate::signer::{RelayClient, TransactionSigner, TxHandle, TypedDataSigner, Wallet};
use crate::types::{Asset, SpenderMode, TokenState};
use alloy::primitives::{Address, U256};
use tokio::sync::OnceCell;

/// Main client: one connected wallet on one network.
///
/// Every collaborator is passed in, so tests (and other hosts) can swap the
/// wallet, the chain reader or the permit relay without global state.
pub struct DisperseClient<S, R = RpcReader, P = PermitRelayClient> {
    config: NetworkConfig,
    wallet: Wallet<S>,
    state: StateReader<R>,
    authorizer: Authorizer<P>,
    disperser: Disperser,
    relay: RelayClient,
    /// Set once the RPC has reported the configured chain id
    network_checked: OnceCell<()>,
}

impl<S: TransactionSigner + TypedDataSigner> DisperseClient<S> {
    /// Create a client talking to the configured RPC and relays
    pub fn new(signer: S, config: NetworkConfig) -> Result<Self, DisperseError> {
        let reader = RpcReader::new(&config.rpc_url).map_err(|e| DisperseError::Config(format!("{:#}", e)))?;
        let forwarder = PermitRelayClient::new(config.permit_relay_url.clone())
            .map_err(|e| DisperseError::Config(format!("{:#}", e)))?;
        Self::with_parts(signer, config, reader, forwarder, unix_now)
    }
}

impl<S, R, P> DisperseClient<S, R, P>
where
    S: TransactionSigner + TypedDataSigner,
    R: ChainReader,
    P: PermitForwarder,
{
    /// Create a client from explicit collaborators
    pub fn with_parts(
        signer: S,
        config: NetworkConfig,
        reader: R,
        forwarder: P,
        clock: Clock,
    ) -> Result<Self, DisperseError> {
        let relay = RelayClient::new(config.relay.clone()).map_err(|e| DisperseError::Config(format!("{:#}", e)))?;
        let spenders = config.spenders();

        Ok(Self {
            wallet: Wallet::new(signer),
            state: StateReader::new(reader, spenders),
            authorizer: Authorizer::new(forwarder, clock),
            disperser: Disperser::new(spenders),
            relay,
            config,
            network_checked: OnceCell::new(),
        })
    }

    /// Get the connected account
    pub fn address(&self) -> Address {
        self.wallet.address()
    }

    /// Get the network configuration
    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    pub fn wallet(&self) -> &Wallet<S> {
        &self.wallet
    }

    /// Fail unless the RPC serves the configured chain.
    ///
    /// Runs before the first mutation; a successful check is remembered for
    /// the lifetime of the client.
    pub async fn check_network(&self) -> Result<(), DisperseError> {
        self.network_checked
            .get_or_try_init(|| async {
                let actual = self
                    .state
                    .chain()
                    .chain_id()
                    .await
                    .map_err(DisperseError::ReadFailure)?;
                if actual != self.config.chain_id {
                    tracing::error!("RPC reports chain {}, expected {}", actual, self.config.chain_id);
                    return Err(DisperseError::WrongNetwork {
                        expected: self.config.chain_id,
                        actual,
                    });
                }
                Ok::<(), DisperseError>(())
            })
            .await?;
        Ok(())
    }

    // ========== Reads ==========

    /// Native balance; zero if it can't be read
    pub async fn native_balance(&self) -> U256 {
        self.state.native_balance(self.address()).await
    }

    /// Cached token snapshot for the connected account
    pub async fn token_state(&self, token: Address) -> TokenState {
        self.state.token_state(token, self.address()).await
    }

    /// Drop the cached snapshot and read it again
    pub async fn refresh_token_state(&self, token: Address) -> TokenState {
        self.invalidate(token).await;
        self.token_state(token).await
    }

    /// Drop the cached snapshot of `token`
    pub async fn invalidate(&self, token: Address) {
        self.state.invalidate(self.address(), token).await;
    }

    /// Uncached snapshot, or an error if any part of it could not be read
    async fn fresh_token_state(&self, token: Address) -> Result<TokenState, DisperseError> {
        let state = self.state.fetch_token_state(token, self.address()).await;
        if !state.is_fresh() {
            return Err(DisperseError::ReadFailure(eyre::eyre!(
                "token state of {} unavailable",
                token
            )));
        }
        Ok(state)
    }

    // ========== Authorization ==========

    /// Authorization state of `token` for the spender used in `mode`.
    ///
    /// When the token can't be read, the last known state is returned.
    pub async fn auth_state(&self, token: Address, mode: SpenderMode) -> AuthState {
        let spender = self.config.spenders().get(mode);
        let state = self.token_state(token).await;
        if !state.is_fresh() {
            return self.authorizer.state(token, spender);
        }
        self.authorizer
            .evaluate(token, spender, state.balance, state.allowance.get(mode))
    }

    pub async fn needs_authorization(&self, token: Address, mode: SpenderMode) -> bool {
        let state = self.token_state(token).await;
        needs_authorization(state.balance, state.allowance.get(mode))
    }

    /// Authorize `amount` of `token` for the spender used in `mode`.
    ///
    /// Direct mode sends `approve()` from the wallet; gasless mode signs a
    /// permit and hands it to the permit relay.
    pub async fn approve(&self, token: Address, mode: SpenderMode, amount: U256) -> Result<TxHandle, DisperseError> {
        self.check_network().await?;
        let spender = self.config.spenders().get(mode);
        let handle = match mode {
            SpenderMode::Direct => {
                self.authorizer
                    .approve_direct(&self.wallet, token, spender, amount)
                    .await?
            }
            SpenderMode::Gasless => {
                self.authorizer
                    .approve_gasless(&self.wallet, self.state.chain(), token, spender, amount)
                    .await?
            }
        };
        self.invalidate(token).await;
        Ok(handle)
    }

    /// Approve the full balance if the allowance doesn't cover it.
    ///
    /// Reads fresh state first; returns `None` when nothing had to be sent.
    pub async fn authorize_if_needed(
        &self,
        token: Address,
        mode: SpenderMode,
    ) -> Result<Option<TxHandle>, DisperseError> {
        let state = self.fresh_token_state(token).await?;

        let spender = self.config.spenders().get(mode);
        let allowance = state.allowance.get(mode);
        match self.authorizer.evaluate(token, spender, state.balance, allowance) {
            AuthState::Sufficient => Ok(None),
            AuthState::Approving => Err(DisperseError::ApprovalFailed(eyre::eyre!(
                "an approval of {} is already in progress",
                token
            ))),
            _ => self.approve(token, mode, state.balance).await.map(Some),
        }
    }

    // ========== Disperse ==========

    /// Send to every recipient in one transaction.
    ///
    /// Malformed rows fail before anything is read. Amounts are then parsed
    /// at the decimals of a fresh snapshot and checked against its balance;
    /// only a request that passes reaches the relay or the wallet. Gasless
    /// requests go through a relay session scoped to the gasless contract,
    /// and the wallet stays locked while the request is in flight either way.
    pub async fn disperse(&self, request: &DisperseRequest) -> Result<TxHandle, DisperseError> {
        self.disperser.precheck(request)?;
        self.check_network().await?;

        let account = self.address();
        let (decimals, balance) = match request.asset {
            Asset::Native => (NATIVE_DECIMALS, self.state.try_native_balance(account).await?),
            Asset::Token { address } => {
                let state = self.fresh_token_state(address).await?;
                (state.decimals, state.balance)
            }
        };
        let prepared = self.disperser.prepare(request, decimals, account, balance)?;

        let handle = if request.gasless {
            let session = self.relay.init(self.config.disperse_gasless, account).await?;
            let _gate = self.wallet.lock().await;
            self.disperser.send(&session, prepared).await?
        } else {
            let signer = self.wallet.lock().await;
            self.disperser.send(&*signer, prepared).await?
        };

        if let Some(token) = request.asset.token() {
            self.invalidate(token).await;
        }
        Ok(handle)
    }
}
