//! Spending authorization for the disperse contracts
//!
//! A token can be authorized for a spender either with an on-chain
//! `approve()` paid by the user, or with a signed EIP-2612 permit that the
//! permit relay submits. Progress is tracked per (token, spender).

use crate::constants::{max_permit_deadline, Clock};
use crate::contracts::IERC20Permit;
use crate::error::DisperseError;
use crate::permit::PermitForwarder;
use crate::reader::ChainReader;
use crate::settle::settle;
use crate::signer::{TransactionSigner, TxHandle, TxRequest, TypedDataSigner, Wallet};
use crate::types::{PermitMessage, PermitRelayRequest};
use alloy::primitives::{Address, U256};
use alloy::sol_types::SolCall;
use futures::future::join3;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Whether `allowance` is too small to move the whole `balance`.
///
/// An empty balance never needs authorization.
pub fn needs_authorization(balance: U256, allowance: U256) -> bool {
    !balance.is_zero() && allowance < balance
}

/// Authorization progress for one (token, spender) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthState {
    #[default]
    Unknown,
    Sufficient,
    Insufficient,
    Approving,
    /// The last approval attempt failed; the allowance is still short
    Failed,
}

impl AuthState {
    pub fn from_amounts(balance: U256, allowance: U256) -> Self {
        if needs_authorization(balance, allowance) {
            AuthState::Insufficient
        } else {
            AuthState::Sufficient
        }
    }

    /// An approval can be started from this state
    pub fn can_approve(&self) -> bool {
        matches!(self, AuthState::Insufficient | AuthState::Failed)
    }
}

/// Runs approvals and remembers where each (token, spender) stands
pub struct Authorizer<P> {
    forwarder: P,
    clock: Clock,
    states: Mutex<HashMap<(Address, Address), AuthState>>,
}

impl<P: PermitForwarder> Authorizer<P> {
    pub fn new(forwarder: P, clock: Clock) -> Self {
        Self {
            forwarder,
            clock,
            states: Mutex::new(HashMap::new()),
        }
    }

    pub fn forwarder(&self) -> &P {
        &self.forwarder
    }

    fn states(&self) -> MutexGuard<'_, HashMap<(Address, Address), AuthState>> {
        self.states.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set(&self, token: Address, spender: Address, state: AuthState) {
        tracing::debug!("Authorization of {} for {}: {:?}", token, spender, state);
        self.states().insert((token, spender), state);
    }

    /// Last known state, `Unknown` if never evaluated
    pub fn state(&self, token: Address, spender: Address) -> AuthState {
        self.states().get(&(token, spender)).copied().unwrap_or_default()
    }

    /// Re-evaluate from a fresh balance and allowance.
    ///
    /// A running approval is not overridden, and a failed one stays failed
    /// until the allowance actually covers the balance.
    pub fn evaluate(&self, token: Address, spender: Address, balance: U256, allowance: U256) -> AuthState {
        let mut states = self.states();
        let current = states.get(&(token, spender)).copied().unwrap_or_default();
        let next = match (current, AuthState::from_amounts(balance, allowance)) {
            (AuthState::Approving, _) => AuthState::Approving,
            (AuthState::Failed, AuthState::Insufficient) => AuthState::Failed,
            (_, fresh) => fresh,
        };
        states.insert((token, spender), next);
        next
    }

    /// `approve(spender, amount)` sent from the wallet, which pays the gas
    pub async fn approve_direct<S: TransactionSigner>(
        &self,
        wallet: &Wallet<S>,
        token: Address,
        spender: Address,
        amount: U256,
    ) -> Result<TxHandle, DisperseError> {
        self.set(token, spender, AuthState::Approving);

        let call = IERC20Permit::approveCall { spender, amount };
        let tx = TxRequest::new(token, call.abi_encode()).with_from(wallet.address());

        let signer = wallet.lock().await;
        match signer.submit(tx).await {
            Ok(handle) => {
                tracing::info!("Approved {} of {} for {}: {}", amount, token, spender, handle.hash);
                self.set(token, spender, AuthState::Sufficient);
                Ok(handle)
            }
            Err(err) => {
                tracing::error!("Approval of {} for {} failed: {:#}", token, spender, err);
                self.set(token, spender, AuthState::Failed);
                Err(DisperseError::ApprovalFailed(err))
            }
        }
    }

    /// Sign an EIP-2612 permit and hand it to the permit relay.
    ///
    /// The nonce is read from the token on every call, and the wallet stays
    /// locked until the relay has answered, so a second permit cannot be
    /// signed over the nonce the first one consumes.
    pub async fn approve_gasless<S, R>(
        &self,
        wallet: &Wallet<S>,
        reader: &R,
        token: Address,
        spender: Address,
        amount: U256,
    ) -> Result<TxHandle, DisperseError>
    where
        S: TransactionSigner + TypedDataSigner,
        R: ChainReader,
    {
        self.set(token, spender, AuthState::Approving);
        let result = self.sign_and_forward(wallet, reader, token, spender, amount).await;
        match &result {
            Ok(handle) => {
                tracing::info!("Permit for {} of {} relayed: {}", amount, token, handle.hash);
                self.set(token, spender, AuthState::Sufficient);
            }
            Err(err) => {
                tracing::error!("Gasless approval of {} for {} failed: {}", token, spender, err);
                self.set(token, spender, AuthState::Failed);
            }
        }
        result
    }

    async fn sign_and_forward<S, R>(
        &self,
        wallet: &Wallet<S>,
        reader: &R,
        token: Address,
        spender: Address,
        amount: U256,
    ) -> Result<TxHandle, DisperseError>
    where
        S: TransactionSigner + TypedDataSigner,
        R: ChainReader,
    {
        let owner = wallet.address();
        let signer = wallet.lock().await;

        let (name, chain_id, nonce) = join3(
            settle(reader.token_name(token)),
            settle(reader.chain_id()),
            settle(reader.permit_nonce(token, owner)),
        )
        .await;
        let message = PermitMessage {
            token,
            token_name: name.into_result().map_err(DisperseError::CannotBuildPermit)?,
            chain_id: chain_id.into_result().map_err(DisperseError::CannotBuildPermit)?,
            owner,
            spender,
            value: amount,
            nonce: nonce.into_result().map_err(DisperseError::CannotBuildPermit)?,
            deadline: max_permit_deadline((self.clock)()),
        };
        tracing::debug!("Signing permit for {} with nonce {}", token, message.nonce);

        let signature = signer
            .sign_hash(message.signing_hash())
            .await
            .map_err(DisperseError::SignatureDenied)?;

        let now = (self.clock)();
        if !message.deadline_ok_at(now) {
            return Err(DisperseError::DeadlineTooFar {
                deadline: message.deadline,
                max: max_permit_deadline(now),
            });
        }

        let tx_hash = self
            .forwarder
            .forward(PermitRelayRequest::new(&message, &signature))
            .await
            .map_err(DisperseError::RelaySubmitFailed)?;
        Ok(TxHandle::relayed(tx_hash))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::testing::FakeChain;
    use crate::signer::testing::FakeSigner;
    use crate::signer::Channel;
    use alloy::primitives::{address, TxHash};
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    const TOKEN: Address = address!("0x1111111111111111111111111111111111111111");
    const GASLESS: Address = address!("0x4444444444444444444444444444444444444444");
    const NOW: u64 = 1_700_000_000;

    fn fixed_clock() -> u64 {
        NOW
    }

    /// Accepts a permit only if it was signed by the owner over the token's
    /// current nonce, then consumes that nonce.
    struct VerifyingForwarder {
        chain: Arc<FakeChain>,
        forwarded: Mutex<Vec<PermitRelayRequest>>,
    }

    impl VerifyingForwarder {
        fn new(chain: Arc<FakeChain>) -> Self {
            Self {
                chain,
                forwarded: Mutex::new(Vec::new()),
            }
        }
    }

    impl PermitForwarder for VerifyingForwarder {
        async fn forward(&self, request: PermitRelayRequest) -> eyre::Result<TxHash> {
            let nonce = self.chain.permit_nonce(request.token_address, request.owner).await?;
            let message = PermitMessage {
                token: request.token_address,
                token_name: "Token".to_string(),
                chain_id: self.chain.chain_id,
                owner: request.owner,
                spender: request.spender,
                value: request.value,
                nonce,
                deadline: request.deadline,
            };
            let signature = alloy::primitives::Signature::try_from(&request.signature[..])?;
            let signer = signature.recover_address_from_prehash(&message.signing_hash())?;
            if signer != request.owner {
                eyre::bail!("ERC20Permit: invalid signature");
            }
            self.chain
                .set_nonce(request.token_address, request.owner, nonce.to::<u64>() + 1);

            let mut forwarded = self.forwarded.lock().unwrap();
            forwarded.push(request);
            Ok(TxHash::with_last_byte(forwarded.len() as u8))
        }
    }

    fn setup(chain: FakeChain) -> (Arc<FakeChain>, Authorizer<VerifyingForwarder>) {
        let chain = Arc::new(chain);
        let authorizer = Authorizer::new(VerifyingForwarder::new(chain.clone()), fixed_clock);
        (chain, authorizer)
    }

    #[test]
    fn test_needs_authorization() {
        assert!(!needs_authorization(U256::ZERO, U256::ZERO));
        assert!(!needs_authorization(U256::ZERO, U256::from(5u8)));
        assert!(needs_authorization(U256::from(100u8), U256::from(99u8)));
        assert!(!needs_authorization(U256::from(100u8), U256::from(100u8)));
        assert!(!needs_authorization(U256::from(100u8), U256::MAX));
    }

    #[test]
    fn test_evaluate_transitions() {
        let (_, authorizer) = setup(FakeChain::new(5));
        let hundred = U256::from(100u8);

        assert_eq!(authorizer.state(TOKEN, GASLESS), AuthState::Unknown);
        assert_eq!(
            authorizer.evaluate(TOKEN, GASLESS, hundred, U256::ZERO),
            AuthState::Insufficient
        );

        authorizer.set(TOKEN, GASLESS, AuthState::Approving);
        assert_eq!(
            authorizer.evaluate(TOKEN, GASLESS, hundred, U256::ZERO),
            AuthState::Approving
        );

        authorizer.set(TOKEN, GASLESS, AuthState::Failed);
        assert_eq!(authorizer.evaluate(TOKEN, GASLESS, hundred, U256::ZERO), AuthState::Failed);
        assert_eq!(authorizer.evaluate(TOKEN, GASLESS, hundred, hundred), AuthState::Sufficient);
    }

    #[tokio::test]
    async fn test_approve_direct_submits_approve_call() {
        let (_, authorizer) = setup(FakeChain::new(5));
        let wallet = Wallet::new(FakeSigner::with_test_key());

        let handle = authorizer
            .approve_direct(&wallet, TOKEN, GASLESS, U256::from(42u8))
            .await
            .unwrap();

        assert_eq!(handle.channel, Channel::Direct);
        assert_eq!(authorizer.state(TOKEN, GASLESS), AuthState::Sufficient);

        let sent = wallet.lock().await.sent();
        assert_eq!(sent[0].to, TOKEN);
        assert_eq!(sent[0].from, Some(wallet.address()));
        let call = IERC20Permit::approveCall::abi_decode(&sent[0].data).unwrap();
        assert_eq!(call.spender, GASLESS);
        assert_eq!(call.amount, U256::from(42u8));
    }

    #[tokio::test]
    async fn test_approve_direct_failure() {
        let (_, authorizer) = setup(FakeChain::new(5));
        let wallet = Wallet::new(FakeSigner::with_test_key().failing("User rejected the request"));

        let err = authorizer
            .approve_direct(&wallet, TOKEN, GASLESS, U256::from(1u8))
            .await
            .unwrap_err();

        assert!(matches!(err, DisperseError::ApprovalFailed(_)));
        assert_eq!(authorizer.state(TOKEN, GASLESS), AuthState::Failed);
        assert!(authorizer.state(TOKEN, GASLESS).can_approve());
    }

    #[tokio::test]
    async fn test_gasless_permit_is_relayed() {
        let (_, authorizer) = setup(FakeChain::new(5));
        let wallet = Wallet::new(FakeSigner::with_test_key());

        let handle = authorizer
            .approve_gasless(&wallet, &authorizer.forwarder.chain, TOKEN, GASLESS, U256::from(7u8))
            .await
            .unwrap();

        assert_eq!(handle.channel, Channel::Relay);
        assert_eq!(authorizer.state(TOKEN, GASLESS), AuthState::Sufficient);

        let forwarded = authorizer.forwarder.forwarded.lock().unwrap();
        assert_eq!(forwarded[0].owner, wallet.address());
        assert_eq!(forwarded[0].spender, GASLESS);
        assert_eq!(forwarded[0].deadline, NOW + 600);
        assert!(!wallet.is_busy());
    }

    #[tokio::test]
    async fn test_every_permit_reads_a_fresh_nonce() {
        let (chain, authorizer) = setup(FakeChain::new(5));
        let wallet = Wallet::new(FakeSigner::with_test_key());

        for _ in 0..2 {
            authorizer
                .approve_gasless(&wallet, &chain, TOKEN, GASLESS, U256::from(7u8))
                .await
                .unwrap();
        }

        assert_eq!(chain.nonce_reads.load(Ordering::SeqCst), 2);
        let signed = wallet.lock().await.signed();
        assert_eq!(signed.len(), 2);
        assert_ne!(signed[0], signed[1]);
    }

    #[tokio::test]
    async fn test_denied_signature() {
        let (chain, authorizer) = setup(FakeChain::new(5));
        let wallet = Wallet::new(FakeSigner::with_test_key().denying_signatures());

        let err = authorizer
            .approve_gasless(&wallet, &chain, TOKEN, GASLESS, U256::from(7u8))
            .await
            .unwrap_err();

        assert!(matches!(err, DisperseError::SignatureDenied(_)));
        assert_eq!(authorizer.state(TOKEN, GASLESS), AuthState::Failed);
        assert!(authorizer.forwarder.forwarded.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unreadable_token_cannot_build_permit() {
        let (chain, authorizer) = setup(FakeChain::new(5).fail("nonce"));
        let wallet = Wallet::new(FakeSigner::with_test_key());

        let err = authorizer
            .approve_gasless(&wallet, &chain, TOKEN, GASLESS, U256::from(7u8))
            .await
            .unwrap_err();

        assert!(matches!(err, DisperseError::CannotBuildPermit(_)));
        assert!(wallet.lock().await.signed().is_empty());
    }

    static SKEWED_CALLS: AtomicU64 = AtomicU64::new(0);

    /// Jumps backwards between building the permit and forwarding it
    fn skewed_clock() -> u64 {
        if SKEWED_CALLS.fetch_add(1, Ordering::SeqCst) == 0 {
            NOW
        } else {
            NOW - 60
        }
    }

    #[tokio::test]
    async fn test_deadline_checked_before_forwarding() {
        let chain = Arc::new(FakeChain::new(5));
        let authorizer = Authorizer::new(VerifyingForwarder::new(chain.clone()), skewed_clock);
        let wallet = Wallet::new(FakeSigner::with_test_key());

        let err = authorizer
            .approve_gasless(&wallet, &chain, TOKEN, GASLESS, U256::from(7u8))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DisperseError::DeadlineTooFar { deadline, max } if deadline == NOW + 600 && max == NOW + 540
        ));
        assert!(authorizer.forwarder.forwarded.lock().unwrap().is_empty());
    }
}
