//! Local private key wallet (direct channel)

use super::{TransactionSigner, TxHandle, TxRequest, TypedDataSigner};
use crate::constants::{RECEIPT_POLL_ATTEMPTS, RECEIPT_POLL_INTERVAL_SECS};
use alloy::network::{Ethereum, EthereumWallet, TransactionBuilder};
use alloy::primitives::{Address, Signature, TxHash, B256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::TransactionReceipt;
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::Signer;
use alloy::transports::http::reqwest::Url;
use eyre::{Context, Result};
use std::sync::Arc;

/// Wallet backed by a raw EVM private key.
///
/// Transactions are signed locally and broadcast through the configured RPC;
/// `submit` returns once the transaction has been included.
pub struct LocalSigner {
    /// Provider with wallet filler - handles nonce, gas, chain_id, and signing
    provider: Arc<dyn Provider<Ethereum>>,
    signer: PrivateKeySigner,
    address: Address,
}

impl LocalSigner {
    /// Create a new LocalSigner from a private key hex string
    ///
    /// # Arguments
    ///
    /// * `private_key` - Hex-encoded private key (with or without 0x prefix)
    /// * `rpc_url` - RPC endpoint URL
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let signer = LocalSigner::from_private_key("0x...", "http://localhost:8545")?;
    /// ```
    pub fn from_private_key(private_key: impl AsRef<str>, rpc_url: impl AsRef<str>) -> Result<Self> {
        let key = private_key.as_ref();
        let key = key.strip_prefix("0x").unwrap_or(key);

        let signer: PrivateKeySigner = key.parse().context("Failed to parse private key")?;

        let address = signer.address();
        let wallet = EthereumWallet::from(signer.clone());

        let url: Url = rpc_url.as_ref().parse().context("Invalid RPC URL")?;

        // Build provider with wallet filler - this handles nonce, gas, and signing
        let provider = ProviderBuilder::new().wallet(wallet).connect_http(url);

        Ok(Self {
            provider: Arc::new(provider),
            signer,
            address,
        })
    }

    /// Signs and broadcasts a transaction without waiting for inclusion
    pub async fn sign_and_send(&self, tx: &TxRequest) -> Result<TxHash> {
        let mut tx_request = alloy::rpc::types::TransactionRequest::default()
            .with_from(self.address)
            .with_to(tx.to)
            .with_value(tx.value)
            .with_input(tx.data.clone());

        if let Some(gas_limit) = tx.gas_limit {
            tx_request = tx_request.with_gas_limit(gas_limit);
        }

        let pending_tx = self
            .provider
            .send_transaction(tx_request)
            .await
            .context("Failed to send transaction")?;

        Ok(*pending_tx.tx_hash())
    }

    /// Waits for a transaction to be included and returns the receipt
    pub async fn wait_for_receipt(&self, tx_hash: TxHash) -> Result<TransactionReceipt> {
        let poll_interval = std::time::Duration::from_secs(RECEIPT_POLL_INTERVAL_SECS);

        for _ in 0..RECEIPT_POLL_ATTEMPTS {
            let receipt: Option<TransactionReceipt> = self
                .provider
                .get_transaction_receipt(tx_hash)
                .await
                .context("Failed to get transaction receipt")?;

            if let Some(receipt) = receipt {
                return Ok(receipt);
            }

            tokio::time::sleep(poll_interval).await;
        }

        eyre::bail!("Transaction receipt not found after timeout: {}", tx_hash)
    }
}

impl TransactionSigner for LocalSigner {
    fn address(&self) -> Address {
        self.address
    }

    async fn submit(&self, tx: TxRequest) -> Result<TxHandle> {
        let tx_hash = self.sign_and_send(&tx).await?;
        tracing::debug!("Sent transaction {} to {}, awaiting inclusion", tx_hash, tx.to);

        let receipt = self.wait_for_receipt(tx_hash).await?;
        if !receipt.status() {
            eyre::bail!("Transaction reverted: {}", tx_hash);
        }

        tracing::info!("Transaction {} included", tx_hash);
        Ok(TxHandle::direct(tx_hash))
    }
}

impl TypedDataSigner for LocalSigner {
    async fn sign_hash(&self, hash: B256) -> Result<Signature> {
        self.signer
            .sign_hash(&hash)
            .await
            .context("Failed to sign typed data")
    }
}
