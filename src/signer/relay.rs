//! Meta-transaction relay channel
//!
//! The relay executes a populated (encoded, unsigned) call on behalf of the
//! user and pays the gas. A [`RelaySession`] is scoped to one target contract
//! and is created by [`RelayClient::init`].

use super::{TransactionSigner, TxHandle, TxRequest};
use crate::config::RelayConfig;
use crate::constants::{HTTP_TIMEOUT_SECS, RELAY_SIGNATURE_TYPE};
use crate::error::DisperseError;
use alloy::primitives::{Address, TxHash};
use eyre::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const API_KEY_HEADER: &str = "x-api-key";

// ========== API Request/Response Types ==========

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MetaTxRequest {
    to: String,
    from: String,
    data: String,
    signature_type: &'static str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MetaTxResponse {
    #[serde(default)]
    tx_hash: Option<TxHash>,
    #[serde(default)]
    error: Option<String>,
}

/// Entry point to the meta-transaction provider
#[derive(Debug, Clone)]
pub struct RelayClient {
    config: RelayConfig,
    client: Client,
}

impl RelayClient {
    pub fn new(config: RelayConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { config, client })
    }

    /// Open a session for calls to `contract` made on behalf of `from`.
    ///
    /// Fails with [`DisperseError::RelayUnavailable`] when no API key is
    /// configured or the relay does not accept the contract.
    pub async fn init(&self, contract: Address, from: Address) -> Result<RelaySession, DisperseError> {
        let api_key = self
            .config
            .api_key
            .clone()
            .ok_or_else(|| DisperseError::RelayUnavailable(eyre::eyre!("relay API key not configured")))?;

        let url = format!(
            "{}/api/v2/meta-tx/contracts/{:?}",
            self.config.url.trim_end_matches('/'),
            contract
        );
        tracing::debug!("Initializing relay session for {}", contract);

        let resp = self
            .client
            .get(&url)
            .header(API_KEY_HEADER, &api_key)
            .send()
            .await
            .context("Failed to reach relay")
            .map_err(DisperseError::RelayUnavailable)?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(DisperseError::RelayUnavailable(eyre::eyre!(
                "Relay rejected contract {}: {} - {}",
                contract,
                status,
                body
            )));
        }

        tracing::info!("Relay session ready for {}", contract);
        Ok(RelaySession {
            url: self.config.url.trim_end_matches('/').to_string(),
            api_key,
            client: self.client.clone(),
            contract,
            from,
        })
    }
}

/// Relay session bound to one target contract
#[derive(Debug, Clone)]
pub struct RelaySession {
    url: String,
    api_key: String,
    client: Client,
    contract: Address,
    from: Address,
}

impl RelaySession {
    pub fn contract(&self) -> Address {
        self.contract
    }

    async fn forward(&self, tx: &TxRequest) -> Result<TxHash, DisperseError> {
        if tx.to != self.contract {
            return Err(DisperseError::RelaySubmitFailed(eyre::eyre!(
                "Session is scoped to {}, not {}",
                self.contract,
                tx.to
            )));
        }

        let request = MetaTxRequest {
            to: format!("{:?}", tx.to),
            from: format!("{:?}", tx.from.unwrap_or(self.from)),
            data: tx.data.to_string(),
            signature_type: RELAY_SIGNATURE_TYPE,
        };

        let url = format!("{}/api/v2/meta-tx/native", self.url);
        let resp = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&request)
            .send()
            .await
            .context("Failed to submit meta transaction")
            .map_err(DisperseError::RelaySubmitFailed)?;

        let status = resp.status();
        let body: MetaTxResponse = resp
            .json()
            .await
            .context("Failed to parse relay response")
            .map_err(DisperseError::RelaySubmitFailed)?;

        if !status.is_success() {
            return Err(DisperseError::RelaySubmitFailed(eyre::eyre!(
                "Relay rejected transaction: {} - {}",
                status,
                body.error.unwrap_or_default()
            )));
        }

        body.tx_hash.ok_or_else(|| {
            DisperseError::RelaySubmitFailed(eyre::eyre!("Relay accepted transaction but returned no hash"))
        })
    }
}

impl TransactionSigner for RelaySession {
    fn address(&self) -> Address {
        self.from
    }

    async fn submit(&self, tx: TxRequest) -> Result<TxHandle> {
        let tx_hash = self.forward(&tx).await?;
        tracing::info!("Relay accepted meta transaction: {}", tx_hash);
        Ok(TxHandle::relayed(tx_hash))
    }
}
