//! Permit relay: both ends of `POST /approve-gasless`
//!
//! The wallet only signs a permit; a backend holding a funded key submits the
//! `permit()` transaction. [`PermitRelayClient`] is the caller's side,
//! [`PermitRelayer`] is the backend's request handler.

use crate::constants::{max_permit_deadline, HTTP_TIMEOUT_SECS};
use crate::contracts::IERC20Permit;
use crate::signer::{LocalSigner, TransactionSigner, TxRequest};
use crate::types::{PermitRelayRejection, PermitRelayRequest, PermitRelayResponse, SplitSignature};
use alloy::primitives::{Bytes, TxHash};
use alloy::sol_types::SolCall;
use eyre::{Context, Result};
use reqwest::Client;
use std::future::Future;
use std::time::Duration;

/// Hands a signed permit to whoever will execute it
pub trait PermitForwarder: Send + Sync {
    fn forward(&self, request: PermitRelayRequest) -> impl Future<Output = Result<TxHash>> + Send;
}

/// HTTP client for the permit relay backend
#[derive(Debug, Clone)]
pub struct PermitRelayClient {
    url: String,
    client: Client,
}

impl PermitRelayClient {
    /// `base_url` is the backend root; requests go to `{base_url}/approve-gasless`
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }
}

impl PermitForwarder for PermitRelayClient {
    async fn forward(&self, request: PermitRelayRequest) -> Result<TxHash> {
        let url = format!("{}/approve-gasless", self.url);
        let resp = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .context("Failed to reach permit relay")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            let reason = serde_json::from_str::<PermitRelayRejection>(&body)
                .map(|r| r.to_string())
                .unwrap_or(body);
            eyre::bail!("Permit relay rejected request: {} - {}", status, reason);
        }

        let response: PermitRelayResponse = resp
            .json()
            .await
            .context("Failed to parse permit relay response")?;
        Ok(response.tx_hash)
    }
}

/// Backend side: validates a signed permit and submits it with a funded key
pub struct PermitRelayer<S> {
    signer: S,
}

impl PermitRelayer<LocalSigner> {
    /// Use `DEPLOYER_PRIVATE_KEY` as the funded backend key
    pub fn from_env(rpc_url: &str) -> std::result::Result<Self, PermitRelayRejection> {
        let _ = dotenvy::dotenv();
        let key = std::env::var("DEPLOYER_PRIVATE_KEY")
            .ok()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| PermitRelayRejection::new("Missing DEPLOYER_PRIVATE_KEY"))?;
        let signer = LocalSigner::from_private_key(key, rpc_url).map_err(|e| {
            PermitRelayRejection::new("Invalid DEPLOYER_PRIVATE_KEY").with_reason(format!("{:#}", e))
        })?;
        Ok(Self::new(signer))
    }
}

impl<S: TransactionSigner> PermitRelayer<S> {
    pub fn new(signer: S) -> Self {
        Self { signer }
    }

    /// Handle one request received at time `now` (unix seconds).
    ///
    /// Rejects deadlines beyond `now + 600`, then submits
    /// `permit(owner, spender, value, deadline, v, r, s)` on the token.
    pub async fn handle(
        &self,
        request: PermitRelayRequest,
        now: u64,
    ) -> std::result::Result<PermitRelayResponse, PermitRelayRejection> {
        if request.deadline > max_permit_deadline(now) {
            tracing::warn!(
                "Rejecting permit for {}: deadline {} too far in the future",
                request.owner,
                request.deadline
            );
            return Err(PermitRelayRejection::new("Deadline is too far in the future"));
        }

        let split = SplitSignature::from_bytes(&request.signature).map_err(|e| {
            PermitRelayRejection::new("Invalid signature").with_reason(format!("{:#}", e))
        })?;

        let call = IERC20Permit::permitCall {
            owner: request.owner,
            spender: request.spender,
            value: request.value,
            deadline: alloy::primitives::U256::from(request.deadline),
            v: split.v,
            r: split.r,
            s: split.s,
        };
        let tx = TxRequest::new(request.token_address, Bytes::from(call.abi_encode()));

        match self.signer.submit(tx).await {
            Ok(handle) => {
                tracing::info!("Permit for {} submitted: {}", request.owner, handle.hash);
                Ok(PermitRelayResponse { tx_hash: handle.hash })
            }
            Err(err) => {
                tracing::error!("Permit transaction for {} failed: {:#}", request.owner, err);
                Err(PermitRelayRejection::new("Can't send permit transaction").with_reason(format!("{:#}", err)))
            }
        }
    }
}
