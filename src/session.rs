//! Remembers connected wallets between runs
//!
//! The set of connected wallet labels is written to a small JSON file on
//! every change, and on start the first label is used to reconnect
//! silently.

use alloy::primitives::Address;
use eyre::{Context, Result};
use std::fs;
use std::future::Future;
use std::path::{Path, PathBuf};
use tokio::sync::watch;
use tokio::task::JoinHandle;

const APP_DIR: &str = "disperse-sdk";
const SESSION_FILE: &str = "connected_wallets.json";

/// Connects a wallet by its label (e.g. "MetaMask")
pub trait WalletConnector: Send + Sync {
    /// With `silent`, the connector must not prompt the user
    fn connect(&self, label: &str, silent: bool) -> impl Future<Output = Result<Address>> + Send;
}

/// JSON file holding the connected wallet labels
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    /// Store under the user's data directory
    pub fn default_location() -> Result<Self> {
        let dir = dirs::data_dir().ok_or_else(|| eyre::eyre!("no data directory on this platform"))?;
        Ok(Self::at(dir.join(APP_DIR).join(SESSION_FILE)))
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stored labels; a missing or unreadable file means none
    pub fn load(&self) -> Vec<String> {
        match fs::read_to_string(&self.path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(labels) => labels,
                Err(e) => {
                    tracing::warn!("Ignoring corrupt session file {}: {}", self.path.display(), e);
                    Vec::new()
                }
            },
            Err(_) => Vec::new(),
        }
    }

    /// Overwrite the stored labels
    pub fn save(&self, labels: &[String]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content = serde_json::to_string(labels)?;
        fs::write(&self.path, content)
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        Ok(())
    }
}

/// Reconnect the last connected wallet without prompting.
///
/// Returns whether a wallet was reconnected. Failure is not an error: the
/// user simply has to connect manually.
pub async fn restore_session<C: WalletConnector>(store: &SessionStore, connector: &C) -> bool {
    let labels = store.load();
    let Some(label) = labels.first() else {
        return false;
    };

    match connector.connect(label, true).await {
        Ok(address) => {
            tracing::info!("Reconnected {} wallet {}", label, address);
            true
        }
        Err(e) => {
            tracing::debug!("Silent reconnect to {} failed: {:#}", label, e);
            false
        }
    }
}

/// Listener that writes wallet label changes to a [`SessionStore`]
///
/// Dropping it stops the listener too.
#[derive(Debug)]
pub struct Subscription {
    handle: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Stop listening and wait until the listener is gone
    pub async fn unsubscribe(mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            let _ = handle.await;
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// Persist the label set every time `labels` changes.
///
/// Must be called from within a tokio runtime.
pub fn persist_wallet_labels(store: SessionStore, mut labels: watch::Receiver<Vec<String>>) -> Subscription {
    let handle = tokio::spawn(async move {
        while labels.changed().await.is_ok() {
            let current = labels.borrow_and_update().clone();
            if let Err(e) = store.save(&current) {
                tracing::error!("Failed to persist connected wallets: {:#}", e);
            }
        }
        tracing::debug!("Wallet label source closed, session listener stopped");
    });

    Subscription { handle: Some(handle) }
}
