//! Interactive CLI for the Disperse SDK
//!
//! Run with: cargo run --example interactive
//!
//! Requires PRIVATE_KEY and the DISPERSE_* environment variables

use std::io::{self, Write};

use alloy::primitives::{Address, U256};
use disperse_sdk::{
    format_units, persist_wallet_labels, restore_session, Asset, AuthState, DisperseClient,
    DisperseRequest, LocalSigner, NetworkConfig, Recipient, SessionStore, SpenderMode,
    TransactionSigner, TypedDataSigner, WalletConnector,
};
use tokio::sync::watch;

const WALLET_LABEL: &str = "Private key";

/// Reconnects the env-configured key; there is nothing to prompt for
struct EnvKeyConnector {
    rpc_url: String,
}

impl WalletConnector for EnvKeyConnector {
    async fn connect(&self, label: &str, _silent: bool) -> eyre::Result<Address> {
        if label != WALLET_LABEL {
            eyre::bail!("unknown wallet {}", label);
        }
        let key = std::env::var("PRIVATE_KEY")?;
        Ok(LocalSigner::from_private_key(key, &self.rpc_url)?.address())
    }
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = NetworkConfig::from_env()?;
    let store = SessionStore::default_location()?;
    let connector = EnvKeyConnector {
        rpc_url: config.rpc_url.clone(),
    };
    if restore_session(&store, &connector).await {
        println!("Restored previous session");
    }

    let private_key = std::env::var("PRIVATE_KEY").expect("PRIVATE_KEY must be set");
    let signer = LocalSigner::from_private_key(&private_key, &config.rpc_url)?;
    let client = DisperseClient::new(signer, config)?;

    let (labels, labels_rx) = watch::channel(Vec::new());
    let subscription = persist_wallet_labels(store, labels_rx);
    labels.send_replace(vec![WALLET_LABEL.to_string()]);

    println!("\n========================================");
    println!("       Disperse SDK Interactive CLI");
    println!("========================================");
    println!("Connected wallet: {}", client.address());

    loop {
        println!("\n----------------------------------------");
        println!("Select an option:");
        println!("  1. View balances");
        println!("  2. Approve token");
        println!("  3. Disperse");
        println!("  q. Quit");
        println!("----------------------------------------");

        let choice = prompt("Enter choice: ")?;
        let result = match choice.as_str() {
            "1" => view_flow(&client).await,
            "2" => approve_flow(&client).await,
            "3" => disperse_flow(&client).await,
            "q" | "Q" => {
                println!("\nGoodbye!");
                break;
            }
            _ => {
                println!("\nInvalid choice. Please try again.");
                Ok(())
            }
        };
        if let Err(e) = result {
            println!("Error: {:#}", e);
        }
    }

    subscription.unsubscribe().await;
    Ok(())
}

fn prompt(label: &str) -> eyre::Result<String> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

fn prompt_token() -> eyre::Result<Option<Address>> {
    let input = prompt("Token address (empty for native): ")?;
    if input.is_empty() {
        return Ok(None);
    }
    Ok(Some(input.parse()?))
}

fn prompt_mode() -> eyre::Result<SpenderMode> {
    let input = prompt("Gasless? [y/N]: ")?;
    Ok(SpenderMode::from_gasless(input.eq_ignore_ascii_case("y")))
}

async fn view_flow<S: TransactionSigner + TypedDataSigner>(client: &DisperseClient<S>) -> eyre::Result<()> {
    println!("\n=== Balances ===");
    println!("Native: {}", disperse_sdk::format_ether(client.native_balance().await));

    if let Some(token) = prompt_token()? {
        let state = client.refresh_token_state(token).await;
        if !state.is_fresh() {
            println!("Could not read {}", token);
            return Ok(());
        }
        println!("Balance: {}", format_units(state.balance, state.decimals));
        for mode in [SpenderMode::Direct, SpenderMode::Gasless] {
            println!(
                "Allowance ({:?}): {} [{:?}]",
                mode,
                format_units(state.allowance.get(mode), state.decimals),
                client.auth_state(token, mode).await
            );
        }
    }
    Ok(())
}

async fn approve_flow<S: TransactionSigner + TypedDataSigner>(client: &DisperseClient<S>) -> eyre::Result<()> {
    println!("\n=== Approve ===");
    let Some(token) = prompt_token()? else {
        println!("Native currency needs no approval");
        return Ok(());
    };
    let mode = prompt_mode()?;

    if client.auth_state(token, mode).await == AuthState::Sufficient {
        println!("Allowance already covers the balance");
        return Ok(());
    }
    let handle = client.approve(token, mode, U256::MAX).await?;
    println!("Approved: {} ({:?})", handle.hash, handle.channel);
    Ok(())
}

async fn disperse_flow<S: TransactionSigner + TypedDataSigner>(client: &DisperseClient<S>) -> eyre::Result<()> {
    println!("\n=== Disperse ===");
    let token = prompt_token()?;
    let gasless = token.is_some() && prompt_mode()? == SpenderMode::Gasless;

    println!("Recipients as `address amount`, one per line, empty line to finish:");
    let mut recipients = Vec::new();
    loop {
        let line = prompt("> ")?;
        if line.is_empty() {
            break;
        }
        let mut parts = line.split(|c: char| c == ',' || c.is_whitespace()).filter(|p| !p.is_empty());
        let address = parts.next().unwrap_or_default();
        let amount = parts.next().unwrap_or_default();
        recipients.push(Recipient::new(address, amount));
    }

    let request = match token {
        None => DisperseRequest::native(recipients),
        Some(address) => DisperseRequest::token(Asset::erc20(address), gasless, recipients),
    };

    match client.disperse(&request).await {
        Ok(handle) => println!("Sent: {} ({:?})", handle.hash, handle.channel),
        Err(e) if !e.field_errors().is_empty() => {
            for field in e.field_errors() {
                println!("  {}", field);
            }
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}
