//! Permit relay backend, one request per run
//!
//! Run with: echo '{...}' | cargo run --example permit_relay
//!
//! Reads a `POST /approve-gasless` body from stdin and prints the JSON
//! response. Requires DEPLOYER_PRIVATE_KEY and DISPERSE_RPC_URL.

use std::io::Read;

use disperse_sdk::constants::unix_now;
use disperse_sdk::{PermitRelayRequest, PermitRelayer};

#[tokio::main]
async fn main() -> eyre::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let rpc_url = std::env::var("DISPERSE_RPC_URL").expect("DISPERSE_RPC_URL must be set");

    let mut body = String::new();
    std::io::stdin().read_to_string(&mut body)?;
    let request: PermitRelayRequest = serde_json::from_str(&body)?;

    let response = match PermitRelayer::from_env(&rpc_url) {
        Ok(relayer) => relayer.handle(request, unix_now()).await,
        Err(rejection) => Err(rejection),
    };

    match response {
        Ok(ok) => println!("200 {}", serde_json::to_string(&ok)?),
        Err(rejection) => println!("500 {}", serde_json::to_string(&rejection)?),
    }
    Ok(())
}
