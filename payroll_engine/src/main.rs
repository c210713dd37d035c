//! Entry point for the Payroll Engine binary.
//!
//! Running this binary starts an HTTP server exposing the payroll
//! engine.  The directory containing policy JSON files is taken from
//! `PAYROLL_POLICY_DIR` (default `policies`) and the bind address from
//! `PAYROLL_BIND_ADDR` (default `127.0.0.1:3000`).  Log verbosity
//! follows `RUST_LOG`.

use payroll_engine::{api, config::ServerConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = ServerConfig::from_env();
    if let Err(err) = api::serve(&config.bind_addr, config.policy_dir).await {
        tracing::error!(error = %format!("{err:#}"), "payroll server stopped");
        return Err(err);
    }
    Ok(())
}
