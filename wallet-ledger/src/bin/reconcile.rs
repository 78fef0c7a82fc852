//! Offline consistency check
//!
//! Replays every wallet's transaction log and compares it with the stored
//! balance. Prints a JSON report and exits non-zero on any drift.
//! The database is opened read-only, so the check can run next to a live
//! `wallet-api` and never creates a database at a mistyped path.
//!
//! Usage: `wallet-ledger-check [config.toml]` (falls back to `WALLET_*` env vars)

use anyhow::Context;
use wallet_ledger::{Config, LedgerService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    // Load configuration
    let config = match std::env::args().nth(1) {
        Some(path) => Config::from_file(&path)
            .with_context(|| format!("failed to load config from {}", path))?,
        None => Config::from_env().context("failed to load config from environment")?,
    };

    tracing::info!(data_dir = %config.data_dir.display(), "Opening wallet ledger read-only");
    let ledger = LedgerService::open_read_only(&config)
        .with_context(|| format!("failed to open ledger at {}", config.data_dir.display()))?;

    let reports = ledger.reconcile_all().await?;
    let drifted: Vec<_> = reports.iter().filter(|r| !r.consistent).collect();
    let stats = ledger.storage().get_stats()?;

    let summary = serde_json::json!({
        "wallets": stats.total_wallets,
        "transactions": stats.total_transactions,
        "drifted": drifted,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);

    if !drifted.is_empty() {
        tracing::error!(count = drifted.len(), "Wallets out of balance");
        std::process::exit(1);
    }

    tracing::info!(wallets = reports.len(), "All wallets reconcile");
    Ok(())
}
