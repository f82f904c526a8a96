//! Presale Sentinel
//!
//! ```text
//! ┌──────────┐    ┌──────────┐    ┌──────────┐    ┌──────────┐
//! │ Treasury │───▶│  Poller  │───▶│ Executor │───▶│  Ledger  │
//! │  (RPC)   │    │(classify)│    │(pay/burn)│    │(PG / mem)│
//! └──────────┘    └──────────┘    └──────────┘    └────┬─────┘
//!                                                      │
//!                                 ┌──────────┐         │
//!                                 │ Gateway  │◀────────┘
//!                                 │ (stats)  │
//!                                 └──────────┘
//! ```
//!
//! Usage: `presale_sentinel [--env dev] [--config path/to/config.yaml]`

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;

use presale_sentinel::config::AppConfig;
use presale_sentinel::gateway::{self, state::AppState};
use presale_sentinel::presale::{
    LedgerStore, MemoryLedger, PgLedger, Poller, SolanaRpcClient, chain::ChainClient,
};

fn arg_value(flags: &[&str]) -> Option<String> {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if flags.contains(&args[i].as_str()) && i + 1 < args.len() {
            return Some(args[i + 1].clone());
        }
    }
    None
}

fn get_env() -> String {
    arg_value(&["--env", "-e"]).unwrap_or_else(|| "dev".to_string())
}

async fn open_ledger(config: &AppConfig, history: usize) -> anyhow::Result<Arc<dyn LedgerStore>> {
    match &config.postgres_url {
        Some(url) => {
            let ledger = PgLedger::connect(url)
                .await
                .context("Failed to connect to PostgreSQL ledger")?;
            ledger
                .init_schema()
                .await
                .context("Failed to initialise ledger schema")?;
            Ok(Arc::new(ledger))
        }
        None => {
            tracing::warn!(
                "No postgres_url configured, using the volatile ledger (last {} purchases)",
                history
            );
            Ok(Arc::new(MemoryLedger::new(history)))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let app_config = match arg_value(&["--config"]) {
        Some(path) => AppConfig::load_from(&path),
        None => AppConfig::load(&env),
    }
    .context("Failed to load configuration")?;
    let _log_guard = presale_sentinel::logging::init_logging(&app_config);

    tracing::info!(
        "Starting Presale Sentinel ({}) in {} mode",
        env!("GIT_HASH"),
        env
    );

    // Configuration errors are fatal before anything is served
    let (settings, distributor) = match app_config.validate() {
        Ok(validated) => validated,
        Err(e) => {
            tracing::error!("Invalid configuration: {}", e);
            return Err(e.into());
        }
    };
    let settings = Arc::new(settings);

    tracing::info!(
        treasury = %settings.treasury,
        mint = %settings.token_mint,
        distributor = %settings.distributor,
        tiers = settings.pricing.tiers().len(),
        cap = ?settings.policy.cap(),
        burn = settings.policy.burn_mode().as_str(),
        "Presale configured"
    );

    let chain: Arc<dyn ChainClient> = Arc::new(SolanaRpcClient::new(
        &app_config.chain,
        distributor,
        settings.token_mint,
        settings.token_decimals,
    )?);
    let ledger = open_ledger(&app_config, settings.memory_history).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let poller = Arc::new(Poller::new(chain.clone(), ledger.clone(), settings.clone()));
    let poller_handle = tokio::spawn({
        let poller = poller.clone();
        let shutdown = shutdown_rx.clone();
        async move { poller.run(shutdown).await }
    });

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            return;
        }
        tracing::info!("Shutdown requested");
        let _ = shutdown_tx.send(true);
    });

    let state = Arc::new(AppState::new(settings, chain, ledger));
    gateway::run_server(&app_config.gateway, state, shutdown_rx).await?;

    poller_handle.await.context("Poller task panicked")?;
    tracing::info!("Presale Sentinel stopped");
    Ok(())
}
