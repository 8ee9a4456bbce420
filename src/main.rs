// =============================================================================
// RateWatch — Main Entry Point
// =============================================================================
//
// Wires the shared dashboard state, the rate-limited Binance client, and the
// four polling monitors together, then serves the read-only API until Ctrl+C.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod api;
mod app_state;
mod binance;
mod collector;
mod metrics;
mod monitors;
mod narrative;
mod runtime_config;
mod shutdown;
mod snapshot;
mod timeseries;
mod types;

use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::app_state::DashboardState;
use crate::binance::{MarketDataClient, RateLimiter};
use crate::collector::ParallelCollector;
use crate::monitors::{
    FundingRanksMonitor, MoneyFlowMonitor, OpenInterestMonitor, PairWatchMonitor,
};
use crate::narrative::NarrativeAnnotator;
use crate::runtime_config::RuntimeConfig;
use crate::shutdown::ShutdownHandle;
use crate::snapshot::SnapshotStore;

// Snapshot artifacts, written under the configured data directory.
const FUNDING_SNAPSHOT_FILE: &str = "funding_rates_stats.json";
const FLOW_SNAPSHOT_FILE: &str = "money_flow_analysis.json";
const OI_SNAPSHOT_FILE: &str = "open_interest_report.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║        RateWatch Market Dashboard — Starting Up         ║");
    info!("╚══════════════════════════════════════════════════════════╝");

    let config_path =
        std::env::var("RATEWATCH_CONFIG").unwrap_or_else(|_| "ratewatch_config.json".into());

    let mut config = RuntimeConfig::load(&config_path).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        RuntimeConfig::default()
    });

    // Override watch list from env if available.
    if let Ok(syms) = std::env::var("RATEWATCH_SYMBOLS") {
        config.watch_symbols = syms
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
    }
    if config.watch_symbols.is_empty() {
        config.watch_symbols = vec!["BTCUSDT".into(), "ETHUSDT".into()];
    }
    if let Ok(addr) = std::env::var("RATEWATCH_BIND_ADDR") {
        config.bind_addr = addr;
    }

    info!(symbols = ?config.watch_symbols, quote = %config.quote_asset, "Configured watch list");
    info!(
        pair_poll_secs = config.pair_poll_secs,
        ranking_poll_secs = config.ranking_poll_secs,
        flow_poll_secs = config.flow_poll_secs,
        oi_poll_secs = config.oi_poll_secs,
        "Polling cadence"
    );

    // ── 2. Shared plumbing ───────────────────────────────────────────────
    let limiter = Arc::new(RateLimiter::new(
        config.rate_limit_max_requests,
        config.rate_limit_window(),
    ));
    let collector = Arc::new(ParallelCollector::new(config.fetch_workers));
    let annotator = Arc::new(NarrativeAnnotator::from_env());

    let funding_store = SnapshotStore::new(config.snapshot_path(FUNDING_SNAPSHOT_FILE));
    let flow_store = SnapshotStore::new(config.snapshot_path(FLOW_SNAPSHOT_FILE));
    let oi_store = SnapshotStore::new(config.snapshot_path(OI_SNAPSHOT_FILE));

    let bind_addr = config.bind_addr.clone();

    // ── 3. Build shared state & client ───────────────────────────────────
    let state = Arc::new(DashboardState::new(config));
    let client = Arc::new(MarketDataClient::new(limiter));

    // ── 4. Start the API server ──────────────────────────────────────────
    let api_state = state.clone();
    tokio::spawn(async move {
        let app = api::rest::router(api_state);
        let listener = tokio::net::TcpListener::bind(&bind_addr)
            .await
            .expect("Failed to bind API server");
        info!(addr = %bind_addr, "API server listening");
        axum::serve(listener, app)
            .await
            .expect("API server failed");
    });

    // ── 5. Spawn the monitors ────────────────────────────────────────────
    let shutdown = ShutdownHandle::new();
    let mut tasks = Vec::new();

    tasks.push((
        "pair watch",
        tokio::spawn(
            PairWatchMonitor::new(state.clone(), client.clone()).run(shutdown.subscribe()),
        ),
    ));
    tasks.push((
        "funding ranking",
        tokio::spawn(
            FundingRanksMonitor::new(state.clone(), client.clone(), funding_store)
                .run(shutdown.subscribe()),
        ),
    ));
    tasks.push((
        "money flow",
        tokio::spawn(
            MoneyFlowMonitor::new(
                state.clone(),
                client.clone(),
                collector.clone(),
                annotator.clone(),
                flow_store,
            )
            .run(shutdown.subscribe()),
        ),
    ));
    tasks.push((
        "open interest",
        tokio::spawn(
            OpenInterestMonitor::new(state.clone(), client.clone(), collector, oi_store)
                .run(shutdown.subscribe()),
        ),
    ));
    tasks.push((
        "narrative",
        tokio::spawn(narrative::run_narrative_loop(
            state.clone(),
            annotator,
            shutdown.subscribe(),
        )),
    ));

    info!("All monitors running. Press Ctrl+C to stop.");

    // ── 6. Graceful shutdown ─────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!("Shutdown signal received — stopping gracefully");

    shutdown.trigger();
    for (name, task) in tasks {
        if let Err(e) = task.await {
            error!(task = name, error = %e, "monitor task ended abnormally");
        }
    }

    if let Err(e) = state.runtime_config.read().save(&config_path) {
        error!(error = %e, "Failed to save runtime config on shutdown");
    }

    info!("RateWatch shut down complete.");
    Ok(())
}
