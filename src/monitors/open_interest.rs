// =============================================================================
// Open-Interest Monitor
// =============================================================================
//
// Sweeps every trading perpetual, compares current open interest against a
// baseline from a few hours back, and publishes the sharpest builds and
// unwinds plus breadth counts. The collector fans out the two requests each
// symbol needs; a failed symbol drops out of the cycle rather than failing
// the sweep.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{info, warn};

use crate::app_state::DashboardState;
use crate::binance::{FetchError, MarketDataClient};
use crate::collector::ParallelCollector;
use crate::metrics;
use crate::shutdown::ShutdownSignal;
use crate::snapshot::{format_timestamp, OiRecord, OiSnapshot, SnapshotStore};

/// Stat period of the baseline sample.
const BASELINE_PERIOD: &str = "1h";

pub struct OpenInterestMonitor {
    state: Arc<DashboardState>,
    client: Arc<MarketDataClient>,
    collector: Arc<ParallelCollector>,
    store: SnapshotStore<OiSnapshot>,
}

impl OpenInterestMonitor {
    pub fn new(
        state: Arc<DashboardState>,
        client: Arc<MarketDataClient>,
        collector: Arc<ParallelCollector>,
        store: SnapshotStore<OiSnapshot>,
    ) -> Self {
        Self {
            state,
            client,
            collector,
            store,
        }
    }

    pub async fn run(self, mut shutdown: ShutdownSignal) {
        let poll_secs = self.state.runtime_config.read().oi_poll_secs;
        let mut ticker = interval(Duration::from_secs(poll_secs.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_secs = poll_secs, "open interest monitor started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.run_cycle().await {
                        warn!(error = %e, "open interest cycle failed");
                        self.state.push_error(format!("open interest cycle failed: {e:#}"));
                    }
                }
                _ = shutdown.cancelled() => {
                    info!("open interest monitor stopped");
                    break;
                }
            }
        }
    }

    async fn run_cycle(&self) -> Result<()> {
        let (quote, top_n, window) = {
            let config = self.state.runtime_config.read();
            (config.quote_asset.clone(), config.oi_top_n, config.history_window())
        };

        let symbols = self.client.perpetual_symbols(&quote).await?;
        if symbols.is_empty() {
            warn!(quote = %quote, "no trading perpetuals found, skipping cycle");
            return Ok(());
        }
        info!(symbols = symbols.len(), "open interest sweep started");

        let baseline_ms = (Utc::now() - window).timestamp_millis();
        let client = Arc::clone(&self.client);
        let records = self
            .collector
            .collect(symbols, move |symbol| {
                let client = Arc::clone(&client);
                async move { fetch_oi_record(&client, symbol, baseline_ms).await }
            })
            .await;

        if records.is_empty() {
            warn!("no open interest records this cycle, keeping previous snapshot");
            return Ok(());
        }

        let snapshot = build_oi_snapshot(&records, top_n, Utc::now());

        if let Err(e) = self.store.save(&snapshot) {
            warn!(error = %e, "failed to persist open interest snapshot");
            self.state
                .push_error(format!("failed to persist open interest snapshot: {e:#}"));
        }

        info!(
            total = snapshot.total_symbols,
            increased = snapshot.increased,
            decreased = snapshot.decreased,
            "open interest cycle complete"
        );
        self.state.set_open_interest(snapshot);
        Ok(())
    }
}

/// Current OI plus the closest baseline sample at or before `baseline_ms`.
/// Listings younger than the baseline have no history; they report a zero
/// baseline and a zero percentage change.
async fn fetch_oi_record(
    client: &MarketDataClient,
    symbol: String,
    baseline_ms: i64,
) -> Result<OiRecord, FetchError> {
    let current_oi = client.open_interest(&symbol).await?;
    let history = client
        .open_interest_history(&symbol, BASELINE_PERIOD, None, Some(baseline_ms), 1)
        .await?;

    let historical_oi = history.first().map(|p| p.value).unwrap_or(0.0);
    let (change, change_pct) = metrics::oi_change(current_oi, historical_oi);

    Ok(OiRecord {
        symbol,
        current_oi,
        historical_oi,
        change,
        change_pct,
    })
}

/// Pure snapshot assembly: breadth counts plus the top movers by percentage
/// change on each side. Unchanged symbols count for neither side.
pub fn build_oi_snapshot(records: &[OiRecord], top_n: usize, now: DateTime<Utc>) -> OiSnapshot {
    let increased = records.iter().filter(|r| r.change > 0.0).count();
    let decreased = records.iter().filter(|r| r.change < 0.0).count();

    let mut top_increases: Vec<OiRecord> = records
        .iter()
        .filter(|r| r.change > 0.0)
        .cloned()
        .collect();
    top_increases.sort_by(|a, b| {
        b.change_pct
            .total_cmp(&a.change_pct)
            .then_with(|| a.symbol.cmp(&b.symbol))
    });
    top_increases.truncate(top_n);

    let mut top_decreases: Vec<OiRecord> = records
        .iter()
        .filter(|r| r.change < 0.0)
        .cloned()
        .collect();
    top_decreases.sort_by(|a, b| {
        a.change_pct
            .total_cmp(&b.change_pct)
            .then_with(|| a.symbol.cmp(&b.symbol))
    });
    top_decreases.truncate(top_n);

    OiSnapshot {
        timestamp: format_timestamp(now),
        total_symbols: records.len(),
        increased,
        decreased,
        top_increases,
        top_decreases,
    }
}
