// =============================================================================
// Money-Flow Monitor
// =============================================================================
//
// Ranks the whole exchange by net taker flow over the last completed 4h
// candle, separately for spot and futures. The kline window is anchored to
// the most recent UTC midnight so the candle under examination is always
// closed, and the same two-candle request works all day. The collector fans
// the per-symbol kline fetches out; symbols that fail or are too young to
// have both candles are simply absent from that cycle's ranking.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{info, warn};

use crate::app_state::DashboardState;
use crate::binance::{Candle, FetchError, MarketDataClient};
use crate::collector::ParallelCollector;
use crate::metrics::{self, RankOrder};
use crate::narrative::NarrativeAnnotator;
use crate::shutdown::ShutdownSignal;
use crate::snapshot::{format_timestamp, FlowRecord, FlowSnapshot, SnapshotStore};
use crate::types::Market;

const FLOW_INTERVAL: &str = "4h";

pub struct MoneyFlowMonitor {
    state: Arc<DashboardState>,
    client: Arc<MarketDataClient>,
    collector: Arc<ParallelCollector>,
    annotator: Arc<NarrativeAnnotator>,
    store: SnapshotStore<FlowSnapshot>,
}

impl MoneyFlowMonitor {
    pub fn new(
        state: Arc<DashboardState>,
        client: Arc<MarketDataClient>,
        collector: Arc<ParallelCollector>,
        annotator: Arc<NarrativeAnnotator>,
        store: SnapshotStore<FlowSnapshot>,
    ) -> Self {
        Self {
            state,
            client,
            collector,
            annotator,
            store,
        }
    }

    pub async fn run(self, mut shutdown: ShutdownSignal) {
        let poll_secs = self.state.runtime_config.read().flow_poll_secs;
        let mut ticker = interval(Duration::from_secs(poll_secs.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_secs = poll_secs, "money flow monitor started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.run_cycle().await {
                        warn!(error = %e, "money flow cycle failed");
                        self.state.push_error(format!("money flow cycle failed: {e:#}"));
                    }
                }
                _ = shutdown.cancelled() => {
                    info!("money flow monitor stopped");
                    break;
                }
            }
        }
    }

    async fn run_cycle(&self) -> Result<()> {
        let (quote, top_n) = {
            let config = self.state.runtime_config.read();
            (config.quote_asset.clone(), config.flow_top_n)
        };
        let (start_ms, end_ms) = flow_window(Utc::now());

        let spot_symbols = self.client.tradable_symbols(Market::Spot, &quote).await?;
        let futures_symbols = self.client.tradable_symbols(Market::Futures, &quote).await?;
        info!(
            spot = spot_symbols.len(),
            futures = futures_symbols.len(),
            "money flow universe resolved"
        );

        let spot_records = self
            .collect_market(Market::Spot, spot_symbols, start_ms, end_ms)
            .await;
        let futures_records = self
            .collect_market(Market::Futures, futures_symbols, start_ms, end_ms)
            .await;

        if spot_records.is_empty() && futures_records.is_empty() {
            warn!("no flow records this cycle, keeping previous snapshot");
            return Ok(());
        }

        let mut snapshot = build_flow_snapshot(spot_records, futures_records, top_n, Utc::now());
        snapshot.commentary = Some(self.annotator.annotate_flows(&snapshot).await);

        if let Err(e) = self.store.save(&snapshot) {
            warn!(error = %e, "failed to persist flow snapshot");
            self.state
                .push_error(format!("failed to persist flow snapshot: {e:#}"));
        }

        info!(
            spot_top = snapshot.spot_inflow_top.len(),
            futures_top = snapshot.futures_inflow_top.len(),
            "money flow cycle complete"
        );
        self.state.set_money_flow(snapshot);
        Ok(())
    }

    async fn collect_market(
        &self,
        market: Market,
        symbols: Vec<String>,
        start_ms: i64,
        end_ms: i64,
    ) -> Vec<FlowRecord> {
        let client = Arc::clone(&self.client);
        self.collector
            .collect(symbols, move |symbol| {
                let client = Arc::clone(&client);
                async move { fetch_flow(&client, market, symbol, start_ms, end_ms).await }
            })
            .await
    }
}

/// Fetch the two window candles for one symbol and reduce the completed one
/// to a flow record.
async fn fetch_flow(
    client: &MarketDataClient,
    market: Market,
    symbol: String,
    start_ms: i64,
    end_ms: i64,
) -> Result<FlowRecord, FetchError> {
    let candles = client
        .klines(market, &symbol, FLOW_INTERVAL, Some(start_ms), Some(end_ms), 2)
        .await?;

    // The window spans exactly two daily-aligned 4h candles; the later one
    // is the most recent fully completed candle. Fewer means the listing is
    // too young to rank this cycle.
    if candles.len() < 2 {
        return Err(FetchError::Shape(format!(
            "expected 2 candles in flow window, got {}",
            candles.len()
        )));
    }
    Ok(flow_record(&symbol, &candles[1]))
}

fn flow_record(symbol: &str, candle: &Candle) -> FlowRecord {
    FlowRecord {
        symbol: symbol.to_string(),
        open_time: candle.open_time,
        close_time: candle.close_time,
        close: candle.close,
        quote_volume: candle.quote_volume,
        taker_buy_quote_volume: candle.taker_buy_quote_volume,
        net_inflow: metrics::net_inflow(candle.taker_buy_quote_volume, candle.quote_volume),
    }
}

/// Kline window for the flow poll: from two days before the most recent UTC
/// midnight up to that midnight. Both edges are 4h-aligned, so the response
/// candles are complete.
fn flow_window(now: DateTime<Utc>) -> (i64, i64) {
    let midnight = now
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .expect("midnight is a valid time")
        .and_utc();
    let start = midnight - chrono::Duration::days(2);
    (start.timestamp_millis(), midnight.timestamp_millis())
}

/// Pure ranking assembly from collected per-market records.
pub fn build_flow_snapshot(
    spot: Vec<FlowRecord>,
    futures: Vec<FlowRecord>,
    top_n: usize,
    now: DateTime<Utc>,
) -> FlowSnapshot {
    FlowSnapshot {
        timestamp: format_timestamp(now),
        spot_inflow_top: top_flows(&spot, top_n, RankOrder::Descending),
        spot_outflow_top: top_flows(&spot, top_n, RankOrder::Ascending),
        futures_inflow_top: top_flows(&futures, top_n, RankOrder::Descending),
        futures_outflow_top: top_flows(&futures, top_n, RankOrder::Ascending),
        commentary: None,
    }
}

fn top_flows(records: &[FlowRecord], n: usize, order: RankOrder) -> Vec<FlowRecord> {
    let mut sorted = records.to_vec();
    sorted.sort_by(|a, b| {
        let by_value = match order {
            RankOrder::Descending => b.net_inflow.total_cmp(&a.net_inflow),
            RankOrder::Ascending => a.net_inflow.total_cmp(&b.net_inflow),
        };
        by_value.then_with(|| a.symbol.cmp(&b.symbol))
    });
    sorted.truncate(n);
    sorted
}
