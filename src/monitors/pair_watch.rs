// =============================================================================
// Pair Watch Monitor
// =============================================================================
//
// Fast loop over the configured watch list. Each cycle samples spot price,
// futures price, funding and open interest per symbol, derives the premium,
// and publishes both the latest metrics and a point in the rolling series.
//
// Degradation rules per sample:
//   - Both prices are required. Either failing skips the symbol this cycle.
//   - Funding / open interest are optional. On failure the last known value
//     is carried forward; with no prior value the field is simply absent.
//     Absent is never recorded as zero — zero is a real funding rate.
//
// On the first cycle a symbol also gets a one-shot history backfill from
// 1m klines so charts are not empty after a restart. Backfill failure
// degrades to live-only sampling and is not retried.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, TimeZone, Utc};
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::app_state::{DashboardState, PairMetrics};
use crate::binance::{Candle, MarketDataClient, SeriesPoint};
use crate::metrics;
use crate::shutdown::ShutdownSignal;
use crate::timeseries::MarketPoint;
use crate::types::Market;

/// Row cap for backfill requests; covers the 4h default window at 1m klines
/// with room to spare, and stays within every endpoint's maximum.
const BACKFILL_LIMIT: u32 = 500;
/// Stat period for the open-interest history used in backfill.
const BACKFILL_OI_PERIOD: &str = "5m";

pub struct PairWatchMonitor {
    state: Arc<DashboardState>,
    client: Arc<MarketDataClient>,
    /// Carry-forward caches for the optional metrics.
    last_funding: HashMap<String, f64>,
    last_oi: HashMap<String, f64>,
    /// Symbols whose one-shot backfill has already been attempted.
    backfill_attempted: HashSet<String>,
}

impl PairWatchMonitor {
    pub fn new(state: Arc<DashboardState>, client: Arc<MarketDataClient>) -> Self {
        Self {
            state,
            client,
            last_funding: HashMap::new(),
            last_oi: HashMap::new(),
            backfill_attempted: HashSet::new(),
        }
    }

    pub async fn run(mut self, mut shutdown: ShutdownSignal) {
        let poll_secs = self.state.runtime_config.read().pair_poll_secs;
        let mut ticker = interval(Duration::from_secs(poll_secs.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_secs = poll_secs, "pair watch monitor started");

        loop {
            tokio::select! {
                _ = ticker.tick() => self.run_cycle().await,
                _ = shutdown.cancelled() => {
                    info!("pair watch monitor stopped");
                    break;
                }
            }
        }
    }

    async fn run_cycle(&mut self) {
        let watch_symbols = self.state.runtime_config.read().watch_symbols.clone();
        for symbol in &watch_symbols {
            if self.backfill_attempted.insert(symbol.clone()) {
                match self.backfill(symbol).await {
                    Ok(points) => info!(symbol = %symbol, points, "history backfill complete"),
                    Err(e) => {
                        warn!(symbol = %symbol, error = %e, "history backfill failed, continuing live-only");
                        self.state
                            .push_error(format!("history backfill failed for {symbol}: {e:#}"));
                    }
                }
            }
            self.sample(symbol).await;
        }
    }

    // -------------------------------------------------------------------------
    // Live sampling
    // -------------------------------------------------------------------------

    async fn sample(&mut self, symbol: &str) {
        let price = match self.client.price_sample(symbol).await {
            Ok(sample) => sample,
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "price fetch failed, skipping sample");
                self.state
                    .push_error(format!("price fetch failed for {symbol}: {e}"));
                return;
            }
        };

        let funding_rate = match self.client.funding_sample(symbol).await {
            Ok(sample) => Some(sample.funding_rate),
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "funding fetch failed, carrying last value");
                self.last_funding.get(symbol).copied()
            }
        };
        let open_interest = match self.client.open_interest_sample(symbol).await {
            Ok(sample) => Some(sample.open_interest),
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "open interest fetch failed, carrying last value");
                self.last_oi.get(symbol).copied()
            }
        };

        let premium_pct = match metrics::premium(price.spot_price, price.futures_price) {
            Ok(premium) => premium,
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "premium undefined, skipping sample");
                return;
            }
        };

        if let Some(rate) = funding_rate {
            self.last_funding.insert(symbol.to_string(), rate);
        }
        if let Some(oi) = open_interest {
            self.last_oi.insert(symbol.to_string(), oi);
        }

        self.state.series.push(
            symbol,
            MarketPoint {
                at: price.at,
                spot_price: price.spot_price,
                futures_price: price.futures_price,
                premium_pct,
                funding_rate,
                open_interest,
            },
        );
        self.state.update_pair_metrics(PairMetrics {
            symbol: symbol.to_string(),
            spot_price: price.spot_price,
            futures_price: price.futures_price,
            premium_pct,
            funding_rate,
            funding_rate_pct: funding_rate.map(metrics::funding_rate_pct),
            open_interest,
            updated_at: price.at.to_rfc3339(),
        });

        debug!(symbol = %symbol, spot = price.spot_price, premium_pct, "pair sample recorded");
    }

    // -------------------------------------------------------------------------
    // History backfill
    // -------------------------------------------------------------------------

    async fn backfill(&self, symbol: &str) -> Result<usize> {
        let window = self.state.runtime_config.read().history_window();
        let end = Utc::now();
        let start = end - window;
        let start_ms = start.timestamp_millis();
        let end_ms = end.timestamp_millis();

        let spot = self
            .client
            .klines(Market::Spot, symbol, "1m", Some(start_ms), Some(end_ms), BACKFILL_LIMIT)
            .await?;
        let futures = self
            .client
            .klines(Market::Futures, symbol, "1m", Some(start_ms), Some(end_ms), BACKFILL_LIMIT)
            .await?;

        // Funding and OI history are sparse relative to 1m klines; failure
        // here just leaves those fields empty in the backfilled points.
        let funding = match self
            .client
            .funding_rate_history(symbol, start_ms, end_ms, BACKFILL_LIMIT)
            .await
        {
            Ok(points) => points,
            Err(e) => {
                debug!(symbol = %symbol, error = %e, "funding history unavailable for backfill");
                Vec::new()
            }
        };
        let open_interest = match self
            .client
            .open_interest_history(
                symbol,
                BACKFILL_OI_PERIOD,
                Some(start_ms),
                Some(end_ms),
                BACKFILL_LIMIT,
            )
            .await
        {
            Ok(points) => points,
            Err(e) => {
                debug!(symbol = %symbol, error = %e, "open interest history unavailable for backfill");
                Vec::new()
            }
        };

        let points = merge_backfill(&spot, &futures, &funding, &open_interest);
        let count = points.len();
        self.state.series.extend(symbol, points);
        self.state.increment_version();
        Ok(count)
    }
}

// -----------------------------------------------------------------------------
// Pure backfill assembly
// -----------------------------------------------------------------------------

/// Zip spot and futures klines into series points. The exchange returns both
/// markets aligned on the same interval grid, so rows pair up by index; the
/// shorter side bounds the result. Funding and OI points are mapped by
/// nearest timestamp since their grids are much coarser.
fn merge_backfill(
    spot: &[Candle],
    futures: &[Candle],
    funding: &[SeriesPoint],
    open_interest: &[SeriesPoint],
) -> Vec<MarketPoint> {
    let len = spot.len().min(futures.len());
    let mut points = Vec::with_capacity(len);

    for i in 0..len {
        let s = &spot[i];
        let f = &futures[i];
        let premium_pct = match metrics::premium(s.close, f.close) {
            Ok(premium) => premium,
            Err(_) => continue,
        };
        points.push(MarketPoint {
            at: timestamp_from_ms(s.open_time),
            spot_price: s.close,
            futures_price: f.close,
            premium_pct,
            funding_rate: nearest_value(funding, s.open_time),
            open_interest: nearest_value(open_interest, s.open_time),
        });
    }
    points
}

/// Value of the point nearest to `at_ms`, if any points exist.
fn nearest_value(points: &[SeriesPoint], at_ms: i64) -> Option<f64> {
    points
        .iter()
        .min_by_key(|p| (p.at_ms - at_ms).abs())
        .map(|p| p.value)
}

fn timestamp_from_ms(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_else(Utc::now)
}
