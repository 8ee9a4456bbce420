// =============================================================================
// Funding-Rate Ranking Monitor
// =============================================================================
//
// Every cycle: pull the whole premium index in one request, rank the highest
// and lowest funders, and diff against the previous cycle's map for the
// biggest movers. The full rate map is persisted inside the snapshot so the
// first cycle after a restart still has a baseline to diff against.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{info, warn};

use crate::app_state::DashboardState;
use crate::binance::MarketDataClient;
use crate::metrics::{self, ChangeDirection, RankOrder};
use crate::shutdown::ShutdownSignal;
use crate::snapshot::{format_timestamp, ChangeEntry, FundingSnapshot, RateEntry, SnapshotStore};

pub struct FundingRanksMonitor {
    state: Arc<DashboardState>,
    client: Arc<MarketDataClient>,
    store: SnapshotStore<FundingSnapshot>,
    /// Rate map from the previous completed cycle; deltas diff against it.
    previous_rates: HashMap<String, f64>,
}

impl FundingRanksMonitor {
    pub fn new(
        state: Arc<DashboardState>,
        client: Arc<MarketDataClient>,
        store: SnapshotStore<FundingSnapshot>,
    ) -> Self {
        // Seed the comparison baseline from disk so deltas survive a restart.
        let previous_rates = store
            .load()
            .map(|snapshot: FundingSnapshot| snapshot.previous_rates)
            .unwrap_or_default();
        if !previous_rates.is_empty() {
            info!(symbols = previous_rates.len(), "funding baseline restored from disk");
        }

        Self {
            state,
            client,
            store,
            previous_rates,
        }
    }

    pub async fn run(mut self, mut shutdown: ShutdownSignal) {
        let poll_secs = self.state.runtime_config.read().ranking_poll_secs;
        let mut ticker = interval(Duration::from_secs(poll_secs.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_secs = poll_secs, "funding ranking monitor started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.run_cycle().await {
                        warn!(error = %e, "funding ranking cycle failed");
                        self.state.push_error(format!("funding ranking cycle failed: {e:#}"));
                    }
                }
                _ = shutdown.cancelled() => {
                    info!("funding ranking monitor stopped");
                    break;
                }
            }
        }
    }

    async fn run_cycle(&mut self) -> Result<()> {
        let (quote, top_n) = {
            let config = self.state.runtime_config.read();
            (config.quote_asset.clone(), config.top_n)
        };

        let current = self.client.all_funding_rates(&quote).await?;
        if current.is_empty() {
            warn!(quote = %quote, "premium index returned no matching symbols, skipping cycle");
            return Ok(());
        }

        let snapshot = build_funding_snapshot(&current, &self.previous_rates, top_n, Utc::now());

        // Persistence is best effort; the in-memory baseline advances either
        // way so the next diff stays against exactly one cycle ago.
        if let Err(e) = self.store.save(&snapshot) {
            warn!(error = %e, "failed to persist funding snapshot");
            self.state
                .push_error(format!("failed to persist funding snapshot: {e:#}"));
        }

        info!(
            symbols = current.len(),
            increases = snapshot.biggest_increases.len(),
            decreases = snapshot.biggest_decreases.len(),
            "funding ranking cycle complete"
        );

        self.previous_rates = current;
        self.state.set_funding_ranks(snapshot);
        Ok(())
    }
}

/// Pure snapshot assembly from one cycle's rate map and the previous one.
pub fn build_funding_snapshot(
    current: &HashMap<String, f64>,
    previous: &HashMap<String, f64>,
    top_n: usize,
    now: DateTime<Utc>,
) -> FundingSnapshot {
    let highest_rates = metrics::rank_top_n(current, top_n, RankOrder::Descending)
        .into_iter()
        .map(|e| RateEntry {
            symbol: e.symbol,
            rate: e.value,
        })
        .collect();
    let lowest_rates = metrics::rank_top_n(current, top_n, RankOrder::Ascending)
        .into_iter()
        .map(|e| RateEntry {
            symbol: e.symbol,
            rate: e.value,
        })
        .collect();

    let biggest_increases =
        metrics::biggest_changes(current, previous, top_n, ChangeDirection::Increasing)
            .into_iter()
            .map(|e| ChangeEntry {
                symbol: e.symbol,
                change: e.value,
            })
            .collect();
    let biggest_decreases =
        metrics::biggest_changes(current, previous, top_n, ChangeDirection::Decreasing)
            .into_iter()
            .map(|e| ChangeEntry {
                symbol: e.symbol,
                change: e.value,
            })
            .collect();

    FundingSnapshot {
        timestamp: format_timestamp(now),
        highest_rates,
        lowest_rates,
        biggest_increases,
        biggest_decreases,
        previous_rates: current.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rates(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
        pairs
            .iter()
            .map(|(symbol, rate)| (symbol.to_string(), *rate))
            .collect()
    }

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn full_cycle_ranks_and_diffs() {
        let current = rates(&[("AUSDT", 0.02), ("BUSDT", -0.01), ("CUSDT", 0.005)]);
        let previous = rates(&[("AUSDT", 0.01), ("BUSDT", -0.01), ("CUSDT", 0.01)]);

        let snapshot = build_funding_snapshot(&current, &previous, 2, now());

        let highest: Vec<&str> = snapshot.highest_rates.iter().map(|e| e.symbol.as_str()).collect();
        let lowest: Vec<&str> = snapshot.lowest_rates.iter().map(|e| e.symbol.as_str()).collect();
        assert_eq!(highest, vec!["AUSDT", "CUSDT"]);
        assert_eq!(lowest, vec!["BUSDT", "CUSDT"]);

        // A rose by 0.01, C fell by 0.005, B did not move.
        assert_eq!(snapshot.biggest_increases.len(), 1);
        assert_eq!(snapshot.biggest_increases[0].symbol, "AUSDT");
        assert!((snapshot.biggest_increases[0].change - 0.01).abs() < 1e-12);

        assert_eq!(snapshot.biggest_decreases.len(), 1);
        assert_eq!(snapshot.biggest_decreases[0].symbol, "CUSDT");
        assert!((snapshot.biggest_decreases[0].change + 0.005).abs() < 1e-12);

        let movers: Vec<&str> = snapshot
            .biggest_increases
            .iter()
            .chain(snapshot.biggest_decreases.iter())
            .map(|e| e.symbol.as_str())
            .collect();
        assert!(!movers.contains(&"BUSDT"));
    }

    #[test]
    fn first_cycle_has_rankings_but_no_deltas() {
        let current = rates(&[("AUSDT", 0.02), ("BUSDT", -0.01)]);
        let snapshot = build_funding_snapshot(&current, &HashMap::new(), 5, now());

        assert_eq!(snapshot.highest_rates.len(), 2);
        assert!(snapshot.biggest_increases.is_empty());
        assert!(snapshot.biggest_decreases.is_empty());
    }

    #[test]
    fn snapshot_embeds_current_map_as_next_baseline() {
        let current = rates(&[("AUSDT", 0.02)]);
        let snapshot = build_funding_snapshot(&current, &HashMap::new(), 5, now());
        assert_eq!(snapshot.previous_rates, current);
    }

    #[test]
    fn timestamp_is_formatted_for_the_artifact() {
        let snapshot = build_funding_snapshot(&HashMap::new(), &HashMap::new(), 5, now());
        assert_eq!(snapshot.timestamp, "2024-05-01 12:00:00");
    }

    #[tokio::test]
    async fn restart_restores_baseline_from_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("funding_rates_stats.json");

        let persisted = build_funding_snapshot(
            &rates(&[("AUSDT", 0.015)]),
            &HashMap::new(),
            5,
            now(),
        );
        let store: SnapshotStore<FundingSnapshot> = SnapshotStore::new(&path);
        store.save(&persisted).unwrap();

        let state = Arc::new(DashboardState::new(
            crate::runtime_config::RuntimeConfig::default(),
        ));
        let limiter = Arc::new(crate::binance::RateLimiter::new(
            5,
            std::time::Duration::from_secs(1),
        ));
        let client = Arc::new(MarketDataClient::new(limiter));

        let monitor = FundingRanksMonitor::new(state, client, SnapshotStore::new(&path));
        assert_eq!(monitor.previous_rates.get("AUSDT"), Some(&0.015));
    }
}
