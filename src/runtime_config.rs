// =============================================================================
// Runtime Configuration
// =============================================================================
//
// One JSON file drives every dashboard: watch list, poll cadences, ranking
// sizes, fetch parallelism and the rate-limit budget. Every field carries a
// serde default, so a partial (or empty) config file fills in sensibly and
// old files keep loading as fields are added.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

fn default_watch_symbols() -> Vec<String> {
    vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()]
}
fn default_quote_asset() -> String {
    "USDT".to_string()
}
fn default_top_n() -> usize {
    5
}
fn default_flow_top_n() -> usize {
    20
}
fn default_oi_top_n() -> usize {
    10
}
fn default_pair_poll_secs() -> u64 {
    10
}
fn default_ranking_poll_secs() -> u64 {
    300
}
fn default_flow_poll_secs() -> u64 {
    300
}
fn default_oi_poll_secs() -> u64 {
    300
}
fn default_narrative_poll_secs() -> u64 {
    1800
}
fn default_history_window_hours() -> i64 {
    4
}
fn default_fetch_workers() -> usize {
    5
}
fn default_rate_limit_max_requests() -> usize {
    5
}
fn default_rate_limit_window_ms() -> u64 {
    1000
}
fn default_bind_addr() -> String {
    "0.0.0.0:3001".to_string()
}
fn default_data_dir() -> String {
    "data".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    // --- Watch list & universe ---
    /// Pairs sampled by the pair dashboard (spot + perp on each).
    #[serde(default = "default_watch_symbols")]
    pub watch_symbols: Vec<String>,
    /// Quote asset the ranking dashboards filter the exchange universe by.
    #[serde(default = "default_quote_asset")]
    pub quote_asset: String,

    // --- Ranking sizes ---
    #[serde(default = "default_top_n")]
    pub top_n: usize,
    #[serde(default = "default_flow_top_n")]
    pub flow_top_n: usize,
    #[serde(default = "default_oi_top_n")]
    pub oi_top_n: usize,

    // --- Poll cadences (seconds) ---
    #[serde(default = "default_pair_poll_secs")]
    pub pair_poll_secs: u64,
    #[serde(default = "default_ranking_poll_secs")]
    pub ranking_poll_secs: u64,
    #[serde(default = "default_flow_poll_secs")]
    pub flow_poll_secs: u64,
    #[serde(default = "default_oi_poll_secs")]
    pub oi_poll_secs: u64,
    #[serde(default = "default_narrative_poll_secs")]
    pub narrative_poll_secs: u64,

    // --- Retention ---
    /// How much pair history the in-memory series keeps, and how far the
    /// one-off backfill reaches back.
    #[serde(default = "default_history_window_hours")]
    pub history_window_hours: i64,

    // --- Fetch & throttle ---
    #[serde(default = "default_fetch_workers")]
    pub fetch_workers: usize,
    #[serde(default = "default_rate_limit_max_requests")]
    pub rate_limit_max_requests: usize,
    #[serde(default = "default_rate_limit_window_ms")]
    pub rate_limit_window_ms: u64,

    // --- Server & storage ---
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        // Every field has a serde default, so an empty document is the
        // canonical default config.
        serde_json::from_str("{}").expect("empty config must deserialise")
    }
}

impl RuntimeConfig {
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {path}"))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse config file {path}"))?;
        info!(path, "runtime config loaded");
        Ok(config)
    }

    pub fn save(&self, path: &str) -> Result<()> {
        let content =
            serde_json::to_string_pretty(self).context("failed to serialise config")?;
        std::fs::write(path, content)
            .with_context(|| format!("failed to write config file {path}"))?;
        info!(path, "runtime config saved");
        Ok(())
    }

    /// Pair-history retention as a chrono duration.
    pub fn history_window(&self) -> chrono::Duration {
        chrono::Duration::hours(self.history_window_hours.max(1))
    }

    /// Rate-limit window as a std duration.
    pub fn rate_limit_window(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.rate_limit_window_ms.max(1))
    }

    /// Where a persisted snapshot file lives under the data directory.
    pub fn snapshot_path(&self, file_name: &str) -> PathBuf {
        Path::new(&self.data_dir).join(file_name)
    }
}
