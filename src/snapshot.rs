// =============================================================================
// Persisted Dashboard Snapshots
// =============================================================================
//
// Each ranking dashboard writes its latest result to a JSON file so rankings
// and comparison baselines survive a restart. Writes go through a tmp file
// and an atomic rename; a reader never observes a half-written snapshot. A
// missing or corrupt file loads as `None` and the dashboard starts fresh —
// snapshots are derived data, losing one is never fatal.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Timestamp format used inside persisted snapshots.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

// -----------------------------------------------------------------------------
// Funding-rate ranking snapshot
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateEntry {
    pub symbol: String,
    /// Raw funding-rate fraction, not a percentage.
    pub rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEntry {
    pub symbol: String,
    /// Delta between two cycles, as a fraction.
    pub change: f64,
}

/// One funding ranking cycle, including the full rate map the next cycle
/// diffs against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundingSnapshot {
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub highest_rates: Vec<RateEntry>,
    #[serde(default)]
    pub lowest_rates: Vec<RateEntry>,
    #[serde(default)]
    pub biggest_increases: Vec<ChangeEntry>,
    #[serde(default)]
    pub biggest_decreases: Vec<ChangeEntry>,
    #[serde(default)]
    pub previous_rates: HashMap<String, f64>,
}

// -----------------------------------------------------------------------------
// Money-flow snapshot
// -----------------------------------------------------------------------------

/// Net taker flow of one symbol over its last completed 4h candle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowRecord {
    pub symbol: String,
    pub open_time: i64,
    pub close_time: i64,
    pub close: f64,
    pub quote_volume: f64,
    pub taker_buy_quote_volume: f64,
    pub net_inflow: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowSnapshot {
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub spot_inflow_top: Vec<FlowRecord>,
    #[serde(default)]
    pub spot_outflow_top: Vec<FlowRecord>,
    #[serde(default)]
    pub futures_inflow_top: Vec<FlowRecord>,
    #[serde(default)]
    pub futures_outflow_top: Vec<FlowRecord>,
    #[serde(default)]
    pub commentary: Option<String>,
}

// -----------------------------------------------------------------------------
// Open-interest snapshot
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OiRecord {
    pub symbol: String,
    pub current_oi: f64,
    pub historical_oi: f64,
    pub change: f64,
    pub change_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OiSnapshot {
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub total_symbols: usize,
    #[serde(default)]
    pub increased: usize,
    #[serde(default)]
    pub decreased: usize,
    #[serde(default)]
    pub top_increases: Vec<OiRecord>,
    #[serde(default)]
    pub top_decreases: Vec<OiRecord>,
}

// -----------------------------------------------------------------------------
// Store
// -----------------------------------------------------------------------------

/// File-backed store for one snapshot type at one path.
pub struct SnapshotStore<T> {
    path: PathBuf,
    _snapshot: PhantomData<fn() -> T>,
}

impl<T> SnapshotStore<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _snapshot: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the last persisted snapshot. Absent, unreadable and corrupt
    /// files all load as `None`; corruption is logged, never propagated.
    pub fn load(&self) -> Option<T> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no snapshot file yet");
                return None;
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to read snapshot, treating as absent");
                return None;
            }
        };

        match serde_json::from_str(&content) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "snapshot file is corrupt, treating as absent");
                None
            }
        }
    }

    /// Persist atomically: write a sibling tmp file, then rename over the
    /// target. Readers see either the old snapshot or the new one.
    pub fn save(&self, snapshot: &T) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create snapshot directory {}", parent.display())
                })?;
            }
        }

        let content =
            serde_json::to_string_pretty(snapshot).context("failed to serialise snapshot")?;
        let tmp_path = self.path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, &self.path).with_context(|| {
            format!(
                "failed to move {} into place at {}",
                tmp_path.display(),
                self.path.display()
            )
        })?;

        debug!(path = %self.path.display(), bytes = content.len(), "snapshot saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_funding_snapshot() -> FundingSnapshot {
        FundingSnapshot {
            timestamp: "2024-05-01 12:00:00".to_string(),
            highest_rates: vec![RateEntry {
                symbol: "AUSDT".to_string(),
                rate: 0.02,
            }],
            lowest_rates: vec![RateEntry {
                symbol: "BUSDT".to_string(),
                rate: -0.01,
            }],
            biggest_increases: vec![ChangeEntry {
                symbol: "AUSDT".to_string(),
                change: 0.01,
            }],
            biggest_decreases: Vec::new(),
            previous_rates: HashMap::from([
                ("AUSDT".to_string(), 0.02),
                ("BUSDT".to_string(), -0.01),
            ]),
        }
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("funding_rates_stats.json");
        let store: SnapshotStore<FundingSnapshot> = SnapshotStore::new(&path);

        let snapshot = sample_funding_snapshot();
        store.save(&snapshot).unwrap();

        let loaded = store.load().expect("saved snapshot should load");
        assert_eq!(loaded, snapshot);
        // The tmp file must not survive a successful save.
        assert!(!dir.path().join("funding_rates_stats.json.tmp").exists());
    }

    #[test]
    fn missing_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store: SnapshotStore<FundingSnapshot> =
            SnapshotStore::new(dir.path().join("never_written.json"));
        assert!(store.load().is_none());
    }

    #[test]
    fn corrupt_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("funding_rates_stats.json");
        std::fs::write(&path, "{ this is not json").unwrap();

        let store: SnapshotStore<FundingSnapshot> = SnapshotStore::new(&path);
        assert!(store.load().is_none());
    }

    #[test]
    fn save_creates_missing_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("nested").join("oi.json");
        let store: SnapshotStore<OiSnapshot> = SnapshotStore::new(&path);

        let snapshot = OiSnapshot {
            timestamp: "2024-05-01 12:00:00".to_string(),
            total_symbols: 2,
            increased: 1,
            decreased: 1,
            top_increases: vec![OiRecord {
                symbol: "AUSDT".to_string(),
                current_oi: 1200.0,
                historical_oi: 1000.0,
                change: 200.0,
                change_pct: 20.0,
            }],
            top_decreases: Vec::new(),
        };
        store.save(&snapshot).unwrap();
        assert_eq!(store.load().unwrap(), snapshot);
    }

    #[test]
    fn save_overwrites_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store: SnapshotStore<FundingSnapshot> =
            SnapshotStore::new(dir.path().join("funding.json"));

        let mut snapshot = sample_funding_snapshot();
        store.save(&snapshot).unwrap();

        snapshot.timestamp = "2024-05-01 12:05:00".to_string();
        store.save(&snapshot).unwrap();
        assert_eq!(store.load().unwrap().timestamp, "2024-05-01 12:05:00");
    }

    #[test]
    fn partial_json_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("funding.json");
        std::fs::write(&path, r#"{ "timestamp": "2024-05-01 12:00:00" }"#).unwrap();

        let store: SnapshotStore<FundingSnapshot> = SnapshotStore::new(&path);
        let loaded = store.load().expect("partial snapshot should still load");
        assert_eq!(loaded.timestamp, "2024-05-01 12:00:00");
        assert!(loaded.highest_rates.is_empty());
        assert!(loaded.previous_rates.is_empty());
    }
}
