// =============================================================================
// Central Dashboard State
// =============================================================================
//
// The single source of truth for the whole process. Monitors write their
// published sections through the setters here; REST handlers and the
// WebSocket feed read them back out. Everything is shared via one
// `Arc<DashboardState>` — there are no globals.
//
// Thread safety:
//   - Atomic counters for lock-free version tracking.
//   - parking_lot::RwLock for all mutable shared collections.
// =============================================================================

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;

use crate::runtime_config::RuntimeConfig;
use crate::snapshot::{FlowSnapshot, FundingSnapshot, OiSnapshot};
use crate::timeseries::SeriesBuffer;

/// Maximum number of recent errors to retain.
const MAX_RECENT_ERRORS: usize = 50;

/// A recorded error event for the dashboard error feed.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    /// Human-readable error message.
    pub message: String,
    /// ISO 8601 timestamp.
    pub at: String,
}

/// Latest published metrics for one watched pair.
#[derive(Debug, Clone, Serialize)]
pub struct PairMetrics {
    pub symbol: String,
    pub spot_price: f64,
    pub futures_price: f64,
    pub premium_pct: f64,
    /// Raw funding fraction.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub funding_rate: Option<f64>,
    /// The same rate scaled for display.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub funding_rate_pct: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_interest: Option<f64>,
    pub updated_at: String,
}

/// Latest generated market commentary.
#[derive(Debug, Clone, Serialize)]
pub struct NarrativeReport {
    pub symbol: String,
    pub commentary: String,
    pub generated_at: String,
}

/// Central state shared across all async tasks via `Arc<DashboardState>`.
pub struct DashboardState {
    // ── Version tracking ────────────────────────────────────────────────
    /// Monotonically increasing version counter, incremented on every
    /// published mutation. The WebSocket feed uses this to detect changes
    /// worth pushing.
    pub state_version: AtomicU64,

    /// WebSocket message sequence number (incremented per message sent).
    pub ws_sequence_number: AtomicU64,

    // ── Configuration ───────────────────────────────────────────────────
    pub runtime_config: Arc<RwLock<RuntimeConfig>>,

    // ── Pair dashboard ──────────────────────────────────────────────────
    pub series: Arc<SeriesBuffer>,
    pub pair_metrics: RwLock<HashMap<String, PairMetrics>>,

    // ── Ranking dashboards ──────────────────────────────────────────────
    pub funding_ranks: RwLock<Option<FundingSnapshot>>,
    pub money_flow: RwLock<Option<FlowSnapshot>>,
    pub open_interest: RwLock<Option<OiSnapshot>>,

    // ── Narrative ───────────────────────────────────────────────────────
    pub narrative: RwLock<Option<NarrativeReport>>,

    // ── Error feed ──────────────────────────────────────────────────────
    pub recent_errors: RwLock<Vec<ErrorRecord>>,

    // ── Timing ──────────────────────────────────────────────────────────
    /// Instant when the process started. Used for uptime reporting.
    pub start_time: std::time::Instant,
}

impl DashboardState {
    pub fn new(config: RuntimeConfig) -> Self {
        let window = config.history_window();
        Self {
            state_version: AtomicU64::new(1),
            ws_sequence_number: AtomicU64::new(0),
            runtime_config: Arc::new(RwLock::new(config)),
            series: Arc::new(SeriesBuffer::new(window)),
            pair_metrics: RwLock::new(HashMap::new()),
            funding_ranks: RwLock::new(None),
            money_flow: RwLock::new(None),
            open_interest: RwLock::new(None),
            narrative: RwLock::new(None),
            recent_errors: RwLock::new(Vec::new()),
            start_time: std::time::Instant::now(),
        }
    }

    // ── Version management ──────────────────────────────────────────────

    /// Atomically increment the state version. Returns the previous value.
    pub fn increment_version(&self) -> u64 {
        self.state_version.fetch_add(1, Ordering::SeqCst)
    }

    /// Read the current state version without modifying it.
    pub fn current_state_version(&self) -> u64 {
        self.state_version.load(Ordering::SeqCst)
    }

    // ── Section setters (each bumps the version) ────────────────────────

    pub fn update_pair_metrics(&self, metrics: PairMetrics) {
        self.pair_metrics
            .write()
            .insert(metrics.symbol.clone(), metrics);
        self.increment_version();
    }

    pub fn set_funding_ranks(&self, snapshot: FundingSnapshot) {
        *self.funding_ranks.write() = Some(snapshot);
        self.increment_version();
    }

    pub fn set_money_flow(&self, snapshot: FlowSnapshot) {
        *self.money_flow.write() = Some(snapshot);
        self.increment_version();
    }

    pub fn set_open_interest(&self, snapshot: OiSnapshot) {
        *self.open_interest.write() = Some(snapshot);
        self.increment_version();
    }

    pub fn set_narrative(&self, report: NarrativeReport) {
        *self.narrative.write() = Some(report);
        self.increment_version();
    }

    // ── Error feed ──────────────────────────────────────────────────────

    /// Record an error message. The feed is capped at [`MAX_RECENT_ERRORS`];
    /// oldest entries are evicted when the limit is reached.
    pub fn push_error(&self, msg: String) {
        let mut errors = self.recent_errors.write();
        errors.push(ErrorRecord {
            message: msg,
            at: Utc::now().to_rfc3339(),
        });
        while errors.len() > MAX_RECENT_ERRORS {
            errors.remove(0);
        }
        drop(errors);
        self.increment_version();
    }

    // ── Snapshot assembly ───────────────────────────────────────────────

    /// Assemble the full dashboard payload served over REST and pushed over
    /// the WebSocket feed.
    pub fn build_snapshot(&self) -> StateSnapshot {
        let config = self.runtime_config.read();
        let config_summary = ConfigSummary {
            watch_symbols: config.watch_symbols.clone(),
            quote_asset: config.quote_asset.clone(),
            top_n: config.top_n,
            flow_top_n: config.flow_top_n,
            oi_top_n: config.oi_top_n,
            pair_poll_secs: config.pair_poll_secs,
            ranking_poll_secs: config.ranking_poll_secs,
            flow_poll_secs: config.flow_poll_secs,
            oi_poll_secs: config.oi_poll_secs,
            narrative_poll_secs: config.narrative_poll_secs,
            history_window_hours: config.history_window_hours,
        };
        drop(config);

        StateSnapshot {
            state_version: self.current_state_version(),
            server_time: Utc::now().timestamp_millis(),
            uptime_secs: self.start_time.elapsed().as_secs(),
            config: config_summary,
            pairs: self.pair_metrics.read().clone(),
            funding_ranks: self.funding_ranks.read().clone(),
            money_flow: self.money_flow.read().clone(),
            open_interest: self.open_interest.read().clone(),
            narrative: self.narrative.read().clone(),
            recent_errors: self.recent_errors.read().clone(),
        }
    }
}

/// Config fields echoed back to dashboard clients.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigSummary {
    pub watch_symbols: Vec<String>,
    pub quote_asset: String,
    pub top_n: usize,
    pub flow_top_n: usize,
    pub oi_top_n: usize,
    pub pair_poll_secs: u64,
    pub ranking_poll_secs: u64,
    pub flow_poll_secs: u64,
    pub oi_poll_secs: u64,
    pub narrative_poll_secs: u64,
    pub history_window_hours: i64,
}

/// Everything a dashboard client needs in one payload. Sections no monitor
/// has published yet are omitted rather than sent as null.
#[derive(Debug, Clone, Serialize)]
pub struct StateSnapshot {
    pub state_version: u64,
    pub server_time: i64,
    pub uptime_secs: u64,
    pub config: ConfigSummary,
    pub pairs: HashMap<String, PairMetrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub funding_ranks: Option<FundingSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub money_flow: Option<FlowSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_interest: Option<OiSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub narrative: Option<NarrativeReport>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub recent_errors: Vec<ErrorRecord>,
}
