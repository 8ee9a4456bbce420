// =============================================================================
// Narrative Annotation
// =============================================================================
//
// Turns raw dashboard numbers into readable commentary. A remote completion
// service is used when configured via environment; otherwise (and on any
// remote failure) a deterministic local template produces the text. Either
// way the annotator always returns a string — commentary generation never
// fails a cycle.

pub mod local;
pub mod remote;

pub use remote::{ChatClient, NarrativeError};

use std::sync::Arc;

use chrono::Utc;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::app_state::{DashboardState, NarrativeReport};
use crate::shutdown::ShutdownSignal;
use crate::snapshot::{FlowRecord, FlowSnapshot};

/// Compact numeric digest handed to the annotator.
#[derive(Debug, Clone)]
pub struct MarketDigest {
    pub symbol: String,
    pub spot_price: f64,
    pub futures_price: f64,
    pub premium_pct: f64,
    /// Raw funding fraction.
    pub funding_rate: Option<f64>,
    pub open_interest: Option<f64>,
}

pub struct NarrativeAnnotator {
    remote: Option<ChatClient>,
}

impl NarrativeAnnotator {
    /// Build from the environment. `NARRATIVE_API_KEY` enables the remote
    /// path; `NARRATIVE_API_URL` and `NARRATIVE_MODEL` override the service
    /// defaults. Without a key the annotator runs local-only.
    pub fn from_env() -> Self {
        match std::env::var("NARRATIVE_API_KEY") {
            Ok(key) if !key.trim().is_empty() => {
                let base_url = std::env::var("NARRATIVE_API_URL")
                    .unwrap_or_else(|_| remote::DEFAULT_BASE_URL.to_string());
                let model = std::env::var("NARRATIVE_MODEL")
                    .unwrap_or_else(|_| remote::DEFAULT_MODEL.to_string());
                info!(model = %model, "narrative annotator using remote completions");
                Self {
                    remote: Some(ChatClient::new(base_url, key, model)),
                }
            }
            _ => {
                info!("NARRATIVE_API_KEY not set, narrative annotator running local-only");
                Self { remote: None }
            }
        }
    }

    pub fn local_only() -> Self {
        Self { remote: None }
    }

    /// Commentary for one pair digest. Falls back to the local template on
    /// any remote failure.
    pub async fn annotate_market(&self, digest: &MarketDigest) -> String {
        if let Some(client) = &self.remote {
            match client.complete(&market_prompt(digest)).await {
                Ok(text) => return text,
                Err(e) => {
                    warn!(symbol = %digest.symbol, error = %e, "remote narrative failed, using local commentary");
                }
            }
        }
        local::market_commentary(digest)
    }

    /// Commentary for a flow snapshot, same fallback contract.
    pub async fn annotate_flows(&self, snapshot: &FlowSnapshot) -> String {
        if let Some(client) = &self.remote {
            match client.complete(&flows_prompt(snapshot)).await {
                Ok(text) => return text,
                Err(e) => {
                    warn!(error = %e, "remote flow narrative failed, using local commentary");
                }
            }
        }
        local::flow_commentary(snapshot)
    }
}

// -----------------------------------------------------------------------------
// Prompts
// -----------------------------------------------------------------------------

fn market_prompt(digest: &MarketDigest) -> String {
    let funding = digest
        .funding_rate
        .map(|rate| format!("{rate:.6} (fraction per interval)"))
        .unwrap_or_else(|| "unavailable".to_string());
    let open_interest = digest
        .open_interest
        .map(|oi| format!("{oi:.0} contracts"))
        .unwrap_or_else(|| "unavailable".to_string());

    format!(
        "You are a derivatives market analyst. Using only the data below, write a short \
         markdown briefing for {}: price structure, positioning, and the main risk. \
         Under 200 words, no price predictions.\n\n\
         spot price: {}\nfutures price: {}\npremium vs spot: {:.4}%\n\
         current funding rate: {}\nopen interest: {}\n",
        digest.symbol,
        digest.spot_price,
        digest.futures_price,
        digest.premium_pct,
        funding,
        open_interest,
    )
}

fn flows_prompt(snapshot: &FlowSnapshot) -> String {
    fn compact(records: &[FlowRecord]) -> String {
        records
            .iter()
            .map(|r| format!("{}: {:.0}", r.symbol, r.net_inflow))
            .collect::<Vec<_>>()
            .join(", ")
    }

    format!(
        "You are a crypto market analyst. The lists below are net taker flows in quote \
         units over the last completed 4h candle (positive = aggressive buying). Write a \
         short markdown read of where money rotated. Under 150 words.\n\n\
         spot inflows: {}\nspot outflows: {}\nfutures inflows: {}\nfutures outflows: {}\n",
        compact(&snapshot.spot_inflow_top),
        compact(&snapshot.spot_outflow_top),
        compact(&snapshot.futures_inflow_top),
        compact(&snapshot.futures_outflow_top),
    )
}

// -----------------------------------------------------------------------------
// Periodic narrative loop
// -----------------------------------------------------------------------------

/// Regenerate pair commentary on a slow cadence. Before the pair dashboard
/// has produced any metrics the cycle just skips.
pub async fn run_narrative_loop(
    state: Arc<DashboardState>,
    annotator: Arc<NarrativeAnnotator>,
    mut shutdown: ShutdownSignal,
) {
    let poll_secs = state.runtime_config.read().narrative_poll_secs;
    let mut ticker = interval(Duration::from_secs(poll_secs.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(interval_secs = poll_secs, "narrative loop started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match next_digest(&state) {
                    Some(digest) => {
                        let commentary = annotator.annotate_market(&digest).await;
                        state.set_narrative(NarrativeReport {
                            symbol: digest.symbol.clone(),
                            commentary,
                            generated_at: Utc::now().to_rfc3339(),
                        });
                        info!(symbol = %digest.symbol, "narrative updated");
                    }
                    None => debug!("no pair metrics yet, skipping narrative cycle"),
                }
            }
            _ = shutdown.cancelled() => {
                info!("narrative loop stopped");
                break;
            }
        }
    }
}

/// Digest for the first watched symbol that has published metrics.
fn next_digest(state: &DashboardState) -> Option<MarketDigest> {
    let watch_symbols = state.runtime_config.read().watch_symbols.clone();
    let metrics = state.pair_metrics.read();
    watch_symbols.iter().find_map(|symbol| {
        metrics.get(symbol).map(|m| MarketDigest {
            symbol: m.symbol.clone(),
            spot_price: m.spot_price,
            futures_price: m.futures_price,
            premium_pct: m.premium_pct,
            funding_rate: m.funding_rate,
            open_interest: m.open_interest,
        })
    })
}
