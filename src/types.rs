// =============================================================================
// Shared types used across the ratewatch dashboards
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which Binance market an endpoint or record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Market {
    Spot,
    Futures,
}

impl std::fmt::Display for Market {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Spot => write!(f, "spot"),
            Self::Futures => write!(f, "futures"),
        }
    }
}

/// Spot and futures price for one symbol, captured in a single poll cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceSample {
    pub symbol: String,
    pub spot_price: f64,
    pub futures_price: f64,
    pub at: DateTime<Utc>,
}

/// Funding rate for one symbol as the raw signed fraction
/// (e.g. 0.0001 = 0.01% per funding interval).
///
/// The fraction is what gets stored and compared everywhere; scaling to a
/// display percentage happens in `metrics::funding_rate_pct` and nowhere else.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundingSample {
    pub symbol: String,
    pub funding_rate: f64,
    pub at: DateTime<Utc>,
}

/// Open interest for one symbol, in contracts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenInterestSample {
    pub symbol: String,
    pub open_interest: f64,
    pub at: DateTime<Utc>,
}
