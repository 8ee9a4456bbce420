// =============================================================================
// Local Commentary
// =============================================================================
//
// Deterministic fallback used whenever no remote completion service is
// configured or a remote call fails. Same inputs, same words: the templates
// bucket each metric into a regime and stitch the lines together. Thresholds
// follow the usual funding heuristics, where |rate| above one percent per
// interval reads as a crowded market.

use crate::narrative::MarketDigest;
use crate::snapshot::{FlowRecord, FlowSnapshot};

/// Funding fraction above which positioning counts as crowded.
const STRONG_FUNDING: f64 = 0.01;
/// Premium percentage above which basis counts as stretched.
const STRONG_PREMIUM_PCT: f64 = 0.01;
/// Contracts above which participation counts as heavy.
const HEAVY_OI: f64 = 1_000_000.0;

/// Deterministic briefing for one pair digest.
pub fn market_commentary(digest: &MarketDigest) -> String {
    let funding_line = match digest.funding_rate {
        Some(rate) if rate > STRONG_FUNDING => {
            "Funding is strongly positive: longs are paying a steep premium to stay in, \
             a crowded configuration that tends to unwind sharply."
        }
        Some(rate) if rate > 0.0 => "Funding is mildly positive: a long bias, nothing extreme.",
        Some(rate) if rate < -STRONG_FUNDING => {
            "Funding is strongly negative: shorts are paying up and squeeze risk is elevated."
        }
        Some(rate) if rate < 0.0 => "Funding is mildly negative: a slight short lean.",
        Some(_) => "Funding is flat: neither side pays to hold.",
        None => "Funding data is unavailable this cycle.",
    };

    let premium_line = if digest.premium_pct > STRONG_PREMIUM_PCT {
        "The future trades at a clear premium to spot, so derivatives demand is leading the market."
    } else if digest.premium_pct > 0.0 {
        "The future trades slightly above spot: basis is unremarkable."
    } else if digest.premium_pct < -STRONG_PREMIUM_PCT {
        "The future trades at a clear discount to spot, a cautious or hedged positioning signature."
    } else if digest.premium_pct < 0.0 {
        "The future trades slightly below spot: basis is unremarkable."
    } else {
        "Spot and future are trading level."
    };

    let participation_line = match digest.open_interest {
        Some(oi) if oi > HEAVY_OI => {
            "Open interest is heavy, so moves from here carry real positioning behind them."
        }
        Some(_) => "Open interest is moderate.",
        None => "Open interest is unavailable this cycle.",
    };

    format!(
        "## {} market read\n\n{}\n\n{}\n\n{}\n\n## Levels\n\nSpot {}, future {}, premium {:.4}%.\n",
        digest.symbol,
        funding_line,
        premium_line,
        participation_line,
        format_price(digest.spot_price),
        format_price(digest.futures_price),
        digest.premium_pct,
    )
}

/// Deterministic summary for a flow snapshot, naming the leaders per list.
pub fn flow_commentary(snapshot: &FlowSnapshot) -> String {
    format!(
        "## Money flow read\n\nSpot inflow leaders: {}.\nSpot outflow leaders: {}.\n\
         Futures inflow leaders: {}.\nFutures outflow leaders: {}.\n\n\
         Flows measure net taker aggression over the last completed 4h candle; \
         double-counted taker buys minus total quote turnover.\n",
        leaders(&snapshot.spot_inflow_top),
        leaders(&snapshot.spot_outflow_top),
        leaders(&snapshot.futures_inflow_top),
        leaders(&snapshot.futures_outflow_top),
    )
}

fn leaders(records: &[FlowRecord]) -> String {
    if records.is_empty() {
        return "none".to_string();
    }
    records
        .iter()
        .take(3)
        .map(|r| format!("{} ({})", r.symbol, format_notional(r.net_inflow)))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Price with precision scaled to magnitude, so micro-cap quotes stay legible.
pub fn format_price(price: f64) -> String {
    if price >= 1000.0 {
        format!("{price:.2}")
    } else if price >= 1.0 {
        format!("{price:.4}")
    } else {
        format!("{price:.8}")
    }
}

/// Quote notional in compact units (K / M), sign preserved.
pub fn format_notional(value: f64) -> String {
    if value.abs() >= 1_000_000.0 {
        format!("{:.2}M", value / 1_000_000.0)
    } else if value.abs() >= 1_000.0 {
        format!("{:.2}K", value / 1_000.0)
    } else {
        format!("{value:.2}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_digest() -> MarketDigest {
        MarketDigest {
            symbol: "BTCUSDT".to_string(),
            spot_price: 64000.0,
            futures_price: 64080.0,
            premium_pct: 0.125,
            funding_rate: Some(0.0001),
            open_interest: Some(84_000.0),
        }
    }

    fn sample_flow(symbol: &str, net_inflow: f64) -> FlowRecord {
        FlowRecord {
            symbol: symbol.to_string(),
            open_time: 0,
            close_time: 0,
            close: 1.0,
            quote_volume: 1000.0,
            taker_buy_quote_volume: 500.0 + net_inflow / 2.0,
            net_inflow,
        }
    }

    // ---- market_commentary ----

    #[test]
    fn commentary_is_deterministic() {
        let digest = sample_digest();
        assert_eq!(market_commentary(&digest), market_commentary(&digest));
    }

    #[test]
    fn crowded_longs_are_called_out() {
        let mut digest = sample_digest();
        digest.funding_rate = Some(0.02);
        let text = market_commentary(&digest);
        assert!(text.contains("strongly positive"), "got: {text}");
    }

    #[test]
    fn short_squeeze_risk_is_called_out() {
        let mut digest = sample_digest();
        digest.funding_rate = Some(-0.02);
        let text = market_commentary(&digest);
        assert!(text.contains("strongly negative"), "got: {text}");
    }

    #[test]
    fn missing_metrics_read_as_unavailable() {
        let mut digest = sample_digest();
        digest.funding_rate = None;
        digest.open_interest = None;
        let text = market_commentary(&digest);
        assert!(text.contains("Funding data is unavailable"));
        assert!(text.contains("Open interest is unavailable"));
    }

    #[test]
    fn heavy_open_interest_changes_the_participation_line() {
        let mut digest = sample_digest();
        digest.open_interest = Some(2_000_000.0);
        assert!(market_commentary(&digest).contains("heavy"));
        digest.open_interest = Some(10_000.0);
        assert!(market_commentary(&digest).contains("moderate"));
    }

    #[test]
    fn discount_reads_differently_from_premium() {
        let mut digest = sample_digest();
        digest.premium_pct = -0.2;
        let text = market_commentary(&digest);
        assert!(text.contains("discount"), "got: {text}");
    }

    // ---- flow_commentary ----

    #[test]
    fn flow_commentary_names_the_leaders() {
        let snapshot = FlowSnapshot {
            timestamp: String::new(),
            spot_inflow_top: vec![
                sample_flow("AUSDT", 2_500_000.0),
                sample_flow("BUSDT", 900_000.0),
            ],
            spot_outflow_top: vec![sample_flow("CUSDT", -1_200_000.0)],
            futures_inflow_top: Vec::new(),
            futures_outflow_top: Vec::new(),
            commentary: None,
        };
        let text = flow_commentary(&snapshot);
        assert!(text.contains("AUSDT (2.50M)"), "got: {text}");
        assert!(text.contains("CUSDT (-1.20M)"));
        assert!(text.contains("Futures inflow leaders: none"));
    }

    // ---- formatting helpers ----

    #[test]
    fn price_precision_scales_with_magnitude() {
        assert_eq!(format_price(64250.128), "64250.13");
        assert_eq!(format_price(3.14159), "3.1416");
        assert_eq!(format_price(0.00001234), "0.00001234");
    }

    #[test]
    fn notional_uses_compact_units() {
        assert_eq!(format_notional(2_500_000.0), "2.50M");
        assert_eq!(format_notional(-1_200_000.0), "-1.20M");
        assert_eq!(format_notional(45_300.0), "45.30K");
        assert_eq!(format_notional(12.3), "12.30");
    }
}
