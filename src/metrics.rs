// =============================================================================
// Derived Metrics
// =============================================================================
//
// Pure numeric building blocks shared by every dashboard:
//
//   1. Spot/futures premium as a percentage of the spot price.
//   2. Net taker inflow of a candle from its taker-buy quote volume.
//   3. Funding-rate display scaling (fraction -> percent).
//   4. Top-N ranking of a symbol -> value map in either direction.
//   5. Biggest deltas between two cycles of such a map.
//   6. Open-interest change against a historical baseline.
//
// Nothing here performs I/O and nothing holds state; the monitors feed these
// from fetched data and publish the results.

use std::collections::HashMap;

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum MetricError {
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
}

/// Sort direction for `rank_top_n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankOrder {
    Descending,
    Ascending,
}

/// Which side of the delta `biggest_changes` should report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeDirection {
    Increasing,
    Decreasing,
}

/// One ranked symbol with the value (or delta) it was ranked by.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankingEntry {
    pub symbol: String,
    pub value: f64,
}

/// Futures premium over spot, as a percentage of the spot price:
/// `(futures - spot) / spot * 100`.
///
/// # Edge cases
/// - `spot == 0.0` has no defined premium and returns `MetricError`.
/// - Negative output simply means the future trades at a discount.
pub fn premium(spot: f64, futures: f64) -> Result<f64, MetricError> {
    if spot == 0.0 {
        return Err(MetricError::InvalidInput(
            "premium is undefined for a zero spot price",
        ));
    }
    Ok((futures - spot) / spot * 100.0)
}

/// Net taker inflow of one candle in quote units.
///
/// Taker buys minus taker sells, where taker sells are the remainder of the
/// quote volume: `2 * taker_buy_quote - quote_volume`. Positive means
/// aggressive buying dominated the candle.
pub fn net_inflow(taker_buy_quote: f64, quote_volume: f64) -> f64 {
    2.0 * taker_buy_quote - quote_volume
}

/// Scale a raw funding-rate fraction to a display percentage.
///
/// This is the only place the x100 scaling lives; rates are stored and
/// compared as fractions everywhere else.
pub fn funding_rate_pct(rate: f64) -> f64 {
    rate * 100.0
}

/// Top `n` entries of a symbol -> value map, sorted by value in the given
/// order. Ties are broken by symbol name so repeated runs over the same data
/// rank identically.
///
/// # Edge cases
/// - `n == 0` or an empty map returns an empty vector.
/// - `n` larger than the map returns every entry, still sorted.
pub fn rank_top_n(values: &HashMap<String, f64>, n: usize, order: RankOrder) -> Vec<RankingEntry> {
    let mut entries: Vec<RankingEntry> = values
        .iter()
        .map(|(symbol, &value)| RankingEntry {
            symbol: symbol.clone(),
            value,
        })
        .collect();

    entries.sort_by(|a, b| {
        let by_value = match order {
            RankOrder::Descending => b.value.total_cmp(&a.value),
            RankOrder::Ascending => a.value.total_cmp(&b.value),
        };
        by_value.then_with(|| a.symbol.cmp(&b.symbol))
    });
    entries.truncate(n);
    entries
}

/// Top `n` movers between two cycles of a symbol -> value map.
///
/// Only symbols present in both maps have a defined delta. `Increasing`
/// reports strictly positive deltas sorted largest first; `Decreasing`
/// reports strictly negative deltas sorted most-negative first. A symbol
/// whose value did not move appears in neither direction.
pub fn biggest_changes(
    current: &HashMap<String, f64>,
    previous: &HashMap<String, f64>,
    n: usize,
    direction: ChangeDirection,
) -> Vec<RankingEntry> {
    let mut deltas: Vec<RankingEntry> = current
        .iter()
        .filter_map(|(symbol, &value)| {
            let prior = previous.get(symbol)?;
            let change = value - prior;
            let keep = match direction {
                ChangeDirection::Increasing => change > 0.0,
                ChangeDirection::Decreasing => change < 0.0,
            };
            keep.then(|| RankingEntry {
                symbol: symbol.clone(),
                value: change,
            })
        })
        .collect();

    deltas.sort_by(|a, b| {
        let by_value = match direction {
            ChangeDirection::Increasing => b.value.total_cmp(&a.value),
            ChangeDirection::Decreasing => a.value.total_cmp(&b.value),
        };
        by_value.then_with(|| a.symbol.cmp(&b.symbol))
    });
    deltas.truncate(n);
    deltas
}

/// Absolute and percentage change of open interest against a baseline.
///
/// # Edge cases
/// - `historical == 0.0` (young listing, no history yet) reports the raw
///   change with a percentage of zero rather than dividing by zero.
pub fn oi_change(current: f64, historical: f64) -> (f64, f64) {
    let change = current - historical;
    let change_pct = if historical == 0.0 {
        0.0
    } else {
        change / historical * 100.0
    };
    (change, change_pct)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rates(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
        pairs
            .iter()
            .map(|(symbol, value)| (symbol.to_string(), *value))
            .collect()
    }

    // ---- premium ----

    #[test]
    fn premium_positive_when_futures_above_spot() {
        let p = premium(100.0, 101.0).unwrap();
        assert!((p - 1.0).abs() < 1e-12, "expected 1.0, got {p}");
    }

    #[test]
    fn premium_negative_when_futures_below_spot() {
        let p = premium(200.0, 199.0).unwrap();
        assert!((p + 0.5).abs() < 1e-12, "expected -0.5, got {p}");
    }

    #[test]
    fn premium_zero_spot_is_an_error() {
        assert!(premium(0.0, 101.0).is_err());
    }

    // ---- net_inflow ----

    #[test]
    fn net_inflow_balances_takers() {
        // 600 taker-buy out of 1000 total: 600 bought, 400 sold, net +200.
        let flow = net_inflow(600.0, 1000.0);
        assert!((flow - 200.0).abs() < 1e-9, "expected 200.0, got {flow}");
    }

    #[test]
    fn net_inflow_negative_when_sellers_dominate() {
        let flow = net_inflow(300.0, 1000.0);
        assert!((flow + 400.0).abs() < 1e-9, "expected -400.0, got {flow}");
    }

    #[test]
    fn net_inflow_zero_on_even_split() {
        assert_eq!(net_inflow(500.0, 1000.0), 0.0);
    }

    // ---- funding_rate_pct ----

    #[test]
    fn funding_rate_scales_fraction_to_percent() {
        let pct = funding_rate_pct(0.0001);
        assert!((pct - 0.01).abs() < 1e-12, "expected 0.01, got {pct}");
        assert_eq!(funding_rate_pct(-0.02), -2.0);
    }

    // ---- rank_top_n ----

    #[test]
    fn rank_descending_takes_largest_first() {
        let values = rates(&[("AUSDT", 0.01), ("BUSDT", 0.03), ("CUSDT", 0.02)]);
        let top = rank_top_n(&values, 2, RankOrder::Descending);
        let symbols: Vec<&str> = top.iter().map(|e| e.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["BUSDT", "CUSDT"]);
    }

    #[test]
    fn rank_ascending_takes_smallest_first() {
        let values = rates(&[("AUSDT", 0.01), ("BUSDT", -0.03), ("CUSDT", 0.02)]);
        let top = rank_top_n(&values, 2, RankOrder::Ascending);
        let symbols: Vec<&str> = top.iter().map(|e| e.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["BUSDT", "AUSDT"]);
    }

    #[test]
    fn rank_ties_break_by_symbol_name() {
        let values = rates(&[("ZZZUSDT", 0.01), ("AAAUSDT", 0.01), ("MMMUSDT", 0.01)]);
        let top = rank_top_n(&values, 3, RankOrder::Descending);
        let symbols: Vec<&str> = top.iter().map(|e| e.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["AAAUSDT", "MMMUSDT", "ZZZUSDT"]);
    }

    #[test]
    fn rank_n_larger_than_map_returns_all() {
        let values = rates(&[("AUSDT", 1.0), ("BUSDT", 2.0)]);
        assert_eq!(rank_top_n(&values, 10, RankOrder::Descending).len(), 2);
    }

    #[test]
    fn rank_zero_n_and_empty_map_return_empty() {
        let values = rates(&[("AUSDT", 1.0)]);
        assert!(rank_top_n(&values, 0, RankOrder::Descending).is_empty());
        assert!(rank_top_n(&HashMap::new(), 5, RankOrder::Ascending).is_empty());
    }

    // ---- biggest_changes ----

    #[test]
    fn changes_ignore_symbols_missing_from_either_cycle() {
        let current = rates(&[("AUSDT", 0.02), ("NEWUSDT", 0.05)]);
        let previous = rates(&[("AUSDT", 0.01), ("GONEUSDT", 0.04)]);
        let up = biggest_changes(&current, &previous, 5, ChangeDirection::Increasing);
        assert_eq!(up.len(), 1);
        assert_eq!(up[0].symbol, "AUSDT");
        assert!((up[0].value - 0.01).abs() < 1e-12);
    }

    #[test]
    fn unchanged_symbols_appear_in_neither_direction() {
        let current = rates(&[("AUSDT", 0.02), ("BUSDT", -0.01), ("CUSDT", 0.01)]);
        let previous = rates(&[("AUSDT", 0.01), ("BUSDT", -0.01), ("CUSDT", 0.005)]);

        let up = biggest_changes(&current, &previous, 5, ChangeDirection::Increasing);
        let down = biggest_changes(&current, &previous, 5, ChangeDirection::Decreasing);

        let up_symbols: Vec<&str> = up.iter().map(|e| e.symbol.as_str()).collect();
        assert_eq!(up_symbols, vec!["AUSDT", "CUSDT"]);
        assert!(down.is_empty());
        assert!(!up_symbols.contains(&"BUSDT"));
    }

    #[test]
    fn decreases_sorted_most_negative_first() {
        let current = rates(&[("AUSDT", 0.00), ("BUSDT", 0.01), ("CUSDT", 0.02)]);
        let previous = rates(&[("AUSDT", 0.03), ("BUSDT", 0.02), ("CUSDT", 0.02)]);
        let down = biggest_changes(&current, &previous, 5, ChangeDirection::Decreasing);
        let symbols: Vec<&str> = down.iter().map(|e| e.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["AUSDT", "BUSDT"]);
        assert!((down[0].value + 0.03).abs() < 1e-12);
    }

    #[test]
    fn changes_truncate_to_n() {
        let current = rates(&[("AUSDT", 1.0), ("BUSDT", 2.0), ("CUSDT", 3.0)]);
        let previous = rates(&[("AUSDT", 0.0), ("BUSDT", 0.0), ("CUSDT", 0.0)]);
        let up = biggest_changes(&current, &previous, 2, ChangeDirection::Increasing);
        let symbols: Vec<&str> = up.iter().map(|e| e.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["CUSDT", "BUSDT"]);
    }

    #[test]
    fn empty_previous_yields_no_changes() {
        let current = rates(&[("AUSDT", 1.0)]);
        assert!(biggest_changes(&current, &HashMap::new(), 5, ChangeDirection::Increasing).is_empty());
    }

    // ---- oi_change ----

    #[test]
    fn oi_change_reports_absolute_and_percent() {
        let (change, pct) = oi_change(1200.0, 1000.0);
        assert!((change - 200.0).abs() < 1e-9);
        assert!((pct - 20.0).abs() < 1e-9, "expected 20.0, got {pct}");
    }

    #[test]
    fn oi_change_zero_baseline_reports_zero_percent() {
        let (change, pct) = oi_change(500.0, 0.0);
        assert_eq!(change, 500.0);
        assert_eq!(pct, 0.0);
    }

    #[test]
    fn oi_change_negative_when_interest_unwinds() {
        let (change, pct) = oi_change(800.0, 1000.0);
        assert!((change + 200.0).abs() < 1e-9);
        assert!((pct + 20.0).abs() < 1e-9);
    }
}
