// =============================================================================
// Rolling Market Series
// =============================================================================
//
// In-memory store of observed pair metrics, one ring per symbol, bounded by
// age rather than count. Eviction happens on every push relative to the
// newest point, so a stalled feed keeps its history instead of draining it.
// Shared behind `Arc`; reads clone the points out so no lock is held while
// serialising a response.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::Serialize;

/// One observed point of a watched pair.
#[derive(Debug, Clone, Serialize)]
pub struct MarketPoint {
    pub at: DateTime<Utc>,
    pub spot_price: f64,
    pub futures_price: f64,
    pub premium_pct: f64,
    /// Raw funding fraction; absent when the fetch degraded with no prior value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub funding_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_interest: Option<f64>,
}

pub struct SeriesBuffer {
    series: RwLock<HashMap<String, VecDeque<MarketPoint>>>,
    window: Duration,
}

impl SeriesBuffer {
    pub fn new(window: Duration) -> Self {
        Self {
            series: RwLock::new(HashMap::new()),
            window,
        }
    }

    /// Append one point and drop everything older than the window, measured
    /// from the point just appended.
    pub fn push(&self, symbol: &str, point: MarketPoint) {
        let cutoff = point.at - self.window;
        let mut map = self.series.write();
        let ring = map.entry(symbol.to_string()).or_default();
        ring.push_back(point);
        while ring.front().map_or(false, |p| p.at < cutoff) {
            ring.pop_front();
        }
    }

    /// Bulk append (history backfill). Points are expected in ascending time
    /// order; eviction runs once against the newest point.
    pub fn extend(&self, symbol: &str, points: Vec<MarketPoint>) {
        if points.is_empty() {
            return;
        }
        let mut map = self.series.write();
        let ring = map.entry(symbol.to_string()).or_default();
        ring.extend(points);
        if let Some(newest) = ring.back().map(|p| p.at) {
            let cutoff = newest - self.window;
            while ring.front().map_or(false, |p| p.at < cutoff) {
                ring.pop_front();
            }
        }
    }

    /// Full retained series for one symbol, oldest first. Unknown symbols
    /// yield an empty vector.
    pub fn series(&self, symbol: &str) -> Vec<MarketPoint> {
        self.series
            .read()
            .get(symbol)
            .map(|ring| ring.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn latest(&self, symbol: &str) -> Option<MarketPoint> {
        self.series.read().get(symbol).and_then(|ring| ring.back().cloned())
    }

    pub fn len(&self, symbol: &str) -> usize {
        self.series.read().get(symbol).map_or(0, VecDeque::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_point(at: DateTime<Utc>, spot: f64) -> MarketPoint {
        MarketPoint {
            at,
            spot_price: spot,
            futures_price: spot * 1.001,
            premium_pct: 0.1,
            funding_rate: Some(0.0001),
            open_interest: None,
        }
    }

    fn base_time() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-05-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn push_and_latest() {
        let buffer = SeriesBuffer::new(Duration::hours(4));
        let t0 = base_time();

        buffer.push("BTCUSDT", sample_point(t0, 100.0));
        buffer.push("BTCUSDT", sample_point(t0 + Duration::minutes(1), 101.0));

        assert_eq!(buffer.len("BTCUSDT"), 2);
        let latest = buffer.latest("BTCUSDT").unwrap();
        assert_eq!(latest.spot_price, 101.0);
    }

    #[test]
    fn points_older_than_window_are_evicted() {
        let buffer = SeriesBuffer::new(Duration::hours(4));
        let t0 = base_time();

        buffer.push("BTCUSDT", sample_point(t0, 100.0));
        buffer.push("BTCUSDT", sample_point(t0 + Duration::hours(3), 101.0));
        buffer.push("BTCUSDT", sample_point(t0 + Duration::hours(4) + Duration::minutes(1), 102.0));

        let series = buffer.series("BTCUSDT");
        assert_eq!(series.len(), 2, "the t0 point should have aged out");
        assert_eq!(series[0].spot_price, 101.0);
        assert_eq!(series[1].spot_price, 102.0);
    }

    #[test]
    fn point_exactly_at_window_edge_is_retained() {
        let buffer = SeriesBuffer::new(Duration::hours(4));
        let t0 = base_time();

        buffer.push("BTCUSDT", sample_point(t0, 100.0));
        buffer.push("BTCUSDT", sample_point(t0 + Duration::hours(4), 101.0));

        assert_eq!(buffer.len("BTCUSDT"), 2);
    }

    #[test]
    fn symbols_are_isolated() {
        let buffer = SeriesBuffer::new(Duration::hours(4));
        let t0 = base_time();

        buffer.push("BTCUSDT", sample_point(t0, 100.0));
        buffer.push("ETHUSDT", sample_point(t0, 50.0));

        assert_eq!(buffer.len("BTCUSDT"), 1);
        assert_eq!(buffer.len("ETHUSDT"), 1);
        assert_eq!(buffer.latest("ETHUSDT").unwrap().spot_price, 50.0);
    }

    #[test]
    fn unknown_symbol_reads_as_empty() {
        let buffer = SeriesBuffer::new(Duration::hours(4));
        assert!(buffer.series("NOPEUSDT").is_empty());
        assert!(buffer.latest("NOPEUSDT").is_none());
        assert_eq!(buffer.len("NOPEUSDT"), 0);
    }

    #[test]
    fn extend_appends_in_bulk_and_evicts_once() {
        let buffer = SeriesBuffer::new(Duration::hours(4));
        let t0 = base_time();

        let backfill: Vec<MarketPoint> = (0..6)
            .map(|i| sample_point(t0 + Duration::hours(i), 100.0 + i as f64))
            .collect();
        buffer.extend("BTCUSDT", backfill);

        // Points span t0..t0+5h against a 4h window anchored at t0+5h.
        let series = buffer.series("BTCUSDT");
        assert_eq!(series.len(), 5);
        assert_eq!(series[0].spot_price, 101.0);
    }

    #[test]
    fn extend_with_empty_vec_is_a_no_op() {
        let buffer = SeriesBuffer::new(Duration::hours(4));
        buffer.extend("BTCUSDT", Vec::new());
        assert_eq!(buffer.len("BTCUSDT"), 0);
    }
}
