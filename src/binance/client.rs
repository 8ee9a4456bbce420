// =============================================================================
// Binance Market-Data Client — public REST endpoints, spot and USD-M futures
// =============================================================================
//
// Read-only access: prices, premium index, funding, open interest, klines and
// the exchange listings. Nothing here signs requests; there is no key to
// protect. Every call acquires the shared rate limiter immediately before
// touching the network, and a request is attempted exactly once — retry
// policy belongs to the poll cycles, not the transport.
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::binance::rate_limit::RateLimiter;
use crate::types::{FundingSample, Market, OpenInterestSample, PriceSample};

const SPOT_BASE_URL: &str = "https://api.binance.com";
const FUTURES_BASE_URL: &str = "https://fapi.binance.com";

/// Quote-denominated symbols whose base asset is itself a pegged stable
/// token; excluded from the flow universe because their "flows" are noise.
const STABLECOIN_BASES: &[&str] = &["USDC", "TUSD", "BUSD", "DAI", "USDP", "EUR", "GYEN"];

/// Longest error-body excerpt carried inside a `FetchError::Status`.
const BODY_SNIPPET_LEN: usize = 256;

pub type FetchResult<T> = Result<T, FetchError>;

/// Why a single fetch failed. One request maps to at most one of these;
/// callers decide whether to skip, degrade, or surface the cycle error.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("endpoint returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("unexpected response shape: {0}")]
    Shape(String),
}

/// One kline parsed from Binance's array-of-arrays response format.
#[derive(Debug, Clone, PartialEq)]
pub struct Candle {
    pub open_time: i64,
    pub close_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub quote_volume: f64,
    pub trades_count: u64,
    pub taker_buy_volume: f64,
    pub taker_buy_quote_volume: f64,
}

/// One timestamped value from a history endpoint (funding or open interest).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub at_ms: i64,
    pub value: f64,
}

#[derive(Clone)]
pub struct MarketDataClient {
    http: reqwest::Client,
    limiter: Arc<RateLimiter>,
    spot_base: String,
    futures_base: String,
}

impl MarketDataClient {
    // -------------------------------------------------------------------------
    // Construction
    // -------------------------------------------------------------------------

    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .expect("failed to build reqwest client");

        debug!("MarketDataClient initialised (spot + USD-M futures)");

        Self {
            http,
            limiter,
            spot_base: SPOT_BASE_URL.to_string(),
            futures_base: FUTURES_BASE_URL.to_string(),
        }
    }

    fn base(&self, market: Market) -> &str {
        match market {
            Market::Spot => &self.spot_base,
            Market::Futures => &self.futures_base,
        }
    }

    /// Core transport: throttle, send one GET, check the status, decode.
    async fn get_json(&self, market: Market, path_and_query: &str) -> FetchResult<serde_json::Value> {
        self.limiter.acquire().await;

        let url = format!("{}{}", self.base(market), path_and_query);
        let resp = self.http.get(&url).send().await?;
        let status = resp.status();
        let body = resp.text().await?;

        if !status.is_success() {
            return Err(FetchError::Status {
                status,
                body: snippet(&body),
            });
        }

        serde_json::from_str(&body)
            .map_err(|e| FetchError::Shape(format!("invalid JSON from {path_and_query}: {e}")))
    }

    // -------------------------------------------------------------------------
    // Prices
    // -------------------------------------------------------------------------

    /// GET /api/v3/ticker/price — last spot trade price.
    #[instrument(skip(self), name = "binance::spot_price")]
    pub async fn spot_price(&self, symbol: &str) -> FetchResult<f64> {
        let body = self
            .get_json(Market::Spot, &format!("/api/v3/ticker/price?symbol={symbol}"))
            .await?;
        field_f64(&body, "price")
    }

    /// GET /fapi/v1/ticker/price — last futures trade price.
    #[instrument(skip(self), name = "binance::futures_price")]
    pub async fn futures_price(&self, symbol: &str) -> FetchResult<f64> {
        let body = self
            .get_json(
                Market::Futures,
                &format!("/fapi/v1/ticker/price?symbol={symbol}"),
            )
            .await?;
        field_f64(&body, "price")
    }

    /// Spot and futures price for one symbol as a single typed sample.
    pub async fn price_sample(&self, symbol: &str) -> FetchResult<PriceSample> {
        let spot_price = self.spot_price(symbol).await?;
        let futures_price = self.futures_price(symbol).await?;
        Ok(PriceSample {
            symbol: symbol.to_string(),
            spot_price,
            futures_price,
            at: chrono::Utc::now(),
        })
    }

    // -------------------------------------------------------------------------
    // Funding
    // -------------------------------------------------------------------------

    /// GET /fapi/v1/premiumIndex for one symbol — current funding rate as the
    /// raw fraction.
    #[instrument(skip(self), name = "binance::funding_rate")]
    pub async fn funding_rate(&self, symbol: &str) -> FetchResult<f64> {
        let body = self
            .get_json(
                Market::Futures,
                &format!("/fapi/v1/premiumIndex?symbol={symbol}"),
            )
            .await?;
        field_f64(&body, "lastFundingRate")
    }

    pub async fn funding_sample(&self, symbol: &str) -> FetchResult<FundingSample> {
        let funding_rate = self.funding_rate(symbol).await?;
        Ok(FundingSample {
            symbol: symbol.to_string(),
            funding_rate,
            at: chrono::Utc::now(),
        })
    }

    /// GET /fapi/v1/premiumIndex for the whole exchange — funding rate per
    /// symbol quoted in `quote`, one request for the entire universe.
    ///
    /// Rows without a parsable rate are skipped rather than failing the map.
    #[instrument(skip(self), name = "binance::all_funding_rates")]
    pub async fn all_funding_rates(&self, quote: &str) -> FetchResult<HashMap<String, f64>> {
        let body = self.get_json(Market::Futures, "/fapi/v1/premiumIndex").await?;
        let raw = body
            .as_array()
            .ok_or_else(|| FetchError::Shape("premium index response is not an array".into()))?;

        let mut rates = HashMap::with_capacity(raw.len());
        for entry in raw {
            let symbol = match entry["symbol"].as_str() {
                Some(s) if s.ends_with(quote) => s,
                _ => continue,
            };
            match field_f64(entry, "lastFundingRate") {
                Ok(rate) => {
                    rates.insert(symbol.to_string(), rate);
                }
                Err(e) => debug!(symbol, error = %e, "skipping symbol with unparsable funding rate"),
            }
        }

        debug!(quote, count = rates.len(), "funding rates fetched");
        Ok(rates)
    }

    /// GET /fapi/v1/fundingRate — realised funding settlements in the window,
    /// values as raw fractions.
    #[instrument(skip(self), name = "binance::funding_rate_history")]
    pub async fn funding_rate_history(
        &self,
        symbol: &str,
        start_ms: i64,
        end_ms: i64,
        limit: u32,
    ) -> FetchResult<Vec<SeriesPoint>> {
        let body = self
            .get_json(
                Market::Futures,
                &format!(
                    "/fapi/v1/fundingRate?symbol={symbol}&startTime={start_ms}&endTime={end_ms}&limit={limit}"
                ),
            )
            .await?;
        parse_history_points(&body, "fundingRate", "fundingTime")
    }

    // -------------------------------------------------------------------------
    // Open interest
    // -------------------------------------------------------------------------

    /// GET /fapi/v1/openInterest — current open interest in contracts.
    #[instrument(skip(self), name = "binance::open_interest")]
    pub async fn open_interest(&self, symbol: &str) -> FetchResult<f64> {
        let body = self
            .get_json(
                Market::Futures,
                &format!("/fapi/v1/openInterest?symbol={symbol}"),
            )
            .await?;
        field_f64(&body, "openInterest")
    }

    pub async fn open_interest_sample(&self, symbol: &str) -> FetchResult<OpenInterestSample> {
        let open_interest = self.open_interest(symbol).await?;
        Ok(OpenInterestSample {
            symbol: symbol.to_string(),
            open_interest,
            at: chrono::Utc::now(),
        })
    }

    /// GET /futures/data/openInterestHist — sampled open interest.
    /// `period` is a Binance stat period such as "5m" or "1h".
    #[instrument(skip(self), name = "binance::open_interest_history")]
    pub async fn open_interest_history(
        &self,
        symbol: &str,
        period: &str,
        start_ms: Option<i64>,
        end_ms: Option<i64>,
        limit: u32,
    ) -> FetchResult<Vec<SeriesPoint>> {
        let mut path = format!(
            "/futures/data/openInterestHist?symbol={symbol}&period={period}&limit={limit}"
        );
        if let Some(start) = start_ms {
            path.push_str(&format!("&startTime={start}"));
        }
        if let Some(end) = end_ms {
            path.push_str(&format!("&endTime={end}"));
        }

        let body = self.get_json(Market::Futures, &path).await?;
        parse_history_points(&body, "sumOpenInterest", "timestamp")
    }

    // -------------------------------------------------------------------------
    // Klines
    // -------------------------------------------------------------------------

    /// GET klines for either market (public — no signature required).
    ///
    /// Array indices:
    ///   [0] openTime, [1] open, [2] high, [3] low, [4] close, [5] volume,
    ///   [6] closeTime, [7] quoteAssetVolume, [8] numberOfTrades,
    ///   [9] takerBuyBaseVolume, [10] takerBuyQuoteVolume
    #[instrument(skip(self), name = "binance::klines")]
    pub async fn klines(
        &self,
        market: Market,
        symbol: &str,
        interval: &str,
        start_ms: Option<i64>,
        end_ms: Option<i64>,
        limit: u32,
    ) -> FetchResult<Vec<Candle>> {
        let endpoint = match market {
            Market::Spot => "/api/v3/klines",
            Market::Futures => "/fapi/v1/klines",
        };
        let mut path = format!("{endpoint}?symbol={symbol}&interval={interval}&limit={limit}");
        if let Some(start) = start_ms {
            path.push_str(&format!("&startTime={start}"));
        }
        if let Some(end) = end_ms {
            path.push_str(&format!("&endTime={end}"));
        }

        let body = self.get_json(market, &path).await?;
        let raw = body
            .as_array()
            .ok_or_else(|| FetchError::Shape("klines response is not an array".into()))?;

        let mut candles = Vec::with_capacity(raw.len());
        for entry in raw {
            match parse_kline_row(entry) {
                Ok(candle) => candles.push(candle),
                Err(e) => debug!(symbol, error = %e, "skipping malformed kline row"),
            }
        }

        debug!(symbol, interval, market = %market, count = candles.len(), "klines fetched");
        Ok(candles)
    }

    // -------------------------------------------------------------------------
    // Listings
    // -------------------------------------------------------------------------

    /// GET /fapi/v1/exchangeInfo — actively trading perpetual contracts
    /// quoted in `quote`.
    #[instrument(skip(self), name = "binance::perpetual_symbols")]
    pub async fn perpetual_symbols(&self, quote: &str) -> FetchResult<Vec<String>> {
        let body = self.get_json(Market::Futures, "/fapi/v1/exchangeInfo").await?;
        let symbols = perpetual_symbols_from_info(&body, quote);
        debug!(quote, count = symbols.len(), "perpetual listings fetched");
        Ok(symbols)
    }

    /// Exchange info for either market — actively trading symbols quoted in
    /// `quote` whose base asset is not itself a stablecoin.
    #[instrument(skip(self), name = "binance::tradable_symbols")]
    pub async fn tradable_symbols(&self, market: Market, quote: &str) -> FetchResult<Vec<String>> {
        let endpoint = match market {
            Market::Spot => "/api/v3/exchangeInfo",
            Market::Futures => "/fapi/v1/exchangeInfo",
        };
        let body = self.get_json(market, endpoint).await?;
        let symbols = tradable_symbols_from_info(&body, quote);
        debug!(market = %market, quote, count = symbols.len(), "tradable listings fetched");
        Ok(symbols)
    }
}

// -----------------------------------------------------------------------------
// Parsing helpers (pure, shared by every endpoint)
// -----------------------------------------------------------------------------

/// Extract `field` from a JSON object and parse it into `f64`. Binance
/// serialises most numbers as strings, so both representations are accepted.
fn field_f64(body: &serde_json::Value, field: &str) -> FetchResult<f64> {
    match body.get(field) {
        None => Err(FetchError::Shape(format!("missing field '{field}'"))),
        Some(val) => str_or_num_f64(val, field),
    }
}

fn str_or_num_f64(val: &serde_json::Value, name: &str) -> FetchResult<f64> {
    if let Some(s) = val.as_str() {
        s.parse::<f64>()
            .map_err(|_| FetchError::Shape(format!("failed to parse '{name}' value '{s}' as f64")))
    } else if let Some(n) = val.as_f64() {
        Ok(n)
    } else {
        Err(FetchError::Shape(format!(
            "field '{name}' is neither a string nor a number: {val}"
        )))
    }
}

fn parse_kline_row(entry: &serde_json::Value) -> FetchResult<Candle> {
    let arr = entry
        .as_array()
        .ok_or_else(|| FetchError::Shape("kline row is not an array".into()))?;
    if arr.len() < 11 {
        return Err(FetchError::Shape(format!(
            "kline row has {} elements, expected at least 11",
            arr.len()
        )));
    }

    Ok(Candle {
        open_time: arr[0].as_i64().unwrap_or(0),
        close_time: arr[6].as_i64().unwrap_or(0),
        open: str_or_num_f64(&arr[1], "open")?,
        high: str_or_num_f64(&arr[2], "high")?,
        low: str_or_num_f64(&arr[3], "low")?,
        close: str_or_num_f64(&arr[4], "close")?,
        volume: str_or_num_f64(&arr[5], "volume")?,
        quote_volume: str_or_num_f64(&arr[7], "quoteAssetVolume")?,
        trades_count: arr[8].as_u64().unwrap_or(0),
        taker_buy_volume: str_or_num_f64(&arr[9], "takerBuyBaseVolume")?,
        taker_buy_quote_volume: str_or_num_f64(&arr[10], "takerBuyQuoteVolume")?,
    })
}

/// Parse a history response (array of objects) into timestamped points.
/// Rows missing either field are skipped; the endpoint occasionally returns
/// partial rows near the window edges.
fn parse_history_points(
    body: &serde_json::Value,
    value_field: &str,
    time_field: &str,
) -> FetchResult<Vec<SeriesPoint>> {
    let raw = body
        .as_array()
        .ok_or_else(|| FetchError::Shape(format!("{value_field} history is not an array")))?;

    let mut points = Vec::with_capacity(raw.len());
    for entry in raw {
        let at_ms = match entry[time_field].as_i64() {
            Some(at) => at,
            None => continue,
        };
        match field_f64(entry, value_field) {
            Ok(value) => points.push(SeriesPoint { at_ms, value }),
            Err(e) => debug!(error = %e, "skipping unparsable history row"),
        }
    }
    Ok(points)
}

fn perpetual_symbols_from_info(info: &serde_json::Value, quote: &str) -> Vec<String> {
    let mut out = Vec::new();
    if let Some(symbols) = info["symbols"].as_array() {
        for entry in symbols {
            let symbol = entry["symbol"].as_str().unwrap_or("");
            let status = entry["status"].as_str().unwrap_or("");
            let contract = entry["contractType"].as_str().unwrap_or("");
            if status == "TRADING" && contract == "PERPETUAL" && symbol.ends_with(quote) {
                out.push(symbol.to_string());
            }
        }
    }
    out
}

fn tradable_symbols_from_info(info: &serde_json::Value, quote: &str) -> Vec<String> {
    let mut out = Vec::new();
    if let Some(symbols) = info["symbols"].as_array() {
        for entry in symbols {
            let symbol = entry["symbol"].as_str().unwrap_or("");
            let status = entry["status"].as_str().unwrap_or("");
            let base = entry["baseAsset"].as_str().unwrap_or("");
            let entry_quote = entry["quoteAsset"].as_str().unwrap_or("");
            if status == "TRADING" && entry_quote == quote && !STABLECOIN_BASES.contains(&base) {
                out.push(symbol.to_string());
            }
        }
    }
    out
}

fn snippet(body: &str) -> String {
    if body.len() <= BODY_SNIPPET_LEN {
        body.to_string()
    } else {
        let mut cut = BODY_SNIPPET_LEN;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}…", &body[..cut])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_kline_row() -> serde_json::Value {
        json!([
            1700000000000i64,
            "100.0",
            "105.0",
            "99.0",
            "104.0",
            "1000.0",
            1700000059999i64,
            "104000.0",
            523,
            "600.0",
            "62400.0"
        ])
    }

    // ---- field_f64 / str_or_num_f64 ----

    #[test]
    fn field_accepts_string_and_number_encodings() {
        let body = json!({ "price": "42.5" });
        assert_eq!(field_f64(&body, "price").unwrap(), 42.5);

        let body = json!({ "price": 42.5 });
        assert_eq!(field_f64(&body, "price").unwrap(), 42.5);
    }

    #[test]
    fn field_missing_is_a_shape_error() {
        let body = json!({ "other": 1.0 });
        let err = field_f64(&body, "price").unwrap_err();
        assert!(matches!(err, FetchError::Shape(_)), "got {err:?}");
    }

    #[test]
    fn field_garbage_string_is_a_shape_error() {
        let body = json!({ "price": "not-a-number" });
        assert!(field_f64(&body, "price").is_err());
    }

    #[test]
    fn field_wrong_type_is_a_shape_error() {
        let body = json!({ "price": true });
        assert!(field_f64(&body, "price").is_err());
    }

    // ---- parse_kline_row ----

    #[test]
    fn kline_row_parses_all_fields() {
        let candle = parse_kline_row(&sample_kline_row()).unwrap();
        assert_eq!(candle.open_time, 1700000000000);
        assert_eq!(candle.close_time, 1700000059999);
        assert_eq!(candle.close, 104.0);
        assert_eq!(candle.quote_volume, 104000.0);
        assert_eq!(candle.trades_count, 523);
        assert_eq!(candle.taker_buy_quote_volume, 62400.0);
    }

    #[test]
    fn short_kline_row_is_rejected() {
        let row = json!([1700000000000i64, "100.0", "105.0"]);
        assert!(parse_kline_row(&row).is_err());
    }

    #[test]
    fn non_array_kline_row_is_rejected() {
        assert!(parse_kline_row(&json!({ "open": "100.0" })).is_err());
    }

    // ---- parse_history_points ----

    #[test]
    fn history_points_map_both_fields() {
        let body = json!([
            { "fundingTime": 1700000000000i64, "fundingRate": "0.0001" },
            { "fundingTime": 1700028800000i64, "fundingRate": "-0.0002" }
        ]);
        let points = parse_history_points(&body, "fundingRate", "fundingTime").unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].at_ms, 1700000000000);
        assert_eq!(points[1].value, -0.0002);
    }

    #[test]
    fn history_rows_missing_fields_are_skipped() {
        let body = json!([
            { "timestamp": 1700000000000i64, "sumOpenInterest": "123.0" },
            { "timestamp": 1700000300000i64 },
            { "sumOpenInterest": "456.0" }
        ]);
        let points = parse_history_points(&body, "sumOpenInterest", "timestamp").unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].value, 123.0);
    }

    #[test]
    fn history_non_array_is_a_shape_error() {
        let body = json!({ "rows": [] });
        assert!(parse_history_points(&body, "sumOpenInterest", "timestamp").is_err());
    }

    // ---- listing filters ----

    fn sample_exchange_info() -> serde_json::Value {
        json!({
            "symbols": [
                { "symbol": "BTCUSDT", "status": "TRADING", "contractType": "PERPETUAL",
                  "baseAsset": "BTC", "quoteAsset": "USDT" },
                { "symbol": "ETHUSDT", "status": "TRADING", "contractType": "PERPETUAL",
                  "baseAsset": "ETH", "quoteAsset": "USDT" },
                { "symbol": "BTCUSDT_240927", "status": "TRADING", "contractType": "CURRENT_QUARTER",
                  "baseAsset": "BTC", "quoteAsset": "USDT" },
                { "symbol": "DOGEUSDT", "status": "BREAK", "contractType": "PERPETUAL",
                  "baseAsset": "DOGE", "quoteAsset": "USDT" },
                { "symbol": "USDCUSDT", "status": "TRADING", "contractType": "PERPETUAL",
                  "baseAsset": "USDC", "quoteAsset": "USDT" },
                { "symbol": "BTCBUSD", "status": "TRADING", "contractType": "PERPETUAL",
                  "baseAsset": "BTC", "quoteAsset": "BUSD" }
            ]
        })
    }

    #[test]
    fn perpetual_filter_keeps_trading_perps_with_matching_quote() {
        let symbols = perpetual_symbols_from_info(&sample_exchange_info(), "USDT");
        assert_eq!(symbols, vec!["BTCUSDT", "ETHUSDT", "USDCUSDT"]);
    }

    #[test]
    fn tradable_filter_drops_stablecoin_bases_and_other_quotes() {
        // No contract-type filter here: the quarterly stays, the stable base
        // (USDCUSDT), the halted symbol (DOGEUSDT) and the BUSD quote go.
        let symbols = tradable_symbols_from_info(&sample_exchange_info(), "USDT");
        assert_eq!(symbols, vec!["BTCUSDT", "ETHUSDT", "BTCUSDT_240927"]);
    }

    // ---- snippet ----

    #[test]
    fn snippet_truncates_long_bodies() {
        let long = "x".repeat(BODY_SNIPPET_LEN * 2);
        let cut = snippet(&long);
        assert!(cut.chars().count() <= BODY_SNIPPET_LEN + 1);
        assert!(cut.ends_with('…'));
        assert_eq!(snippet("short"), "short");
    }
}
