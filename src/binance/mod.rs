// =============================================================================
// Binance Access Layer
// =============================================================================
//
// Public market-data endpoints only; nothing in here signs a request. All
// traffic funnels through one shared sliding-window rate limiter.

pub mod client;
pub mod rate_limit;

pub use client::{Candle, FetchError, FetchResult, MarketDataClient, SeriesPoint};
pub use rate_limit::RateLimiter;
