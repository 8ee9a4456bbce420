// =============================================================================
// Parallel Symbol Collector
// =============================================================================
//
// Fans one async fetch out over a symbol list with a bounded number of
// in-flight requests. Individual failures are logged and excluded; the batch
// always runs to completion and returns whatever succeeded, in completion
// order. Actual request pacing is the rate limiter's job — the worker bound
// here only caps memory and socket pressure.

use std::future::Future;

use futures_util::stream::{self, StreamExt};
use tracing::{info, warn};

pub struct ParallelCollector {
    workers: usize,
}

impl ParallelCollector {
    /// `workers` is the maximum number of in-flight fetches, floored at one.
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    /// Run `fetch` for every symbol and collect the successful results.
    ///
    /// A failed symbol is logged with its error and dropped from the output;
    /// it never aborts the rest of the batch.
    pub async fn collect<T, E, F, Fut>(&self, symbols: Vec<String>, fetch: F) -> Vec<T>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let total = symbols.len();
        let started = std::time::Instant::now();

        let fetch = &fetch;
        let mut outcomes = stream::iter(symbols)
            .map(move |symbol| async move {
                let outcome = fetch(symbol.clone()).await;
                (symbol, outcome)
            })
            .buffer_unordered(self.workers);

        let mut results = Vec::with_capacity(total);
        let mut failed = 0usize;
        while let Some((symbol, outcome)) = outcomes.next().await {
            match outcome {
                Ok(record) => results.push(record),
                Err(e) => {
                    failed += 1;
                    warn!(symbol = %symbol, error = %e, "symbol fetch failed, excluded from batch");
                }
            }
        }

        info!(
            total,
            succeeded = results.len(),
            failed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "symbol collection finished"
        );
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::time::Duration;

    fn symbols(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("SYM{i}USDT")).collect()
    }

    fn index_of(symbol: &str) -> usize {
        symbol
            .trim_start_matches("SYM")
            .trim_end_matches("USDT")
            .parse()
            .unwrap()
    }

    #[tokio::test]
    async fn failures_are_excluded_from_results() {
        let collector = ParallelCollector::new(4);
        let results = collector
            .collect(symbols(10), |symbol| async move {
                if index_of(&symbol) % 3 == 1 {
                    Err(format!("simulated failure for {symbol}"))
                } else {
                    Ok(symbol)
                }
            })
            .await;

        // Indices 1, 4 and 7 fail; the other seven make it through.
        assert_eq!(results.len(), 7);
        assert!(results.iter().all(|s| index_of(s) % 3 != 1));
    }

    #[tokio::test(start_paused = true)]
    async fn in_flight_never_exceeds_worker_bound() {
        let collector = ParallelCollector::new(3);
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let results = collector
            .collect(symbols(12), |symbol| {
                let in_flight = Arc::clone(&in_flight);
                let max_seen = Arc::clone(&max_seen);
                async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    max_seen.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok::<_, String>(symbol)
                }
            })
            .await;

        assert_eq!(results.len(), 12);
        assert!(
            max_seen.load(Ordering::SeqCst) <= 3,
            "saw {} concurrent fetches",
            max_seen.load(Ordering::SeqCst)
        );
    }

    #[tokio::test]
    async fn empty_symbol_list_returns_empty() {
        let collector = ParallelCollector::new(5);
        let results = collector
            .collect(Vec::new(), |symbol| async move { Ok::<_, String>(symbol) })
            .await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn zero_workers_still_make_progress() {
        let collector = ParallelCollector::new(0);
        let results = collector
            .collect(symbols(3), |symbol| async move { Ok::<_, String>(symbol) })
            .await;
        assert_eq!(results.len(), 3);
    }
}
