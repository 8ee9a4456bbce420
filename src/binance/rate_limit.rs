// =============================================================================
// Sliding-Window Rate Limiter — throttles Binance API usage to avoid 429s
// =============================================================================
//
// Binance bans clients that hammer its public endpoints, so every request in
// the process flows through one shared limiter. The algorithm is a sliding
// window over send timestamps:
//
//   1. Drop recorded sends older than the window.
//   2. If fewer than `max_requests` remain, record now and proceed.
//   3. Otherwise sleep until the oldest recorded send ages out, then retry.
//
// `acquire()` blocks the calling task, never the thread; concurrent callers
// queue up on the same window and are released as capacity frees.
// =============================================================================

use std::collections::VecDeque;

use parking_lot::Mutex;
use tokio::time::{sleep, Duration, Instant};
use tracing::debug;

#[derive(Debug)]
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    sent: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            sent: Mutex::new(VecDeque::with_capacity(max_requests)),
        }
    }

    /// Wait until a request may be sent, then record it.
    ///
    /// With `max_requests == 0` no request is ever admitted: the caller
    /// parks in window-length sleeps until cancelled from outside. That is
    /// deliberate; a zero quota means "send nothing".
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut sent = self.sent.lock();
                let now = Instant::now();
                while sent
                    .front()
                    .map_or(false, |&at| now.duration_since(at) >= self.window)
                {
                    sent.pop_front();
                }

                if sent.len() < self.max_requests {
                    sent.push_back(now);
                    None
                } else {
                    // Sleep outside the lock until the oldest send expires.
                    // An empty queue here means max_requests == 0.
                    Some(match sent.front() {
                        Some(&oldest) => self.window.saturating_sub(now.duration_since(oldest)),
                        None => self.window,
                    })
                }
            };

            match wait {
                None => return,
                Some(delay) => {
                    debug!(delay_ms = delay.as_millis() as u64, "rate limit reached — waiting");
                    sleep(delay).await;
                }
            }
        }
    }
}
