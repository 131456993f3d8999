//! Admission control for outbound Tracker API calls.
//!
//! Every request issued by the client passes through a single [`RateLimiter`]:
//! at most `rate` operations start within any sliding `interval`, and at most
//! `concurrency` are in flight at once. Waiters are admitted in submission
//! order; nothing is rejected or retried.

use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;

use tokio::sync::{Mutex, Semaphore};
use tokio::time::{Instant, sleep_until};

use crate::error::{Error, Result};

/// Tracker allows 200 requests per minute per user.
pub const DEFAULT_RATE: u32 = 3;
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(1000);
pub const DEFAULT_CONCURRENCY: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub rate: u32,
    pub interval: Duration,
    pub concurrency: u32,
}

impl Default for RateLimit {
    fn default() -> Self {
        Self {
            rate: DEFAULT_RATE,
            interval: DEFAULT_INTERVAL,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

pub struct RateLimiter {
    limit: RateLimit,
    in_flight: Semaphore,
    /// Start times of the admissions inside the current window. The lock is
    /// fair, so holding it while waiting keeps admission FIFO.
    window: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(limit: RateLimit) -> Self {
        let rate = limit.rate.max(1);
        let concurrency = limit.concurrency.max(1);
        Self {
            limit: RateLimit {
                rate,
                interval: limit.interval,
                concurrency,
            },
            in_flight: Semaphore::new(concurrency as usize),
            window: Mutex::new(VecDeque::with_capacity(rate as usize)),
        }
    }

    #[must_use]
    pub fn limit(&self) -> RateLimit {
        self.limit
    }

    /// Stops admitting operations. Callers not yet admitted, and any later
    /// ones, fail with [`Error::RateLimiterClosed`]; operations already
    /// running finish normally.
    pub fn close(&self) {
        self.in_flight.close();
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.in_flight.is_closed()
    }

    /// Runs `operation` once the rate and concurrency budgets allow it.
    ///
    /// The operation's result, including its error, is returned unchanged.
    pub async fn schedule<F, Fut, T>(&self, operation: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let _permit = {
            let mut window = self.window.lock().await;

            let permit = self
                .in_flight
                .acquire()
                .await
                .map_err(|_| Error::RateLimiterClosed)?;

            loop {
                let now = Instant::now();
                while window
                    .front()
                    .is_some_and(|started| now.duration_since(*started) >= self.limit.interval)
                {
                    window.pop_front();
                }

                if window.len() < self.limit.rate as usize {
                    break;
                }

                if let Some(oldest) = window.front() {
                    sleep_until(*oldest + self.limit.interval).await;
                }
            }

            if self.in_flight.is_closed() {
                return Err(Error::RateLimiterClosed);
            }
            window.push_back(Instant::now());
            permit
        };

        operation().await
    }
}
