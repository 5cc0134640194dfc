//! The per-county fetch loop.

use std::time::Duration;

use futures::{stream, StreamExt};
use indicatif::ProgressBar;
use tokio::{
    sync::Mutex,
    time::{self, Interval, MissedTickBehavior},
};

use crate::{dates::DateRange, fips::FipsCode};

use super::{summary, CountyOutcome, ObservationSource};

/// Pacing of the fetch loop.
#[derive(Debug, Clone, Copy)]
pub struct FetchOptions {
    /// Minimum spacing between requests. The CDO API allows five per second.
    pub delay: Duration,
    /// Requests allowed in flight at once.
    pub concurrency: usize,
}

impl Default for FetchOptions {
    fn default() -> Self {
        FetchOptions {
            delay: Duration::from_millis(200),
            concurrency: 1,
        }
    }
}

/// Fixed-interval gate shared by every request.
struct RateLimiter {
    interval: Option<Mutex<Interval>>,
}

impl RateLimiter {
    fn new(delay: Duration) -> Self {
        let interval = (!delay.is_zero()).then(|| {
            let mut interval = time::interval(delay);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            Mutex::new(interval)
        });

        RateLimiter { interval }
    }

    async fn wait(&self) {
        if let Some(interval) = &self.interval {
            interval.lock().await.tick().await;
        }
    }
}

/// Fetches and summarises each code once, in order.
///
/// Failures are returned as values; nothing is retried.
pub async fn collect<S: ObservationSource>(
    source: &S,
    codes: &[FipsCode],
    range: &DateRange,
    options: FetchOptions,
    progress: &ProgressBar,
) -> Vec<(FipsCode, CountyOutcome)> {
    let limiter = RateLimiter::new(options.delay);
    let limiter = &limiter;

    stream::iter(codes.iter().cloned())
        .map(move |fips| async move {
            limiter.wait().await;
            let outcome = source
                .observations(&fips, range)
                .await
                .and_then(|observations| summary::outcome(&observations));
            progress.inc(1);

            (fips, outcome)
        })
        .buffered(options.concurrency.max(1))
        .collect()
        .await
}

// -- Tests -------------------------------------------------------------------
