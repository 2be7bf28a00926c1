//! Exponential backoff for whole-operation retries.
//!
//! The worker install step uses this: every attempt re-runs the full
//! manifest fetch, so the operation itself must be safe to repeat.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// How often, and how patiently, to retry.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total runs, the first one included. Zero behaves like one.
    pub max_attempts: u32,
    /// Pause before the second run.
    pub initial_delay: Duration,
    /// Ceiling for any single pause, jitter excluded.
    pub max_delay: Duration,
    /// Growth factor applied per further run.
    pub backoff_multiplier: f64,
    /// Stretch each pause by a random 0-25%.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Run once, never retry.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Pause before run number `attempt` (1-based). The first run has none.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let Some(retries_before) = attempt.checked_sub(2) else {
            return Duration::ZERO;
        };

        let exponent = i32::try_from(retries_before).unwrap_or(i32::MAX);
        let secs = (self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent))
            .min(self.max_delay.as_secs_f64());
        let capped = Duration::from_secs_f64(secs.max(0.0));

        if !self.jitter {
            return capped;
        }
        capped.mul_f64(1.0 + rand::random::<f64>() * 0.25)
    }
}

/// Run `operation` until it succeeds or the attempts run out.
///
/// The error of the final run is returned.
pub async fn retry_with_backoff<T, E, F, Fut>(config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let limit = config.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        let err = match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(attempt, "Recovered on retry");
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        if attempt >= limit {
            warn!(attempt, limit, error = %err, "Out of attempts");
            return Err(err);
        }
        warn!(attempt, limit, error = %err, "Attempt failed");

        attempt += 1;
        let pause = config.delay_for_attempt(attempt);
        debug!(attempt, ?pause, "Backing off");
        sleep(pause).await;
    }
}
