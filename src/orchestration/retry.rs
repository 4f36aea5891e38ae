// Retry policy - exponential backoff as a pure function of the attempt count

use super::config::RetryConfig;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Returned when a policy ran out of attempts without capturing any error
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Max retries exceeded")]
pub struct RetriesExhausted;

// 2^62 seconds is already far beyond any sane max_backoff
const MAX_EXPONENT: u32 = 62;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff_factor: f64,
    max_backoff: f64,
    jitter: f64,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_factor: f64, max_backoff: f64) -> Self {
        Self {
            max_attempts,
            backoff_factor: non_negative(backoff_factor),
            max_backoff: non_negative(max_backoff),
            jitter: 0.0,
        }
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = non_negative(jitter).min(1.0);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before the next attempt after `retries` failures:
    /// `min(backoff_factor * 2^(retries-1), max_backoff)`.
    pub fn backoff(&self, retries: u32) -> Duration {
        if retries == 0 {
            return Duration::ZERO;
        }
        let exponent = (retries - 1).min(MAX_EXPONENT) as i32;
        let seconds = (self.backoff_factor * 2f64.powi(exponent)).min(self.max_backoff);
        saturating_secs(seconds)
    }

    /// Backoff plus up to `jitter * backoff` extra, scaled by `unit` in [0, 1],
    /// never exceeding `max_backoff`.
    pub fn backoff_with_jitter(&self, retries: u32, unit: f64) -> Duration {
        let base = self.backoff(retries).as_secs_f64();
        let extra = base * self.jitter * non_negative(unit).min(1.0);
        saturating_secs((base + extra).min(self.max_backoff.max(base)))
    }

    /// Run `operation` until it succeeds or the attempts are used up.
    ///
    /// Attempts are strictly sequential; the closure receives the 1-based
    /// attempt number. On exhaustion the last error is returned.
    pub async fn run<T, E, F, Fut>(&self, target: &str, mut operation: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<RetriesExhausted> + Display,
    {
        let mut retries = 0;
        let mut last_error = None;

        while retries < self.max_attempts {
            match operation(retries + 1).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    retries += 1;
                    if retries < self.max_attempts {
                        let delay = self.next_delay(retries);
                        tracing::warn!(
                            "Retry {} for {} after {:?}. Error: {}",
                            retries,
                            target,
                            delay,
                            e
                        );
                        last_error = Some(e);
                        tokio::time::sleep(delay).await;
                    } else {
                        tracing::debug!("Giving up on {} after {} attempt(s): {}", target, retries, e);
                        last_error = Some(e);
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| RetriesExhausted.into()))
    }

    fn next_delay(&self, retries: u32) -> Duration {
        if self.jitter > 0.0 {
            self.backoff_with_jitter(retries, rand::random::<f64>())
        } else {
            self.backoff(retries)
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        RetryPolicy::new(config.max_retries, config.backoff_factor, config.max_backoff)
            .with_jitter(config.jitter)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::from(&RetryConfig::default())
    }
}

fn non_negative(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 { value } else { 0.0 }
}

fn saturating_secs(seconds: f64) -> Duration {
    Duration::try_from_secs_f64(non_negative(seconds)).unwrap_or(Duration::MAX)
}
