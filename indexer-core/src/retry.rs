//! Exponential backoff with jitter for chain and database calls.

use std::future::Future;
use std::time::{Duration, Instant};

use tracing::warn;

use crate::error::{IndexerError, Result};

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter_factor: f64,
    /// Total wall-clock budget across attempts. `None` retries forever.
    pub max_elapsed: Option<Duration>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 500,
            max_delay_ms: 60_000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.1, // 10% jitter
            max_elapsed: Some(Duration::from_secs(300)),
        }
    }
}

impl RetryConfig {
    pub fn with_max_elapsed(max_elapsed: Option<Duration>) -> Self {
        Self {
            max_elapsed,
            ..Self::default()
        }
    }

    /// Delay for the nth attempt: exponential growth capped at `max_delay_ms`
    /// plus jitter to avoid thundering herds.
    fn delay(&self, attempt: u32) -> Duration {
        let base = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(attempt as i32);
        let capped = base.min(self.max_delay_ms as f64);

        let jitter_range = capped * self.jitter_factor;
        let jitter = (rand::random::<f64>() - 0.5) * jitter_range * 2.0;
        let with_jitter = (capped + jitter).max(0.0);

        Duration::from_millis(with_jitter as u64)
    }
}

/// Stateful delay sequence. `next_delay` returns `None` once the configured
/// wall-clock budget is spent.
#[derive(Debug)]
pub struct Backoff {
    config: RetryConfig,
    attempt: u32,
    started: Instant,
}

impl Backoff {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            attempt: 0,
            started: Instant::now(),
        }
    }

    pub fn next_delay(&mut self) -> Option<Duration> {
        if let Some(max_elapsed) = self.config.max_elapsed {
            if self.started.elapsed() >= max_elapsed {
                return None;
            }
        }

        let delay = self.config.delay(self.attempt);
        self.attempt = self.attempt.saturating_add(1);
        Some(delay)
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
        self.started = Instant::now();
    }
}

/// Run `op` until it succeeds or the retry budget is exhausted. Every failed
/// attempt logs a warning with the delay before the next one.
pub async fn retry<T, F, Fut>(config: &RetryConfig, operation: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut backoff = Backoff::new(config.clone());

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => match backoff.next_delay() {
                Some(delay) => {
                    warn!("{operation} error: {err}. Will retry after {delay:?}");
                    tokio::time::sleep(delay).await;
                }
                None => return Err(IndexerError::exhausted(operation, err)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter_config() -> RetryConfig {
        RetryConfig {
            initial_delay_ms: 100,
            max_delay_ms: 1_000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.0, // deterministic for testing
            max_elapsed: None,
        }
    }

    #[test]
    fn delays_grow_exponentially() {
        let config = no_jitter_config();
        assert_eq!(config.delay(0).as_millis(), 100);
        assert_eq!(config.delay(1).as_millis(), 200);
        assert_eq!(config.delay(2).as_millis(), 400);
    }

    #[test]
    fn delay_caps_at_max() {
        let config = no_jitter_config();
        assert_eq!(config.delay(10).as_millis(), 1_000);
    }

    #[test]
    fn unbounded_backoff_never_exhausts() {
        let mut backoff = Backoff::new(no_jitter_config());
        for _ in 0..20 {
            assert!(backoff.next_delay().is_some());
        }
    }

    #[test]
    fn spent_budget_yields_none() {
        let config = RetryConfig {
            max_elapsed: Some(Duration::ZERO),
            ..no_jitter_config()
        };
        let mut backoff = Backoff::new(config);
        assert!(backoff.next_delay().is_none());
    }

    #[test]
    fn reset_restarts_the_sequence() {
        let mut backoff = Backoff::new(no_jitter_config());
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();
        assert_eq!(backoff.next_delay().unwrap().as_millis(), 100);
    }

    #[tokio::test]
    async fn retry_returns_first_success() {
        let mut config = no_jitter_config();
        config.initial_delay_ms = 1;
        config.max_delay_ms = 1;

        let mut attempts = 0u32;
        let result = retry(&config, "test op", || {
            attempts += 1;
            let outcome = if attempts < 3 {
                Err(IndexerError::Transport("boom".into()))
            } else {
                Ok(attempts)
            };
            async move { outcome }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
    }

    #[tokio::test]
    async fn retry_wraps_terminal_failure_with_operation_name() {
        let config = RetryConfig {
            max_elapsed: Some(Duration::ZERO),
            ..no_jitter_config()
        };

        let result: Result<()> = retry(&config, "flaky call", || async {
            Err(IndexerError::Transport("boom".into()))
        })
        .await;

        let err = result.unwrap_err();
        assert!(matches!(err, IndexerError::RetriesExhausted { .. }));
        assert!(err.to_string().contains("flaky call"));
    }
}
