use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::RetryConfig;

pub struct RetryPolicy {
    max_retries: usize,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: usize, initial_backoff_ms: u64, max_backoff_ms: u64) -> Self {
        Self {
            max_retries,
            initial_backoff: Duration::from_millis(initial_backoff_ms),
            max_backoff: Duration::from_millis(max_backoff_ms),
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_retries,
            config.initial_backoff_ms,
            config.max_backoff_ms,
        )
    }

    /// Delay before retry number `retry` (1-based): doubles from the initial
    /// backoff and is capped at the maximum.
    pub fn backoff_for(&self, retry: usize) -> Duration {
        let exponent = retry.saturating_sub(1).min(16) as u32;
        self.initial_backoff
            .saturating_mul(2u32.pow(exponent))
            .min(self.max_backoff)
    }

    /// Run `f` until it succeeds, `should_retry` rejects the error, or the
    /// retry budget is spent. The last error is returned.
    pub async fn retry<F, Fut, T, E, P>(
        &self,
        operation_name: &str,
        should_retry: P,
        mut f: F,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        E: std::fmt::Display,
        P: Fn(&E) -> bool,
    {
        let mut retries = 0;
        loop {
            let error = match f().await {
                Ok(value) => {
                    if retries > 0 {
                        info!(operation = operation_name, retries, "recovered after retry");
                    }
                    return Ok(value);
                }
                Err(e) => e,
            };

            if !should_retry(&error) {
                return Err(error);
            }
            if retries >= self.max_retries {
                warn!(operation = operation_name, retries, error = %error, "retry budget exhausted");
                return Err(error);
            }

            retries += 1;
            let delay = self.backoff_for(retries);
            warn!(
                operation = operation_name,
                retry = retries,
                max_retries = self.max_retries,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "transient failure, retrying"
            );
            sleep(delay).await;
        }
    }
}
