use std::time::Duration;

use futures::future::BoxFuture;
use tracing::warn;

use datalyst_core::config::RetryConfig;
use datalyst_core::error::{AnalystError, Result};
use datalyst_core::traits::Oracle;
use datalyst_core::types::OutputShape;

/// An oracle that retries transport failures with exponential backoff.
///
/// Malformed structured output (`OracleParse`) is never retried — the
/// workflow treats it as a run-level failure, and resending an identical
/// request would not fix a non-conforming model.
pub struct RetryingOracle {
    inner: Box<dyn Oracle>,
    retry_config: RetryConfig,
}

impl RetryingOracle {
    pub fn new(inner: Box<dyn Oracle>, retry_config: RetryConfig) -> Self {
        Self {
            inner,
            retry_config,
        }
    }

    async fn with_retries<'a, T, F>(&'a self, mut call: F) -> Result<T>
    where
        F: FnMut() -> BoxFuture<'a, Result<T>>,
    {
        let max_retries = self.retry_config.max_retries;
        let mut last_err = None;

        for attempt in 0..=max_retries {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    if is_retryable(&e) && attempt < max_retries {
                        let backoff = calculate_backoff(attempt, &self.retry_config);
                        warn!(
                            attempt = attempt + 1,
                            max_retries,
                            backoff_ms = backoff.as_millis() as u64,
                            error = %e,
                            "Retrying oracle request"
                        );
                        tokio::time::sleep(backoff).await;
                        last_err = Some(e);
                        continue;
                    }
                    return Err(e);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| AnalystError::OracleRequest("all attempts failed".into())))
    }
}

fn is_retryable(e: &AnalystError) -> bool {
    match e {
        AnalystError::OracleRequest(msg) => {
            msg.contains("429")
                || msg.contains("500")
                || msg.contains("502")
                || msg.contains("503")
                || msg.contains("timeout")
                || msg.contains("connection")
        }
        AnalystError::OracleTimeout(_) => true,
        _ => false,
    }
}

fn calculate_backoff(attempt: u32, config: &RetryConfig) -> Duration {
    let ms = (config.initial_backoff_ms * 2u64.pow(attempt)).min(config.max_backoff_ms);
    // Add jitter: 0.8x to 1.2x
    let jitter = 0.8 + rand::random::<f64>() * 0.4;
    Duration::from_millis((ms as f64 * jitter) as u64)
}

impl Oracle for RetryingOracle {
    fn complete(&self, prompt: &str) -> BoxFuture<'_, Result<String>> {
        let prompt = prompt.to_string();
        Box::pin(async move { self.with_retries(|| self.inner.complete(&prompt)).await })
    }

    fn complete_structured(
        &self,
        prompt: &str,
        shape: &OutputShape,
    ) -> BoxFuture<'_, Result<serde_json::Value>> {
        let prompt = prompt.to_string();
        let shape = shape.clone();
        Box::pin(async move {
            self.with_retries(|| self.inner.complete_structured(&prompt, &shape))
                .await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(is_retryable(&AnalystError::OracleRequest(
            "HTTP 429: rate limited".into()
        )));
        assert!(is_retryable(&AnalystError::OracleRequest(
            "connection reset".into()
        )));
        assert!(is_retryable(&AnalystError::OracleTimeout(60)));
        assert!(!is_retryable(&AnalystError::OracleParse(
            "missing field".into()
        )));
        assert!(!is_retryable(&AnalystError::OracleRequest(
            "HTTP 401: unauthorized".into()
        )));
    }

    #[test]
    fn test_backoff_growth_and_cap() {
        let config = RetryConfig {
            max_retries: 3,
            initial_backoff_ms: 1000,
            max_backoff_ms: 3000,
        };
        // Jitter is 0.8x-1.2x, so bound checks use the extremes.
        let b0 = calculate_backoff(0, &config);
        assert!(b0 >= Duration::from_millis(800) && b0 <= Duration::from_millis(1200));
        let b3 = calculate_backoff(3, &config);
        assert!(b3 <= Duration::from_millis(3600));
    }
}
