use std::future::Future;
use std::time::Duration;

use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;

use crate::config::ConversationConfig;
use crate::errors::{BackendError, Retryable};

/// Timeout and bounded backoff applied to every call that leaves the process.
#[derive(Debug, Clone)]
pub struct CallPolicy {
    pub timeout: Duration,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
}

impl CallPolicy {
    pub fn from_config(config: &ConversationConfig) -> Self {
        Self {
            timeout: Duration::from_millis(config.backend_timeout_ms),
            max_retries: config.backend_max_retries,
            retry_delay_ms: config.retry_delay_ms,
        }
    }

    /// Runs `op` under the timeout, retrying transient failures. A timed-out
    /// attempt counts as transient.
    pub async fn guarded<T, E, F, Fut>(&self, backend: &'static str, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + From<BackendError> + std::fmt::Display,
    {
        let strategy = ExponentialBackoff::from_millis(2)
            .factor(self.retry_delay_ms.max(1) / 2 + 1)
            .max_delay(Duration::from_secs(2))
            .map(jitter)
            .take(self.max_retries);

        let timeout = self.timeout;
        let timeout_ms = timeout.as_millis() as u64;

        let attempt = || {
            let fut = op();
            async move {
                match tokio::time::timeout(timeout, fut).await {
                    Ok(result) => result,
                    Err(_) => Err(E::from(BackendError::Timeout {
                        backend,
                        timeout_ms,
                    })),
                }
            }
        };

        let result = RetryIf::spawn(strategy, attempt, |e: &E| {
            let transient = e.is_transient();
            if transient {
                tracing::warn!(backend, error = %e, "transient backend failure, retrying");
            }
            transient
        })
        .await;

        if let Err(e) = &result {
            tracing::error!(backend, error = %e, "backend call failed");
        }
        result
    }
}
