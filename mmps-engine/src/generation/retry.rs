//! Caller-side retry for generation calls
//!
//! **Backoff Strategy:**
//! - Initial delay: configurable (500ms by default)
//! - Max delay: 8s
//! - Multiplier: 2.0 (exponential)
//!
//! Only errors for which [`GenerationError::is_retryable`] holds are retried.
//! With `max_retries = 0` the wrapper behaves exactly like the inner client.

use super::{GenerationClient, GenerationError, GenerationRequest};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(8);

/// Retrying decorator around any [`GenerationClient`]
pub struct RetryingClient {
    inner: Arc<dyn GenerationClient>,
    max_retries: u32,
    initial_backoff: Duration,
}

impl RetryingClient {
    pub fn new(inner: Arc<dyn GenerationClient>, max_retries: u32) -> Self {
        Self {
            inner,
            max_retries,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
        }
    }

    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }
}

#[async_trait::async_trait]
impl GenerationClient for RetryingClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let mut attempt = 0u32;
        let mut backoff = self.initial_backoff;

        loop {
            match self.inner.generate(request).await {
                Ok(text) => {
                    if attempt > 0 {
                        tracing::debug!(attempt, "Generation call succeeded after retry");
                    }
                    return Ok(text);
                }
                Err(err) if err.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    tracing::warn!(
                        attempt,
                        max_retries = self.max_retries,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err,
                        "Generation call failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
                Err(err) => return Err(err),
            }
        }
    }
}
