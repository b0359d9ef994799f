//! Text-generation model adapters.
//!
//! [`ModelAdapter`] is the seam between the query pipeline and whatever
//! serves completions. The same trait backs both the generation model and the
//! judge model, so each can be swapped independently.

pub mod mock;
pub mod ollama;

pub use mock::MockModel;
pub use ollama::{OllamaModel, probe_model_service, pull_model};

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

use crate::config::RetryConfig;
use crate::error::ModelError;

/// A text-generation model: one prompt in, one completion out.
#[async_trait]
pub trait ModelAdapter: Send + Sync {
    /// Produce a completion for `prompt`.
    async fn generate(&self, prompt: &str) -> Result<String, ModelError>;

    /// Identifier recorded alongside every run that uses this model.
    fn model_name(&self) -> &str;

    /// Check that the serving backend is reachable.
    async fn ping(&self) -> Result<(), ModelError> {
        Ok(())
    }
}

/// Execute an async model call with exponential backoff on transient errors.
///
/// Only [`ModelError::is_retryable`] errors are retried; anything else is
/// returned immediately.
pub async fn with_retry<F, Fut, T>(config: &RetryConfig, operation: F) -> Result<T, ModelError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, ModelError>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(val) => return Ok(val),
            Err(e) if !e.is_retryable() || attempt >= config.max_retries => return Err(e),
            Err(e) => {
                let backoff_ms = compute_backoff(config, attempt);
                tracing::warn!(
                    attempt = attempt + 1,
                    max = config.max_retries,
                    backoff_ms,
                    error = %e,
                    "Retrying model call after transient error"
                );
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                attempt += 1;
            }
        }
    }
}

fn compute_backoff(config: &RetryConfig, attempt: u32) -> u64 {
    let base = config.initial_backoff_ms as f64 * config.backoff_multiplier.powi(attempt as i32);
    base.min(config.max_backoff_ms as f64) as u64
}
