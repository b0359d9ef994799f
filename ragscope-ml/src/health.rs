//! Dependency health probes.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

use crate::services::RagServices;

const OK: &str = "ok";
const ERROR: &str = "error";

/// Liveness of the service and its dependencies. Each dependency is `"ok"`
/// or `"error"`; the report itself is always produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub vector_store_status: String,
    pub model_service_status: String,
}

/// Probe the vector store and the model service concurrently.
pub async fn check_health(services: &RagServices) -> HealthReport {
    let timeout = Duration::from_secs(services.config.models.health_timeout_secs);
    let store = services.adapters.store.clone();
    let model = services.adapters.generator.clone();

    let (vector_store_status, model_service_status) = tokio::join!(
        probe("vector_store", timeout, async move { store.ping().await.map_err(|e| e.to_string()) }),
        probe("model_service", timeout, async move { model.ping().await.map_err(|e| e.to_string()) }),
    );

    HealthReport {
        status: OK.to_string(),
        vector_store_status: vector_store_status.to_string(),
        model_service_status: model_service_status.to_string(),
    }
}

async fn probe<F>(name: &str, timeout: Duration, check: F) -> &'static str
where
    F: Future<Output = Result<(), String>>,
{
    match tokio::time::timeout(timeout, check).await {
        Ok(Ok(())) => OK,
        Ok(Err(e)) => {
            debug!(dependency = name, error = %e, "Health probe failed");
            ERROR
        }
        Err(_) => {
            debug!(dependency = name, timeout_secs = timeout.as_secs(), "Health probe timed out");
            ERROR
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_probe_timeout_counts_as_error() {
        let status = probe("slow", Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert_eq!(status, ERROR);
    }

    #[tokio::test]
    async fn test_probe_ok_and_err() {
        assert_eq!(probe("a", Duration::from_secs(1), async { Ok(()) }).await, OK);
        assert_eq!(
            probe("b", Duration::from_secs(1), async { Err("down".to_string()) }).await,
            ERROR
        );
    }
}
