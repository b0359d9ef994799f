//! Scripted model for tests and offline development.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use super::ModelAdapter;
use crate::error::ModelError;

/// A model whose replies are scripted up front.
///
/// Resolution order for each call: the first prompt rule whose needle occurs
/// in the prompt, then the next queued reply, then the fallback reply.
pub struct MockModel {
    name: String,
    rules: Vec<(String, Result<String, ModelError>)>,
    queue: Mutex<VecDeque<Result<String, ModelError>>>,
    fallback: Result<String, ModelError>,
    delay: Option<Duration>,
    offline: bool,
    prompts: Mutex<Vec<String>>,
}

impl MockModel {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            rules: Vec::new(),
            queue: Mutex::new(VecDeque::new()),
            fallback: Ok("mock response".to_string()),
            delay: None,
            offline: false,
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// A model that answers every prompt with `text`.
    pub fn with_response(name: &str, text: &str) -> Self {
        Self::new(name).fallback(Ok(text.to_string()))
    }

    /// A model whose every call fails with `error`.
    pub fn failing(name: &str, error: ModelError) -> Self {
        Self::new(name).fallback(Err(error))
    }

    /// Reply used when no rule matches and the queue is empty.
    pub fn fallback(mut self, reply: Result<String, ModelError>) -> Self {
        self.fallback = reply;
        self
    }

    /// Answer prompts containing `needle` with `reply`.
    pub fn when_prompt_contains(mut self, needle: &str, reply: Result<String, ModelError>) -> Self {
        self.rules.push((needle.to_string(), reply));
        self
    }

    /// Sleep for `delay` before every reply.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Make `ping` fail, as if the serving backend were down.
    pub fn offline(mut self) -> Self {
        self.offline = true;
        self
    }

    /// Queue a reply for the next call that no rule matches.
    pub fn queue_reply(&self, reply: Result<String, ModelError>) {
        self.queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(reply);
    }

    /// Number of `generate` calls so far.
    pub fn call_count(&self) -> usize {
        self.prompts.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Every prompt received, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl ModelAdapter for MockModel {
    async fn generate(&self, prompt: &str) -> Result<String, ModelError> {
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(prompt.to_string());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some((_, reply)) = self.rules.iter().find(|(needle, _)| prompt.contains(needle)) {
            return reply.clone();
        }
        let queued = self
            .queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        queued.unwrap_or_else(|| self.fallback.clone())
    }

    fn model_name(&self) -> &str {
        &self.name
    }

    async fn ping(&self) -> Result<(), ModelError> {
        if self.offline {
            return Err(ModelError::Connection {
                message: "model service offline".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fallback_reply() {
        let model = MockModel::with_response("llama3.2", "Paris.");
        assert_eq!(model.generate("capital?").await.unwrap(), "Paris.");
        assert_eq!(model.generate("again?").await.unwrap(), "Paris.");
        assert_eq!(model.call_count(), 2);
        assert_eq!(model.model_name(), "llama3.2");
    }

    #[tokio::test]
    async fn test_queue_before_fallback() {
        let model = MockModel::with_response("m", "later");
        model.queue_reply(Ok("first".into()));
        assert_eq!(model.generate("a").await.unwrap(), "first");
        assert_eq!(model.generate("b").await.unwrap(), "later");
    }

    #[tokio::test]
    async fn test_rules_take_precedence() {
        let model = MockModel::with_response("judge", "0.5")
            .when_prompt_contains("supported by the provided context", Ok("0.9".into()))
            .when_prompt_contains(
                "retrieved context",
                Err(ModelError::Timeout { timeout_secs: 1 }),
            );
        model.queue_reply(Ok("queued".into()));

        let faithfulness = model
            .generate("Rate how well the answer is supported by the provided context.")
            .await;
        assert_eq!(faithfulness.unwrap(), "0.9");
        assert!(model.generate("You are evaluating retrieved context.").await.is_err());
        assert_eq!(model.generate("anything else").await.unwrap(), "queued");
        assert_eq!(model.prompts().len(), 3);
    }

    #[tokio::test]
    async fn test_offline_ping() {
        assert!(MockModel::new("m").ping().await.is_ok());
        assert!(MockModel::new("m").offline().ping().await.is_err());
    }

    #[tokio::test]
    async fn test_failing_model() {
        let model = MockModel::failing(
            "llama3.2",
            ModelError::Connection {
                message: "connection refused".into(),
            },
        );
        let err = model.generate("hi").await.unwrap_err();
        assert!(err.to_string().contains("connection refused"));
    }
}
