//! Query-evaluation pipeline.
//!
//! One call to [`QueryPipeline::answer`] retrieves context, generates an
//! answer, has the judge score it, and records the whole exchange as a single
//! experiment run. The run is closed on every exit path.

use ragscope_core::embeddings::Embedder;
use ragscope_core::error::RagError;
use ragscope_core::models::ModelAdapter;
use ragscope_core::store::{RetrievedChunk, VectorStore};
use ragscope_core::tracking::{ExperimentRecorder, RunStatus};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::rag::context::build_context;
use crate::rag::judge::Judge;
use crate::rag::prompts::answer_prompt;
use crate::rag::run::{ActiveRun, default_run_name};

const EMPTY_COLLECTION_MESSAGE: &str = "No documents found. Please ingest documents first.";

/// A validated question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub question: String,
    pub top_k: usize,
}

impl Query {
    pub fn new(question: impl Into<String>, top_k: usize) -> Result<Self, RagError> {
        let question = question.into();
        if question.trim().is_empty() {
            return Err(RagError::invalid_input("question must not be empty"));
        }
        if top_k == 0 {
            return Err(RagError::invalid_input("top_k must be at least 1"));
        }
        Ok(Self { question, top_k })
    }
}

/// The result of a successful query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryAnswer {
    pub answer: String,
    /// Retrieved chunk texts, most relevant first.
    pub sources: Vec<String>,
    pub query_id: String,
    pub run_id: String,
    /// Judge metric key to score.
    pub scores: BTreeMap<String, f64>,
    pub latency_ms: f64,
}

/// Retrieval and generation for one query, successful or not.
struct Attempt {
    chunks: Vec<RetrievedChunk>,
    context: String,
    answer: Result<String, RagError>,
    /// `None` when the query failed before retrieval started.
    latency_ms: Option<f64>,
}

pub struct QueryPipeline {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    generator: Arc<dyn ModelAdapter>,
    judge: Judge,
    recorder: Arc<dyn ExperimentRecorder>,
    collection: String,
    answer_language: Option<String>,
}

impl QueryPipeline {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        generator: Arc<dyn ModelAdapter>,
        judge_model: Arc<dyn ModelAdapter>,
        recorder: Arc<dyn ExperimentRecorder>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            embedder,
            store,
            generator,
            judge: Judge::new(judge_model),
            recorder,
            collection: collection.into(),
            answer_language: None,
        }
    }

    /// Ask the generation model to answer in `language`.
    pub fn with_answer_language(mut self, language: Option<String>) -> Self {
        self.answer_language = language;
        self
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Answer `query` and record the run.
    ///
    /// # Errors
    ///
    /// - `DependencyUnavailable` when no run can be opened.
    /// - `NotFound` when the collection is empty; the model is not called.
    /// - `Internal` carrying the `"Error: ..."` answer when retrieval or
    ///   generation failed.
    pub async fn answer(&self, query: Query) -> Result<QueryAnswer, RagError> {
        let query_id = uuid::Uuid::new_v4().to_string();
        let run = ActiveRun::open(self.recorder.clone(), &default_run_name()).await?;
        run.tag("query_id", &query_id).await;

        let attempt = match self.store.count(&self.collection).await {
            Ok(0) => {
                run.tag("empty_collection", "true").await;
                run.param("question", &query.question).await;
                run.param("top_k", &query.top_k.to_string()).await;
                run.close(RunStatus::Failed).await;
                info!(query_id = %query_id, collection = %self.collection, "Query against empty collection");
                return Err(RagError::not_found(EMPTY_COLLECTION_MESSAGE));
            }
            Ok(_) => self.attempt(&query).await,
            Err(e) => Attempt {
                chunks: Vec::new(),
                context: String::new(),
                answer: Err(e.into()),
                latency_ms: None,
            },
        };

        let (answer_text, failure) = match &attempt.answer {
            Ok(text) => (text.clone(), None),
            Err(e) => (format!("Error: {e}"), Some(e.clone())),
        };

        let scores = if failure.is_none() {
            Some(
                self.judge
                    .score_all(&query.question, &answer_text, &attempt.context)
                    .await,
            )
        } else {
            None
        };

        run.param("question", &query.question).await;
        run.param("top_k", &query.top_k.to_string()).await;
        run.param("query_id", &query_id).await;
        run.param("collection", &self.collection).await;
        run.param("generation_model", self.generator.model_name()).await;
        run.param("judge_model", self.judge.model_name()).await;
        run.tag("generation_model", self.generator.model_name()).await;
        run.tag("judge_model", self.judge.model_name()).await;
        if let Some(e) = &failure {
            run.tag("error", "true").await;
            run.tag("error_message", &e.to_string()).await;
        }

        if let Some(latency_ms) = attempt.latency_ms {
            run.metric("latency_ms", latency_ms).await;
        }
        run.metric("num_chunks_retrieved", attempt.chunks.len() as f64).await;
        run.metric("answer_length_chars", answer_text.chars().count() as f64)
            .await;

        run.artifact("answer.txt", &answer_text).await;
        match serde_json::to_string_pretty(&attempt.chunks) {
            Ok(json) => run.artifact("sources.json", &json).await,
            Err(e) => warn!(error = %e, "Failed to serialize sources"),
        }

        if let Some(scores) = &scores {
            for score in scores.iter() {
                run.metric(score.metric.key(), score.value).await;
                if score.is_unscoreable() {
                    run.tag(&score.metric.warning_tag(), "true").await;
                }
            }
        }

        let run_id = run.run_id().to_string();
        let status = if failure.is_some() {
            RunStatus::Failed
        } else {
            RunStatus::Finished
        };
        run.close(status).await;

        if let Some(e) = failure {
            warn!(query_id = %query_id, run_id = %run_id, error = %e, "Query failed");
            return Err(RagError::internal(answer_text));
        }

        info!(
            query_id = %query_id,
            run_id = %run_id,
            latency_ms = attempt.latency_ms.unwrap_or_default(),
            num_chunks = attempt.chunks.len(),
            "Query answered"
        );
        Ok(QueryAnswer {
            answer: answer_text,
            sources: attempt.chunks.into_iter().map(|c| c.text).collect(),
            query_id,
            run_id,
            scores: scores.map(|s| s.to_map()).unwrap_or_default(),
            latency_ms: attempt.latency_ms.unwrap_or_default(),
        })
    }

    /// Retrieve and generate, timing both.
    async fn attempt(&self, query: &Query) -> Attempt {
        let started = Instant::now();
        let (chunks, context, answer) = match self.retrieve(query).await {
            Ok(chunks) => {
                let context = build_context(&chunks);
                let prompt =
                    answer_prompt(&context, &query.question, self.answer_language.as_deref());
                let answer = self
                    .generator
                    .generate(&prompt)
                    .await
                    .map_err(RagError::from);
                (chunks, context, answer)
            }
            Err(e) => (Vec::new(), String::new(), Err(e)),
        };
        Attempt {
            chunks,
            context,
            answer,
            latency_ms: Some(started.elapsed().as_secs_f64() * 1000.0),
        }
    }

    async fn retrieve(&self, query: &Query) -> Result<Vec<RetrievedChunk>, RagError> {
        let vector = self.embedder.embed(&query.question).await?;
        Ok(self
            .store
            .search(&self.collection, &vector, query.top_k)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_validation() {
        assert!(Query::new("What is the capital of France?", 4).is_ok());
        assert!(matches!(
            Query::new("   ", 4),
            Err(RagError::InvalidInput { .. })
        ));
        assert!(matches!(
            Query::new("q", 0),
            Err(RagError::InvalidInput { .. })
        ));
    }
}
