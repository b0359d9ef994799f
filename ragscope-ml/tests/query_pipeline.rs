//! End-to-end tests for the query-evaluation pipeline with in-process adapters.

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use ragscope_core::embeddings::{Embedder, LocalEmbedder};
use ragscope_core::error::{ModelError, RagError, StoreError};
use ragscope_core::models::MockModel;
use ragscope_core::store::{ChunkRecord, MemoryStore, RetrievedChunk, VectorStore};
use ragscope_core::tracking::{MemoryRecorder, RunStatus};
use ragscope_ml::rag::{IngestPipeline, Query, QueryPipeline, RecursiveSplitter};
use std::sync::Arc;
use std::time::Duration;

const COLLECTION: &str = "documents";
const FAITHFULNESS: &str = "supported by the provided context";
const ANSWER_RELEVANCE: &str = "addresses the question asked";
const CONTEXT_RELEVANCE: &str = "relevant the retrieved context";

struct Fixture {
    store: Arc<MemoryStore>,
    generator: Arc<MockModel>,
    judge: Arc<MockModel>,
    recorder: Arc<MemoryRecorder>,
    ingest: IngestPipeline,
    pipeline: QueryPipeline,
}

fn fixture(generator: MockModel, judge: MockModel, recorder: MemoryRecorder) -> Fixture {
    let embedder = Arc::new(LocalEmbedder::new(1024));
    let store = Arc::new(MemoryStore::new());
    let generator = Arc::new(generator);
    let judge = Arc::new(judge);
    let recorder = Arc::new(recorder);
    let ingest = IngestPipeline::new(
        embedder.clone(),
        store.clone(),
        RecursiveSplitter::default(),
        COLLECTION,
    );
    let pipeline = QueryPipeline::new(
        embedder,
        store.clone(),
        generator.clone(),
        judge.clone(),
        recorder.clone(),
        COLLECTION,
    );
    Fixture {
        store,
        generator,
        judge,
        recorder,
        ingest,
        pipeline,
    }
}

fn default_fixture() -> Fixture {
    fixture(
        MockModel::with_response("llama3.2", "Paris"),
        MockModel::with_response("mistral", "0.9"),
        MemoryRecorder::new("rag-evaluation"),
    )
}

async fn ingest_text(fx: &Fixture, filename: &str, text: &str) {
    fx.ingest
        .ingest(filename, text.as_bytes().to_vec())
        .await
        .unwrap();
}

async fn seed(fx: &Fixture) {
    ingest_text(fx, "france.txt", "Paris is the capital of France.").await;
    ingest_text(fx, "germany.txt", "Berlin is the capital of Germany.").await;
    ingest_text(fx, "rivers.txt", "The Nile is a long river in Africa.").await;
}

#[tokio::test]
async fn test_answer_records_one_finished_run() {
    let fx = default_fixture();
    seed(&fx).await;

    let answer = fx
        .pipeline
        .answer(Query::new("What is the capital of France?", 2).unwrap())
        .await
        .unwrap();

    assert_eq!(answer.answer, "Paris");
    assert_eq!(answer.sources.len(), 2);
    assert_eq!(answer.sources[0], "Paris is the capital of France.");

    let runs = fx.recorder.runs();
    assert_eq!(runs.len(), 1);
    let run = &runs[0];
    assert_eq!(run.run_id, answer.run_id);
    assert_eq!(run.status, RunStatus::Finished);
    assert!(run.end_time.is_some());
    assert_eq!(fx.recorder.close_calls(&run.run_id), 1);

    assert_eq!(run.params["question"], "What is the capital of France?");
    assert_eq!(run.params["top_k"], "2");
    assert_eq!(run.params["query_id"], answer.query_id);
    assert_eq!(run.params["collection"], COLLECTION);
    assert_eq!(run.params["generation_model"], "llama3.2");
    assert_eq!(run.params["judge_model"], "mistral");
    assert_eq!(run.tags["query_id"], answer.query_id);

    assert_eq!(run.metrics["num_chunks_retrieved"], 2.0);
    assert_eq!(run.metrics["answer_length_chars"], 5.0);
    assert!(run.metrics["latency_ms"] >= 0.0);
    for key in ["faithfulness_score", "answer_relevance_score", "context_relevance_score"] {
        assert_eq!(run.metrics[key], 0.9, "{key}");
        assert_eq!(answer.scores[key], 0.9, "{key}");
    }

    assert_eq!(run.artifacts["answer.txt"], "Paris");
    assert!(run.artifacts["sources.json"].contains("france.txt"));
    assert!(!run.tags.contains_key("error"));
}

#[tokio::test]
async fn test_context_preserves_retrieval_order() {
    let fx = default_fixture();
    seed(&fx).await;

    let answer = fx
        .pipeline
        .answer(Query::new("What is the capital of France?", 3).unwrap())
        .await
        .unwrap();

    let prompts = fx.generator.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains(&answer.sources.join("\n\n")));
    assert!(prompts[0].contains("Question: What is the capital of France?"));
}

#[tokio::test]
async fn test_empty_collection_is_not_found_without_generation() {
    let fx = default_fixture();

    let err = fx
        .pipeline
        .answer(Query::new("anything?", 4).unwrap())
        .await
        .unwrap_err();

    assert_eq!(
        err,
        RagError::not_found("No documents found. Please ingest documents first.")
    );
    assert_eq!(fx.generator.call_count(), 0);
    assert_eq!(fx.judge.call_count(), 0);

    let runs = fx.recorder.runs();
    assert_eq!(runs.len(), 1);
    let run = &runs[0];
    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(fx.recorder.close_calls(&run.run_id), 1);
    assert_eq!(run.tags["empty_collection"], "true");
    assert_eq!(run.params["question"], "anything?");
    assert!(!run.metrics.contains_key("latency_ms"));
}

#[tokio::test]
async fn test_unparseable_judge_metric_is_isolated() {
    let judge = MockModel::new("mistral")
        .when_prompt_contains(FAITHFULNESS, Ok("I think it's good".to_string()))
        .when_prompt_contains(ANSWER_RELEVANCE, Ok("0.8".to_string()))
        .when_prompt_contains(CONTEXT_RELEVANCE, Ok("Score: 0.6".to_string()));
    let fx = fixture(
        MockModel::with_response("llama3.2", "Paris"),
        judge,
        MemoryRecorder::new("rag-evaluation"),
    );
    seed(&fx).await;

    let answer = fx
        .pipeline
        .answer(Query::new("What is the capital of France?", 2).unwrap())
        .await
        .unwrap();

    assert_eq!(answer.scores["faithfulness_score"], -1.0);
    assert_eq!(answer.scores["answer_relevance_score"], 0.8);
    assert_eq!(answer.scores["context_relevance_score"], 0.6);

    let run = fx.recorder.run(&answer.run_id).unwrap();
    assert_eq!(run.status, RunStatus::Finished);
    assert_eq!(run.metrics["faithfulness_score"], -1.0);
    assert_eq!(run.tags["faithfulness_score_parse_warning"], "true");
    assert!(!run.tags.contains_key("answer_relevance_score_parse_warning"));
}

#[tokio::test]
async fn test_judge_call_failure_is_isolated() {
    let judge = MockModel::with_response("mistral", "0.7").when_prompt_contains(
        CONTEXT_RELEVANCE,
        Err(ModelError::Timeout { timeout_secs: 30 }),
    );
    let fx = fixture(
        MockModel::with_response("llama3.2", "Paris"),
        judge,
        MemoryRecorder::new("rag-evaluation"),
    );
    seed(&fx).await;

    let answer = fx
        .pipeline
        .answer(Query::new("What is the capital of France?", 1).unwrap())
        .await
        .unwrap();

    assert_eq!(answer.scores["context_relevance_score"], -1.0);
    assert_eq!(answer.scores["faithfulness_score"], 0.7);
    assert_eq!(fx.judge.call_count(), 3);
}

#[tokio::test]
async fn test_generation_failure_closes_failed_run_without_judging() {
    let fx = fixture(
        MockModel::failing(
            "llama3.2",
            ModelError::ApiRequest {
                message: "boom".into(),
            },
        ),
        MockModel::with_response("mistral", "0.9"),
        MemoryRecorder::new("rag-evaluation"),
    );
    seed(&fx).await;

    let err = fx
        .pipeline
        .answer(Query::new("What is the capital of France?", 2).unwrap())
        .await
        .unwrap_err();

    let RagError::Internal { message } = err else {
        panic!("expected Internal, got {err:?}");
    };
    assert_eq!(message, "Error: API request failed: boom");
    assert_eq!(fx.judge.call_count(), 0);

    let runs = fx.recorder.runs();
    assert_eq!(runs.len(), 1);
    let run = &runs[0];
    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(fx.recorder.close_calls(&run.run_id), 1);
    assert_eq!(run.tags["error"], "true");
    assert_eq!(run.tags["error_message"], "API request failed: boom");
    assert_eq!(run.artifacts["answer.txt"], "Error: API request failed: boom");
    assert!(run.metrics.contains_key("latency_ms"));
    assert!(!run.metrics.contains_key("faithfulness_score"));
}

#[tokio::test]
async fn test_unreachable_recorder_rejects_query() {
    let fx = fixture(
        MockModel::with_response("llama3.2", "Paris"),
        MockModel::with_response("mistral", "0.9"),
        MemoryRecorder::unreachable("rag-evaluation"),
    );
    seed(&fx).await;

    let err = fx
        .pipeline
        .answer(Query::new("What is the capital of France?", 2).unwrap())
        .await
        .unwrap_err();

    assert!(matches!(err, RagError::DependencyUnavailable { .. }), "{err:?}");
    assert_eq!(fx.generator.call_count(), 0);
}

#[tokio::test]
async fn test_rejected_writes_do_not_fail_query() {
    let fx = fixture(
        MockModel::with_response("llama3.2", "Paris"),
        MockModel::with_response("mistral", "0.9"),
        MemoryRecorder::rejecting_writes("rag-evaluation"),
    );
    seed(&fx).await;

    let answer = fx
        .pipeline
        .answer(Query::new("What is the capital of France?", 2).unwrap())
        .await
        .unwrap();

    assert_eq!(answer.answer, "Paris");
    let run = fx.recorder.run(&answer.run_id).unwrap();
    assert_eq!(run.status, RunStatus::Finished);
    assert!(run.metrics.is_empty());
}

#[tokio::test]
async fn test_latency_includes_generation_time() {
    let fx = fixture(
        MockModel::with_response("llama3.2", "Paris").with_delay(Duration::from_millis(60)),
        MockModel::with_response("mistral", "0.9"),
        MemoryRecorder::new("rag-evaluation"),
    );
    seed(&fx).await;

    let answer = fx
        .pipeline
        .answer(Query::new("What is the capital of France?", 1).unwrap())
        .await
        .unwrap();

    assert!(answer.latency_ms >= 60.0, "latency {}", answer.latency_ms);
    let run = fx.recorder.run(&answer.run_id).unwrap();
    assert_eq!(run.metrics["latency_ms"], answer.latency_ms);
}

#[tokio::test]
async fn test_concurrent_queries_get_distinct_runs() {
    let fx = default_fixture();
    seed(&fx).await;

    let (a, b) = tokio::join!(
        fx.pipeline
            .answer(Query::new("What is the capital of France?", 1).unwrap()),
        fx.pipeline
            .answer(Query::new("Which river is in Africa?", 1).unwrap()),
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_ne!(a.run_id, b.run_id);
    assert_ne!(a.query_id, b.query_id);
    assert_eq!(fx.recorder.runs().len(), 2);
    for run in fx.recorder.runs() {
        assert_eq!(run.status, RunStatus::Finished);
        assert_eq!(fx.recorder.close_calls(&run.run_id), 1);
    }
}

#[tokio::test]
async fn test_top_k_larger_than_collection() {
    let fx = default_fixture();
    ingest_text(&fx, "france.txt", "Paris is the capital of France.").await;
    assert_eq!(fx.store.count(COLLECTION).await.unwrap(), 1);

    let answer = fx
        .pipeline
        .answer(Query::new("What is the capital of France?", 10).unwrap())
        .await
        .unwrap();

    assert_eq!(answer.sources, vec!["Paris is the capital of France.".to_string()]);
}

/// Store whose `count` always fails; everything else goes to memory.
struct CountFailingStore {
    inner: MemoryStore,
}

#[async_trait]
impl VectorStore for CountFailingStore {
    async fn upsert(
        &self,
        collection: &str,
        records: Vec<ChunkRecord>,
    ) -> Result<usize, StoreError> {
        self.inner.upsert(collection, records).await
    }

    async fn count(&self, _collection: &str) -> Result<usize, StoreError> {
        Err(StoreError::Task {
            message: "database is locked".into(),
        })
    }

    async fn search(
        &self,
        collection: &str,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<RetrievedChunk>, StoreError> {
        self.inner.search(collection, query, k).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn backend_name(&self) -> &str {
        "count-failing"
    }
}

/// Embeds document batches but fails on single (query) texts.
struct QueryFailingEmbedder {
    inner: LocalEmbedder,
}

#[async_trait]
impl Embedder for QueryFailingEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, ModelError> {
        Err(ModelError::ApiRequest {
            message: "embedding model not loaded".into(),
        })
    }

    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ModelError> {
        self.inner.embed_many(texts).await
    }

    fn provider_name(&self) -> &str {
        "query-failing"
    }
}

struct FailureFixture {
    generator: Arc<MockModel>,
    judge: Arc<MockModel>,
    recorder: Arc<MemoryRecorder>,
    ingest: IngestPipeline,
    pipeline: QueryPipeline,
}

fn failure_fixture(embedder: Arc<dyn Embedder>, store: Arc<dyn VectorStore>) -> FailureFixture {
    let generator = Arc::new(MockModel::with_response("llama3.2", "Paris"));
    let judge = Arc::new(MockModel::with_response("mistral", "0.9"));
    let recorder = Arc::new(MemoryRecorder::new("rag-evaluation"));
    let ingest = IngestPipeline::new(
        embedder.clone(),
        store.clone(),
        RecursiveSplitter::default(),
        COLLECTION,
    );
    let pipeline = QueryPipeline::new(
        embedder,
        store,
        generator.clone(),
        judge.clone(),
        recorder.clone(),
        COLLECTION,
    );
    FailureFixture {
        generator,
        judge,
        recorder,
        ingest,
        pipeline,
    }
}

/// Asserts the single recorded run failed before generation and returns its message.
async fn assert_failed_before_generation(fx: &FailureFixture) -> String {
    fx.ingest
        .ingest("france.txt", b"Paris is the capital of France.".to_vec())
        .await
        .unwrap();

    let err = fx
        .pipeline
        .answer(Query::new("What is the capital of France?", 2).unwrap())
        .await
        .unwrap_err();
    let RagError::Internal { message } = err else {
        panic!("expected Internal, got {err:?}");
    };
    assert!(message.starts_with("Error: "), "{message}");
    assert_eq!(fx.generator.call_count(), 0);
    assert_eq!(fx.judge.call_count(), 0);

    let runs = fx.recorder.runs();
    assert_eq!(runs.len(), 1);
    let run = &runs[0];
    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(fx.recorder.close_calls(&run.run_id), 1);
    assert_eq!(run.tags["error"], "true");
    assert_eq!(run.artifacts["answer.txt"], message);
    assert_eq!(run.metrics["num_chunks_retrieved"], 0.0);
    assert!(!run.metrics.contains_key("faithfulness_score"));
    message
}

#[tokio::test]
async fn test_count_failure_closes_failed_run() {
    let fx = failure_fixture(
        Arc::new(LocalEmbedder::new(1024)),
        Arc::new(CountFailingStore {
            inner: MemoryStore::new(),
        }),
    );

    let message = assert_failed_before_generation(&fx).await;
    assert!(message.contains("database is locked"));

    let run = &fx.recorder.runs()[0];
    assert!(!run.metrics.contains_key("latency_ms"));
    assert!(!run.tags.contains_key("empty_collection"));
}

#[tokio::test]
async fn test_query_embedding_failure_closes_failed_run() {
    let fx = failure_fixture(
        Arc::new(QueryFailingEmbedder {
            inner: LocalEmbedder::new(1024),
        }),
        Arc::new(MemoryStore::new()),
    );

    let message = assert_failed_before_generation(&fx).await;
    assert_eq!(message, "Error: API request failed: embedding model not loaded");

    let run = &fx.recorder.runs()[0];
    assert!(run.metrics.contains_key("latency_ms"));
}
