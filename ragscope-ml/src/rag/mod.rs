//! Retrieval-augmented generation: ingestion, answering, and judge scoring.

pub mod chunk;
pub mod context;
pub mod ingest;
pub mod judge;
pub mod loader;
pub mod pipeline;
pub mod prompts;
pub mod run;

pub use chunk::{RecursiveSplitter, TextChunk};
pub use ingest::{IngestPipeline, IngestReport};
pub use judge::{Judge, JudgeMetric, JudgeScore, JudgeScores, UNSCOREABLE, parse_score};
pub use loader::{DocumentKind, LoadedDocument, load_document};
pub use pipeline::{Query, QueryAnswer, QueryPipeline};
pub use run::ActiveRun;
