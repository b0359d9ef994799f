//! # ragscope-ml: retrieval pipelines with judge-model evaluation
//!
//! Every query is answered from retrieved context, scored by a judge model on
//! three metrics, and recorded as one experiment run.
//!
//! - [`rag`]: chunking, document loading, ingestion, prompts, judge, query pipeline
//! - [`services`]: the container that wires adapters into pipelines
//! - [`health`]: bounded liveness probes
//! - [`gateway`]: the axum HTTP surface

pub mod gateway;
pub mod health;
pub mod rag;
pub mod services;

pub use gateway::{ApiError, gateway_router, run_gateway};
pub use health::{HealthReport, check_health};
pub use rag::{IngestPipeline, IngestReport, Judge, JudgeMetric, Query, QueryAnswer, QueryPipeline};
pub use services::{Adapters, RagServices};
