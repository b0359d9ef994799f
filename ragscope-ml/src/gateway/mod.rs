//! # HTTP Gateway
//!
//! REST surface over the service container:
//!
//! - `POST /ingest`: multipart upload of a `.pdf` or `.txt` file
//! - `POST /query`: `{question, top_k}` to `{answer, sources, query_id}`
//! - `GET /health`: dependency liveness
//!
//! Failures are returned as `{"detail": "<message>"}`.

mod error;
mod server;

pub use error::ApiError;
pub use server::{
    QueryRequest, QueryResponse, SharedServices, router as gateway_router, run as run_gateway,
};
