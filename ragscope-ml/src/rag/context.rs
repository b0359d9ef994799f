//! Context assembly for answer generation.

use ragscope_core::store::RetrievedChunk;

const CHUNK_SEPARATOR: &str = "\n\n";

/// Join chunk texts in retrieval order, separated by a blank line.
pub fn build_context(chunks: &[RetrievedChunk]) -> String {
    chunks
        .iter()
        .map(|c| c.text.as_str())
        .collect::<Vec<_>>()
        .join(CHUNK_SEPARATOR)
}
