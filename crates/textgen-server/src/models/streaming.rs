//! Server-Sent Events (SSE) payload types.

use serde::{Deserialize, Serialize};
use textgen_engine::GenerateChunk;

/// One SSE `data:` payload of `/v1/generate/stream`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateStreamChunk {
    pub token_text: String,
    pub finished: bool,
}

impl From<GenerateChunk> for GenerateStreamChunk {
    fn from(chunk: GenerateChunk) -> Self {
        Self {
            token_text: chunk.text,
            finished: chunk.finished,
        }
    }
}
