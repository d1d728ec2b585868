//! Request/response types.

pub mod generate;
pub mod streaming;

pub use generate::{GenerateRequest, GenerateResponse};
pub use streaming::GenerateStreamChunk;
