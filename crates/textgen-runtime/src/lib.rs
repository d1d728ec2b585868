//! # textgen-runtime
//!
//! Runtime backend selection for textgen. Turns an [`EngineConfig`] into a
//! ready [`GenerationEngine`](textgen_engine::GenerationEngine), and ships
//! [`BigramModel`], the byte-level token model the `model` backend loads.

pub mod backend;
pub mod bigram;

pub use backend::{build_engine, Backend, BackendError, EngineConfig};
pub use bigram::{BigramContext, BigramModel, BOS_TOKEN, EOS_TOKEN, N_VOCAB};
