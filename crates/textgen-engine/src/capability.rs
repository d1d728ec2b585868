//! The token-model capability the model-backed engine drives.
//!
//! A [`TokenModel`] owns loaded weights and a vocabulary. Everything that
//! changes per conversation lives in its [`TokenModel::Context`]: the
//! incremental cache and the logits of the last evaluated batch. Dropping a
//! context releases it.

use std::path::Path;

use crate::TokenId;

/// Errors reported by a token model.
#[derive(Debug, thiserror::Error)]
pub enum CapabilityError {
    #[error("model load failed: {0}")]
    Load(String),
    #[error("context creation failed: {0}")]
    Context(String),
    #[error("decode failed: {0}")]
    Decode(String),
}

/// Result of writing into a caller-supplied buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferFill {
    /// `n` elements were written at the start of the buffer.
    Written(usize),
    /// The buffer was too small; `n` elements are required.
    NeedsCapacity(usize),
}

/// Load-time parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelParams {
    /// Layers to offload to a GPU. `None` keeps the model's default.
    pub n_gpu_layers: Option<u32>,
}

/// Parameters for a new incremental context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextParams {
    /// Context window, in tokens.
    pub n_ctx: usize,
    /// `None` keeps the model's default thread count.
    pub n_threads: Option<usize>,
    /// `None` keeps the model's default seed.
    pub seed: Option<u32>,
}

impl Default for ContextParams {
    fn default() -> Self {
        Self {
            n_ctx: 4096,
            n_threads: None,
            seed: None,
        }
    }
}

/// One forward pass worth of tokens.
///
/// Each entry carries its absolute position and whether logits are wanted
/// for it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    pub tokens: Vec<TokenId>,
    pub positions: Vec<usize>,
    pub logits: Vec<bool>,
}

impl Batch {
    /// Lay out `tokens` after `start`, requesting logits for the last one only.
    pub fn for_continuation(tokens: &[TokenId], start: usize) -> Self {
        let n = tokens.len();
        Self {
            tokens: tokens.to_vec(),
            positions: (start..start + n).collect(),
            logits: (0..n).map(|i| i + 1 == n).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// An autoregressive token model.
///
/// Methods other than [`TokenModel::load`] are only ever called while the
/// owning engine holds its lock, so implementations need not be `Sync`.
pub trait TokenModel: Send + Sized {
    /// Per-session incremental state.
    type Context: Send;

    /// Load weights from `path`.
    fn load(path: &Path, params: &ModelParams) -> Result<Self, CapabilityError>;

    /// Allocate a fresh, empty incremental context.
    fn new_context(&self, params: &ContextParams) -> Result<Self::Context, CapabilityError>;

    /// Tokenize `text` into `buf`, prefixed with the beginning-of-sequence
    /// token when `add_bos` is set.
    fn tokenize(&self, text: &str, add_bos: bool, buf: &mut [TokenId]) -> BufferFill;

    /// Write the text bytes of `token` into `buf`. Control tokens write nothing.
    fn token_to_piece(&self, token: TokenId, buf: &mut [u8]) -> BufferFill;

    /// Extend `ctx` with `batch`.
    fn decode(&self, ctx: &mut Self::Context, batch: &Batch) -> Result<(), CapabilityError>;

    /// Logits of the last position that requested them.
    fn logits<'a>(&self, ctx: &'a Self::Context) -> &'a [f32];

    /// Number of tokens held in `ctx`'s cache.
    fn cache_len(&self, ctx: &Self::Context) -> usize;

    /// End-of-sequence token.
    fn eos(&self) -> TokenId;

    fn n_vocab(&self) -> usize;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn continuation_batch_positions_follow_cache() {
        let batch = Batch::for_continuation(&[10, 11, 12], 5);
        assert_eq!(batch.positions, vec![5, 6, 7]);
        assert_eq!(batch.logits, vec![false, false, true]);
        assert_eq!(batch.len(), 3);
    }

    #[test]
    fn single_token_batch_requests_logits() {
        let batch = Batch::for_continuation(&[42], 0);
        assert_eq!(batch.positions, vec![0]);
        assert_eq!(batch.logits, vec![true]);
    }

    #[test]
    fn empty_batch() {
        let batch = Batch::for_continuation(&[], 9);
        assert!(batch.is_empty());
        assert!(batch.positions.is_empty());
    }

    #[test]
    fn context_params_default_window() {
        let params = ContextParams::default();
        assert_eq!(params.n_ctx, 4096);
        assert_eq!(params.n_threads, None);
        assert_eq!(params.seed, None);
    }
}
