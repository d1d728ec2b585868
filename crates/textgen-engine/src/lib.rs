//! # textgen-engine
//!
//! The "narrow waist" of the textgen stack. Defines the [`GenerationEngine`]
//! trait the serving layer talks to, the request/result types, and the two
//! engines behind it:
//!
//! - [`EchoEngine`]: deterministic echo, no model required. Used for
//!   integration testing of the serving path.
//! - [`ModelEngine`]: autoregressive generation over any [`TokenModel`],
//!   with per-session token history and incremental state.
//!
//! ## Design Notes
//!
//! ### One lock, one model
//! `GenerationEngine` methods take `&self` so a single engine can sit behind an
//! `Arc` and serve many requests. [`ModelEngine`] keeps the loaded model and its
//! [`SessionStore`] behind one `Mutex`: session lookup and every model call of a
//! request happen under that lock. Forward passes on one loaded model are not
//! assumed to tolerate concurrent callers.
//!
//! ### Token Type
//! `TokenId` is aliased as `i32` for FFI compatibility, though token IDs are
//! logically non-negative.

pub mod capability;
pub mod echo;
pub mod model;
pub mod session;
pub mod telemetry;

pub use capability::{Batch, BufferFill, CapabilityError, ContextParams, ModelParams, TokenModel};
pub use echo::EchoEngine;
pub use model::{ModelEngine, ModelOptions};
pub use session::{Session, SessionStore, DEFAULT_SESSION_KEY};
pub use telemetry::{GenerationMetrics, NoopTelemetry, RecordingTelemetry, RequestTimer, TelemetryHook, TracingTelemetry};

pub type Result<T> = std::result::Result<T, EngineError>;

/// Token ID type (i32 for FFI compat; logically non-negative).
pub type TokenId = i32;

/// Completion budget used when a request asks for zero tokens.
pub const DEFAULT_MAX_TOKENS: u32 = 128;

/// Top-level error type for all engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Missing or invalid configuration, or the model failed to load.
    /// Raised at construction; the engine never comes into existence.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// A request failed part-way. Session state evaluated before the failure
    /// is kept; the engine stays usable.
    #[error("runtime error: {0}")]
    Runtime(String),
}

/// Per-request sampling parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingParams {
    /// Completion budget. `0` resolves to [`DEFAULT_MAX_TOKENS`].
    pub max_tokens: u32,
    /// Accepted but not applied; selection is greedy.
    pub temperature: f32,
    /// Accepted but not applied; selection is greedy.
    pub top_k: u32,
    /// Keep generating past the end-of-sequence token.
    pub ignore_eos: bool,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: 0.0,
            top_k: 1,
            ignore_eos: false,
        }
    }
}

impl SamplingParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_tokens(mut self, n: u32) -> Self {
        self.max_tokens = n;
        self
    }

    pub fn with_temperature(mut self, t: f32) -> Self {
        self.temperature = t;
        self
    }

    pub fn with_top_k(mut self, k: u32) -> Self {
        self.top_k = k;
        self
    }

    pub fn with_ignore_eos(mut self, ignore: bool) -> Self {
        self.ignore_eos = ignore;
        self
    }

    /// The number of decode steps this request may take.
    pub fn resolved_max_tokens(&self) -> usize {
        if self.max_tokens == 0 {
            DEFAULT_MAX_TOKENS as usize
        } else {
            self.max_tokens as usize
        }
    }

    /// Whether the request asked for anything other than greedy selection.
    pub fn requests_stochastic(&self) -> bool {
        self.temperature > 0.0 || self.top_k > 1
    }
}

/// Outcome of one generation request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GenerateResult {
    pub text: String,
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
}

/// A piece of streamed output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateChunk {
    pub text: String,
    /// Set on the last chunk of a stream.
    pub finished: bool,
}

/// The engine trait the serving layer depends on.
pub trait GenerationEngine: Send + Sync {
    /// Short backend name for logs and health reporting.
    fn name(&self) -> &str;

    /// Run one request to completion.
    ///
    /// Blocks the caller for the whole tokenize/decode/sample sequence.
    fn generate(
        &self,
        model: &str,
        prompt: &str,
        params: &SamplingParams,
        session_id: &str,
    ) -> Result<GenerateResult>;

    /// Run one request, handing output to `sink` as chunks.
    ///
    /// The default generates the full result, then emits it as a single
    /// chunk marked `finished`.
    fn generate_stream(
        &self,
        model: &str,
        prompt: &str,
        params: &SamplingParams,
        session_id: &str,
        sink: &mut dyn FnMut(GenerateChunk),
    ) -> Result<GenerateResult> {
        let result = self.generate(model, prompt, params, session_id)?;
        sink(GenerateChunk {
            text: result.text.clone(),
            finished: true,
        });
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sampling_params_defaults() {
        let p = SamplingParams::default();
        assert_eq!(p.max_tokens, 128);
        assert_eq!(p.temperature, 0.0);
        assert_eq!(p.top_k, 1);
        assert!(!p.ignore_eos);
        assert!(!p.requests_stochastic());
    }

    #[test]
    fn zero_max_tokens_resolves_to_default() {
        let p = SamplingParams::new().with_max_tokens(0);
        assert_eq!(p.resolved_max_tokens(), 128);
        assert_eq!(p.with_max_tokens(7).resolved_max_tokens(), 7);
    }

    #[test]
    fn stochastic_fields_are_detected() {
        assert!(SamplingParams::new().with_temperature(0.8).requests_stochastic());
        assert!(SamplingParams::new().with_top_k(40).requests_stochastic());
    }

    #[test]
    fn engine_error_display() {
        let err = EngineError::Configuration("model path is empty".into());
        assert_eq!(err.to_string(), "configuration error: model path is empty");
        let err = EngineError::Runtime("decode failed".into());
        assert_eq!(err.to_string(), "runtime error: decode failed");
    }
}
