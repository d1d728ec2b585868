//! Model-backed generation.
//!
//! [`ModelEngine`] drives a [`TokenModel`] through the per-request cycle:
//!
//! 1. Resolve (or create) the session for the request's id.
//! 2. Tokenize the prompt, with BOS only if the session has no history yet.
//! 3. Evaluate the prompt tokens in one batch after the session's cache.
//! 4. Decode loop: pick the next token from the latest logits, stop on EOS
//!    unless `ignore_eos`, detokenize it, evaluate it, count it.
//!
//! A session's history only ever grows by tokens that were evaluated
//! successfully. A failure part-way leaves everything evaluated before it in
//! place; the model's cache cannot be rolled back cheaply.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use textgen_sampling::{Greedy, TokenSampler};

use crate::capability::{Batch, BufferFill, ContextParams, ModelParams, TokenModel};
use crate::session::{Session, SessionStore};
use crate::telemetry::{RequestTimer, TelemetryHook, TracingTelemetry};
use crate::{EngineError, GenerateChunk, GenerateResult, GenerationEngine, Result, SamplingParams, TokenId};

/// Extra slots allotted past one token per prompt byte on the first
/// tokenize attempt.
const TOKENIZE_SLACK: usize = 8;

/// First-attempt buffer for a single token's text.
const PIECE_BUF_LEN: usize = 16;

/// Construction options for [`ModelEngine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelOptions {
    /// Model file. Required.
    pub model_path: PathBuf,
    /// Context window per session, in tokens.
    pub n_ctx: usize,
    /// `None` keeps the model's default thread count.
    pub n_threads: Option<usize>,
    /// `None` keeps the model's default GPU offload.
    pub n_gpu_layers: Option<u32>,
    /// `None` keeps the model's default seed.
    pub seed: Option<u32>,
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            model_path: PathBuf::new(),
            n_ctx: 4096,
            n_threads: None,
            n_gpu_layers: None,
            seed: None,
        }
    }
}

impl ModelOptions {
    pub fn new(model_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            ..Default::default()
        }
    }

    pub fn with_n_ctx(mut self, n_ctx: usize) -> Self {
        self.n_ctx = n_ctx;
        self
    }

    pub fn with_n_threads(mut self, n: usize) -> Self {
        self.n_threads = Some(n);
        self
    }

    pub fn with_n_gpu_layers(mut self, n: u32) -> Self {
        self.n_gpu_layers = Some(n);
        self
    }

    pub fn with_seed(mut self, seed: u32) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn model_params(&self) -> ModelParams {
        ModelParams {
            n_gpu_layers: self.n_gpu_layers,
        }
    }

    pub fn context_params(&self) -> ContextParams {
        ContextParams {
            n_ctx: self.n_ctx,
            n_threads: self.n_threads,
            seed: self.seed,
        }
    }
}

/// Everything the engine lock guards.
struct EngineState<M: TokenModel> {
    model: M,
    sessions: SessionStore<M::Context>,
    sampler: Box<dyn TokenSampler>,
}

/// Autoregressive generation over a loaded [`TokenModel`].
///
/// Owns the model and every session. One request at a time runs its
/// tokenize/decode/sample sequence, whichever session it targets.
pub struct ModelEngine<M: TokenModel> {
    state: Mutex<EngineState<M>>,
    context_params: ContextParams,
    telemetry: Arc<dyn TelemetryHook>,
}

impl<M: TokenModel> ModelEngine<M> {
    /// Load the model named by `options`.
    ///
    /// Fails with [`EngineError::Configuration`] when the path is empty or the
    /// model does not load.
    pub fn load(options: &ModelOptions) -> Result<Self> {
        if options.model_path.as_os_str().is_empty() {
            return Err(EngineError::Configuration("model path is empty".into()));
        }

        tracing::info!(path = %options.model_path.display(), "loading model");
        let model = M::load(&options.model_path, &options.model_params()).map_err(|e| {
            EngineError::Configuration(format!(
                "failed to load model {}: {e}",
                options.model_path.display()
            ))
        })?;
        tracing::info!(
            n_vocab = model.n_vocab(),
            n_ctx = options.n_ctx,
            "model loaded"
        );

        Ok(Self::from_model(model, options.context_params()))
    }

    /// Wrap an already-loaded model.
    pub fn from_model(model: M, context_params: ContextParams) -> Self {
        Self {
            state: Mutex::new(EngineState {
                model,
                sessions: SessionStore::new(),
                sampler: Box::new(Greedy),
            }),
            context_params,
            telemetry: Arc::new(TracingTelemetry),
        }
    }

    /// Replace the token sampler (greedy by default).
    pub fn with_sampler(mut self, sampler: impl TokenSampler + 'static) -> Self {
        self.state_mut().sampler = Box::new(sampler);
        self
    }

    /// Replace the telemetry hook (tracing events by default).
    pub fn with_telemetry(mut self, hook: Arc<dyn TelemetryHook>) -> Self {
        self.telemetry = hook;
        self
    }

    /// Token history of a session, if it exists.
    pub fn session_tokens(&self, session_id: &str) -> Option<Vec<TokenId>> {
        self.lock_recovering()
            .sessions
            .get(session_id)
            .map(|s| s.tokens().to_vec())
    }

    pub fn session_count(&self) -> usize {
        self.lock_recovering().sessions.len()
    }

    /// Drop a session and release its context. Returns whether it existed.
    pub fn remove_session(&self, session_id: &str) -> bool {
        self.lock_recovering().sessions.remove(session_id)
    }

    fn state_mut(&mut self) -> &mut EngineState<M> {
        self.state.get_mut().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_recovering(&self) -> MutexGuard<'_, EngineState<M>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<M: TokenModel> GenerationEngine for ModelEngine<M> {
    fn name(&self) -> &str {
        "model"
    }

    fn generate(
        &self,
        model: &str,
        prompt: &str,
        params: &SamplingParams,
        session_id: &str,
    ) -> Result<GenerateResult> {
        self.generate_stream(model, prompt, params, session_id, &mut |_| {})
    }

    /// Emits one chunk per generated token as it is produced, then a chunk
    /// marked `finished`. A character split across tokens is held back until
    /// its last byte arrives, so the chunks concatenate to the result text.
    fn generate_stream(
        &self,
        _model: &str,
        prompt: &str,
        params: &SamplingParams,
        session_id: &str,
        sink: &mut dyn FnMut(GenerateChunk),
    ) -> Result<GenerateResult> {
        let key = SessionStore::<M::Context>::resolve_key(session_id);
        if params.requests_stochastic() {
            tracing::debug!(
                temperature = params.temperature,
                top_k = params.top_k,
                "temperature/top_k not applied, selecting greedily"
            );
        }

        let mut guard = self
            .state
            .lock()
            .map_err(|_| EngineError::Runtime("engine state poisoned by an earlier panic".into()))?;
        let EngineState {
            model,
            sessions,
            sampler,
        } = &mut *guard;
        let model: &M = model;

        let session = sessions
            .get_or_create(session_id, || model.new_context(&self.context_params))
            .map_err(|e| EngineError::Runtime(e.to_string()))?;

        let prompt_tokens = tokenize(model, prompt, session.is_fresh())?;
        let mut timer = RequestTimer::start(key, prompt_tokens.len(), self.telemetry.as_ref());

        eval(model, session, &prompt_tokens)?;
        timer.prompt_evaluated();

        let eos = model.eos();
        let max_new = params.resolved_max_tokens();
        let mut out = Vec::with_capacity(1024);
        // Bytes not yet streamed: the tail of a character split across tokens.
        let mut pending = Vec::new();
        let mut completion_tokens = 0;

        for _ in 0..max_new {
            let logits = model.logits(session.context());
            let next = sampler
                .sample(logits)
                .map_err(|e| EngineError::Runtime(format!("sampling failed: {e}")))?;
            let next = TokenId::try_from(next)
                .map_err(|_| EngineError::Runtime(format!("sampled id {next} out of range")))?;

            if !params.ignore_eos && next == eos {
                break;
            }

            let piece = token_to_piece(model, next);
            out.extend_from_slice(&piece);
            pending.extend_from_slice(&piece);

            eval(model, session, &[next])?;
            completion_tokens += 1;
            timer.token();
            sink(GenerateChunk {
                text: drain_utf8(&mut pending),
                finished: false,
            });
        }

        timer.finish();
        sink(GenerateChunk {
            text: String::from_utf8_lossy(&pending).into_owned(),
            finished: true,
        });
        tracing::debug!(
            session = key,
            prompt_tokens = prompt_tokens.len(),
            completion_tokens,
            history = session.tokens().len(),
            "request complete"
        );

        Ok(GenerateResult {
            text: String::from_utf8_lossy(&out).into_owned(),
            prompt_tokens: prompt_tokens.len(),
            completion_tokens,
        })
    }
}

/// Tokenize with one resize-and-retry when the first buffer is too small.
fn tokenize<M: TokenModel>(model: &M, text: &str, add_bos: bool) -> Result<Vec<TokenId>> {
    let mut buf = vec![0; text.len() + TOKENIZE_SLACK];
    let n = match model.tokenize(text, add_bos, &mut buf) {
        BufferFill::Written(n) => n,
        BufferFill::NeedsCapacity(required) => {
            buf.resize(required, 0);
            match model.tokenize(text, add_bos, &mut buf) {
                BufferFill::Written(n) => n,
                BufferFill::NeedsCapacity(again) => {
                    return Err(EngineError::Runtime(format!(
                        "tokenization failed: {again} slots required after resizing to {required}"
                    )));
                }
            }
        }
    };
    buf.truncate(n);
    Ok(buf)
}

/// Text bytes of one token. A second sizing failure yields no bytes.
fn token_to_piece<M: TokenModel>(model: &M, token: TokenId) -> Vec<u8> {
    let mut buf = vec![0; PIECE_BUF_LEN];
    let n = match model.token_to_piece(token, &mut buf) {
        BufferFill::Written(n) => n,
        BufferFill::NeedsCapacity(required) => {
            buf.resize(required, 0);
            match model.token_to_piece(token, &mut buf) {
                BufferFill::Written(n) => n,
                BufferFill::NeedsCapacity(_) => {
                    tracing::warn!(token, "detokenization failed, emitting empty fragment");
                    return Vec::new();
                }
            }
        }
    };
    buf.truncate(n);
    buf
}

/// Take the decodable prefix of `pending` as text, leaving an incomplete
/// trailing character in place. Invalid sequences become U+FFFD, matching
/// `String::from_utf8_lossy` over the whole output.
fn drain_utf8(pending: &mut Vec<u8>) -> String {
    let mut text = String::new();
    loop {
        match std::str::from_utf8(pending) {
            Ok(valid) => {
                text.push_str(valid);
                pending.clear();
                return text;
            }
            Err(e) => {
                let valid = e.valid_up_to();
                text.push_str(&String::from_utf8_lossy(&pending[..valid]));
                match e.error_len() {
                    Some(bad) => {
                        text.push(char::REPLACEMENT_CHARACTER);
                        pending.drain(..valid + bad);
                    }
                    None => {
                        pending.drain(..valid);
                        return text;
                    }
                }
            }
        }
    }
}

/// Evaluate `tokens` after the session's cache and record them on success.
fn eval<M: TokenModel>(model: &M, session: &mut Session<M::Context>, tokens: &[TokenId]) -> Result<()> {
    if tokens.is_empty() {
        return Ok(());
    }

    let start = model.cache_len(session.context());
    let batch = Batch::for_continuation(tokens, start);
    model
        .decode(session.context_mut(), &batch)
        .map_err(|e| EngineError::Runtime(e.to_string()))?;
    session.record(tokens);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_holds_back_incomplete_character() {
        let mut pending = vec![b'n', 0xC3];
        assert_eq!(drain_utf8(&mut pending), "n");
        assert_eq!(pending, vec![0xC3]);

        pending.push(0xA9);
        assert_eq!(drain_utf8(&mut pending), "é");
        assert!(pending.is_empty());
    }

    #[test]
    fn drain_replaces_invalid_bytes_like_lossy() {
        let bytes = [b'a', 0xFF, b'b', 0xC3, b'c'];
        let mut pending = bytes.to_vec();
        assert_eq!(drain_utf8(&mut pending), String::from_utf8_lossy(&bytes));
        assert!(pending.is_empty());
    }
}
