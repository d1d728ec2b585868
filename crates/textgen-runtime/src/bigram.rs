//! Byte-level bigram token model.
//!
//! The model file is a plain text corpus. Each non-empty line is one training
//! sequence `BOS, bytes…, EOS`; loading counts every `(token, next)` pair. The
//! logits for a position are the follower counts of the token at that
//! position, so greedy decoding replays the most frequent continuation seen
//! in the corpus. A token the corpus never continued predicts EOS.
//!
//! Vocabulary: the 256 byte values, then [`BOS_TOKEN`] and [`EOS_TOKEN`].

use std::path::Path;

use textgen_engine::{Batch, BufferFill, CapabilityError, ContextParams, ModelParams, TokenId, TokenModel};

pub const BOS_TOKEN: TokenId = 256;
pub const EOS_TOKEN: TokenId = 257;
pub const N_VOCAB: usize = 258;

/// Follower counts for every token, row-major `[N_VOCAB, N_VOCAB]`.
#[derive(Debug, Clone)]
pub struct BigramModel {
    counts: Vec<f32>,
    sequences: usize,
}

/// Per-session state: the evaluated tokens and the last logits row.
#[derive(Debug)]
pub struct BigramContext {
    cells: Vec<TokenId>,
    n_ctx: usize,
    logits: Vec<f32>,
}

impl BigramContext {
    /// Tokens evaluated so far.
    pub fn cells(&self) -> &[TokenId] {
        &self.cells
    }
}

impl BigramModel {
    /// Build a model from raw corpus bytes.
    pub fn from_corpus(corpus: &[u8]) -> Self {
        let mut counts = vec![0.0; N_VOCAB * N_VOCAB];
        let mut sequences = 0;

        for line in corpus.split(|&b| b == b'\n') {
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            if line.is_empty() {
                continue;
            }
            sequences += 1;

            let mut prev = BOS_TOKEN;
            for &byte in line {
                counts[index(prev, TokenId::from(byte))] += 1.0;
                prev = TokenId::from(byte);
            }
            counts[index(prev, EOS_TOKEN)] += 1.0;
        }

        Self { counts, sequences }
    }

    /// Number of training sequences in the corpus.
    pub fn sequences(&self) -> usize {
        self.sequences
    }

    fn row(&self, token: TokenId) -> &[f32] {
        let start = index(token, 0);
        &self.counts[start..start + N_VOCAB]
    }

    /// Logits after `token`: its follower counts, or a certain EOS when the
    /// corpus never continued it.
    fn next_logits(&self, token: TokenId) -> Vec<f32> {
        let row = self.row(token);
        if row.iter().any(|&c| c > 0.0) {
            return row.to_vec();
        }
        let mut logits = vec![0.0; N_VOCAB];
        logits[EOS_TOKEN as usize] = 1.0;
        logits
    }

    fn validate(ctx: &BigramContext, batch: &Batch) -> Result<(), CapabilityError> {
        if batch.is_empty() {
            return Err(CapabilityError::Decode("empty batch".into()));
        }
        if batch.positions.len() != batch.len() || batch.logits.len() != batch.len() {
            return Err(CapabilityError::Decode(format!(
                "batch of {} tokens has {} positions and {} logits flags",
                batch.len(),
                batch.positions.len(),
                batch.logits.len()
            )));
        }
        if ctx.cells.len() + batch.len() > ctx.n_ctx {
            return Err(CapabilityError::Decode(format!(
                "context window of {} tokens exceeded ({} cached, {} new)",
                ctx.n_ctx,
                ctx.cells.len(),
                batch.len()
            )));
        }
        for (i, (&token, &pos)) in batch.tokens.iter().zip(&batch.positions).enumerate() {
            let expected = ctx.cells.len() + i;
            if pos != expected {
                return Err(CapabilityError::Decode(format!(
                    "token at position {pos}, expected {expected}"
                )));
            }
            if !in_vocab(token) {
                return Err(CapabilityError::Decode(format!("token {token} out of vocabulary")));
            }
        }
        Ok(())
    }
}

fn in_vocab(token: TokenId) -> bool {
    usize::try_from(token).map_or(false, |t| t < N_VOCAB)
}

/// Callers check `in_vocab` first.
fn index(prev: TokenId, next: TokenId) -> usize {
    prev as usize * N_VOCAB + next as usize
}

impl TokenModel for BigramModel {
    type Context = BigramContext;

    fn load(path: &Path, params: &ModelParams) -> Result<Self, CapabilityError> {
        let corpus = std::fs::read(path)
            .map_err(|e| CapabilityError::Load(format!("{}: {e}", path.display())))?;
        let model = Self::from_corpus(&corpus);
        if model.sequences == 0 {
            return Err(CapabilityError::Load(format!(
                "{}: corpus contains no sequences",
                path.display()
            )));
        }
        if let Some(layers) = params.n_gpu_layers {
            tracing::debug!(layers, "bigram model runs on CPU, ignoring GPU offload");
        }
        tracing::debug!(sequences = model.sequences, bytes = corpus.len(), "bigram corpus loaded");
        Ok(model)
    }

    fn new_context(&self, params: &ContextParams) -> Result<BigramContext, CapabilityError> {
        if params.n_ctx == 0 {
            return Err(CapabilityError::Context("context window must be non-zero".into()));
        }
        tracing::trace!(
            n_ctx = params.n_ctx,
            n_threads = ?params.n_threads,
            seed = ?params.seed,
            "bigram context allocated"
        );
        Ok(BigramContext {
            cells: Vec::new(),
            n_ctx: params.n_ctx,
            logits: Vec::new(),
        })
    }

    fn tokenize(&self, text: &str, add_bos: bool, buf: &mut [TokenId]) -> BufferFill {
        let needed = text.len() + usize::from(add_bos);
        if buf.len() < needed {
            return BufferFill::NeedsCapacity(needed);
        }

        let mut n = 0;
        if add_bos {
            buf[0] = BOS_TOKEN;
            n = 1;
        }
        for byte in text.bytes() {
            buf[n] = TokenId::from(byte);
            n += 1;
        }
        BufferFill::Written(n)
    }

    fn token_to_piece(&self, token: TokenId, buf: &mut [u8]) -> BufferFill {
        let Ok(byte) = u8::try_from(token) else {
            // BOS, EOS and anything out of range print as nothing.
            return BufferFill::Written(0);
        };
        match buf.first_mut() {
            Some(slot) => {
                *slot = byte;
                BufferFill::Written(1)
            }
            None => BufferFill::NeedsCapacity(1),
        }
    }

    fn decode(&self, ctx: &mut BigramContext, batch: &Batch) -> Result<(), CapabilityError> {
        Self::validate(ctx, batch)?;

        ctx.cells.extend_from_slice(&batch.tokens);
        match batch.logits.iter().rposition(|&wanted| wanted) {
            Some(i) => ctx.logits = self.next_logits(batch.tokens[i]),
            None => ctx.logits.clear(),
        }
        Ok(())
    }

    fn logits<'a>(&self, ctx: &'a BigramContext) -> &'a [f32] {
        &ctx.logits
    }

    fn cache_len(&self, ctx: &BigramContext) -> usize {
        ctx.cells.len()
    }

    fn eos(&self) -> TokenId {
        EOS_TOKEN
    }

    fn n_vocab(&self) -> usize {
        N_VOCAB
    }
}
