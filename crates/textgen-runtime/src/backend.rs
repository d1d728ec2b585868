//! Backend selection.
//!
//! Provides:
//! - [`Backend`]: which engine variant serves requests
//! - [`EngineConfig`]: backend plus model options, fixed at startup
//! - [`build_engine`]: constructs the selected engine

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use textgen_engine::{EchoEngine, EngineError, GenerationEngine, ModelEngine, ModelOptions};

use crate::bigram::BigramModel;

/// Engine variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Backend {
    /// Deterministic echo; needs no model.
    #[default]
    Echo,
    /// Autoregressive generation over a loaded model file.
    Model,
}

impl Backend {
    /// All selectable backends.
    pub fn all() -> &'static [Backend] {
        &[Backend::Echo, Backend::Model]
    }

    /// Whether this backend needs `--model-path`.
    pub fn requires_model(&self) -> bool {
        matches!(self, Backend::Model)
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Echo => write!(f, "echo"),
            Backend::Model => write!(f, "model"),
        }
    }
}

impl FromStr for Backend {
    type Err = BackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "echo" | "dummy" => Ok(Backend::Echo),
            "model" | "llama_cpp" => Ok(Backend::Model),
            other => Err(BackendError::Unknown(other.to_string())),
        }
    }
}

/// Errors from backend selection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("unknown backend `{name}` (expected one of: {choices})", name = .0, choices = backend_names())]
    Unknown(String),
}

fn backend_names() -> String {
    Backend::all()
        .iter()
        .map(|b| b.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl From<BackendError> for EngineError {
    fn from(err: BackendError) -> Self {
        EngineError::Configuration(err.to_string())
    }
}

/// Engine configuration. Immutable once the engine is built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineConfig {
    pub backend: Backend,
    /// Used by [`Backend::Model`] only.
    pub model: ModelOptions,
}

impl EngineConfig {
    pub fn echo() -> Self {
        Self::default()
    }

    pub fn model(options: ModelOptions) -> Self {
        Self {
            backend: Backend::Model,
            model: options,
        }
    }
}

/// Build the engine `config` selects.
///
/// Fails with [`EngineError::Configuration`] when the model backend has no
/// path or its model does not load.
pub fn build_engine(config: &EngineConfig) -> Result<Arc<dyn GenerationEngine>, EngineError> {
    tracing::info!(backend = %config.backend, "building engine");
    match config.backend {
        Backend::Echo => Ok(Arc::new(EchoEngine::new())),
        Backend::Model => {
            let engine = ModelEngine::<BigramModel>::load(&config.model)?;
            Ok(Arc::new(engine))
        }
    }
}
