//! Command-line configuration.
//!
//! Numeric sentinels follow the usual inference-server conventions: a thread
//! count of `0` and a GPU layer count or seed of `-1` keep the model's
//! defaults.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use textgen_engine::{EngineError, ModelOptions};
use textgen_runtime::{Backend, EngineConfig};

use crate::state::ServerConfig;

/// Text generation server
#[derive(Debug, Clone, Parser)]
#[command(name = "textgen-server", version)]
pub struct Args {
    /// Address to listen on.
    #[arg(long, default_value = "0.0.0.0:50051")]
    pub listen: SocketAddr,

    /// Engine backend: `echo` (alias `dummy`) or `model` (alias `llama_cpp`).
    #[arg(long, default_value = "echo")]
    pub backend: String,

    /// Model file for the `model` backend.
    #[arg(long)]
    pub model_path: Option<PathBuf>,

    /// Context window per session, in tokens.
    #[arg(long, default_value_t = 4096)]
    pub n_ctx: usize,

    /// Worker threads for evaluation; 0 keeps the model default.
    #[arg(long, default_value_t = 0)]
    pub n_threads: i32,

    /// Layers to offload to the GPU; -1 keeps the model default.
    #[arg(long, default_value_t = -1, allow_negative_numbers = true)]
    pub n_gpu_layers: i32,

    /// Seed for the model context; -1 keeps the model default.
    #[arg(long, default_value_t = -1, allow_negative_numbers = true)]
    pub seed: i64,

    /// Maximum requests inside the engine at once.
    #[arg(long, default_value_t = 64)]
    pub max_concurrent: usize,
}

impl Default for Args {
    fn default() -> Self {
        Self::parse_from(["textgen-server"])
    }
}

impl Args {
    /// Engine configuration. Fails on an unknown backend or an out-of-range
    /// seed.
    pub fn engine_config(&self) -> Result<EngineConfig, EngineError> {
        let backend: Backend = self.backend.parse()?;

        let mut model = ModelOptions::new(self.model_path.clone().unwrap_or_default())
            .with_n_ctx(self.n_ctx);
        model.n_threads = usize::try_from(self.n_threads).ok().filter(|&n| n > 0);
        model.n_gpu_layers = u32::try_from(self.n_gpu_layers).ok();
        model.seed = match self.seed {
            s if s < 0 => None,
            s => Some(u32::try_from(s).map_err(|_| {
                EngineError::Configuration(format!("seed {s} does not fit in 32 bits"))
            })?),
        };

        Ok(EngineConfig { backend, model })
    }

    /// Listener and limiter settings.
    pub fn server_config(&self) -> Result<ServerConfig, EngineError> {
        if self.max_concurrent == 0 {
            return Err(EngineError::Configuration(
                "max-concurrent must be at least 1".into(),
            ));
        }
        Ok(ServerConfig {
            listen: self.listen,
            max_concurrent: self.max_concurrent,
        })
    }
}
