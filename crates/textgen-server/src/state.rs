//! Application state and configuration.

use std::net::SocketAddr;
use std::sync::Arc;

use textgen_engine::GenerationEngine;

use crate::limiter::RequestLimiter;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// The engine every request is served by.
    pub engine: Arc<dyn GenerationEngine>,
    pub config: ServerConfig,
    /// In-flight request cap.
    pub limiter: Arc<RequestLimiter>,
}

impl AppState {
    pub fn new(engine: Arc<dyn GenerationEngine>, config: ServerConfig) -> Self {
        let limiter = RequestLimiter::new(config.max_concurrent);
        Self {
            engine,
            config,
            limiter,
        }
    }

    /// Name reported in responses: the request's model, else the backend.
    pub fn model_label(&self, requested: &str) -> String {
        if requested.is_empty() {
            self.engine.name().to_string()
        } else {
            requested.to_string()
        }
    }
}

/// Server configuration parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address the HTTP listener binds.
    pub listen: SocketAddr,
    /// Maximum requests inside the engine at once.
    pub max_concurrent: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 50051)),
            max_concurrent: 64,
        }
    }
}
