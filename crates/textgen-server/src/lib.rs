//! # textgen-server
//!
//! HTTP API over a [`GenerationEngine`](textgen_engine::GenerationEngine).
//!
//! Routes:
//! - `GET /health`: liveness plus request-limiter utilization
//! - `POST /v1/generate`: one request, one JSON response
//! - `POST /v1/generate/stream`: Server-Sent Events, one event per chunk
//!
//! Engine calls block for the whole decode loop, so handlers run them on the
//! blocking thread pool and hold a limiter permit until they return.

pub mod config;
pub mod error;
pub mod handlers;
pub mod limiter;
pub mod models;
pub mod server;
pub mod state;
pub mod streaming;

pub use config::Args;
pub use error::ServerError;
pub use limiter::{RequestLimiter, RequestPermit};
pub use server::{create_router, run_server};
pub use state::{AppState, ServerConfig};
