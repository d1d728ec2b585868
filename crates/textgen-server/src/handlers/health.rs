//! Health check handler.

use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::state::AppState;

/// Liveness, the serving backend, and limiter utilization.
pub async fn handle_health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "ok": true,
        "message": "ok",
        "engine": state.engine.name(),
        "requests": {
            "in_flight": state.limiter.in_flight(),
            "max_concurrent": state.limiter.max_concurrent(),
            "available": state.limiter.available(),
        }
    }))
}
