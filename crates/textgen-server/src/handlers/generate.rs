//! Unary generation handler.

use std::time::Instant;

use axum::{extract::State, Json};
use chrono::Utc;
use uuid::Uuid;

use crate::{
    error::ServerError,
    models::{GenerateRequest, GenerateResponse},
    state::AppState,
};

/// Handle `POST /v1/generate`.
///
/// The permit moves into the blocking task, so the slot stays taken until
/// the engine returns even if this future is dropped first.
pub async fn handle_generate(
    State(state): State<AppState>,
    Json(req): Json<GenerateRequest>,
) -> Result<Json<GenerateResponse>, ServerError> {
    let params = req.sampling_params()?;
    let permit = state
        .limiter
        .try_acquire()
        .ok_or(ServerError::ServiceUnavailable)?;

    let started = Instant::now();
    let engine = state.engine.clone();
    let model = state.model_label(&req.model);
    let GenerateRequest {
        model: requested_model,
        prompt,
        session_id,
        ..
    } = req;

    let result = tokio::task::spawn_blocking(move || {
        let _permit = permit;
        engine.generate(&requested_model, &prompt, &params, &session_id)
    })
    .await
    .map_err(|e| ServerError::Internal(format!("task join: {e}")))??;

    let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    tracing::debug!(
        prompt_tokens = result.prompt_tokens,
        completion_tokens = result.completion_tokens,
        latency_ms,
        "generate complete"
    );

    Ok(Json(GenerateResponse {
        id: format!("gen-{}", Uuid::new_v4()),
        created: Utc::now().timestamp(),
        model,
        text: result.text,
        prompt_tokens: result.prompt_tokens,
        completion_tokens: result.completion_tokens,
        latency_ms,
    }))
}
