//! Streaming generation handler.

use axum::{
    extract::State,
    response::{IntoResponse, Response},
    Json,
};

use crate::{error::ServerError, models::GenerateRequest, state::AppState, streaming};

/// Handle `POST /v1/generate/stream`.
///
/// Invalid requests and a full limiter are answered with a plain error
/// status before the event stream opens.
pub async fn handle_generate_stream(
    State(state): State<AppState>,
    Json(req): Json<GenerateRequest>,
) -> Result<Response, ServerError> {
    let params = req.sampling_params()?;
    let permit = state
        .limiter
        .try_acquire()
        .ok_or(ServerError::ServiceUnavailable)?;

    Ok(streaming::stream_generation(&state, req, params, permit).into_response())
}
