//! Server-Sent Events (SSE) streaming for generation.
//!
//! Protocol:
//! - Each engine chunk is sent as `data: {"token_text", "finished"}`
//! - A failure after the stream opened is sent as an `error` event carrying
//!   the same JSON body a unary error response would
//! - The stream always ends with `data: [DONE]`
//!
//! The engine runs on the blocking pool and forwards chunks through a
//! channel. If the client disconnects, the receiver is dropped and the
//! remaining chunks are discarded; the engine call itself runs to completion.

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use textgen_engine::{GenerateChunk, SamplingParams};
use tokio::sync::mpsc;

use crate::error::ServerError;
use crate::limiter::RequestPermit;
use crate::models::{GenerateRequest, GenerateStreamChunk};
use crate::state::AppState;

/// Start generation and return its event stream.
pub fn stream_generation(
    state: &AppState,
    req: GenerateRequest,
    params: SamplingParams,
    permit: RequestPermit,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let (tx, mut rx) = mpsc::unbounded_channel::<GenerateChunk>();
    let engine = state.engine.clone();

    let task = tokio::task::spawn_blocking(move || {
        let _permit = permit;
        engine.generate_stream(
            &req.model,
            &req.prompt,
            &params,
            &req.session_id,
            &mut |chunk| {
                // A closed channel means the client is gone.
                let _ = tx.send(chunk);
            },
        )
    });

    let stream = async_stream::stream! {
        while let Some(chunk) = rx.recv().await {
            yield Event::default().json_data(GenerateStreamChunk::from(chunk));
        }

        let outcome = match task.await {
            Ok(Ok(result)) => {
                tracing::debug!(
                    prompt_tokens = result.prompt_tokens,
                    completion_tokens = result.completion_tokens,
                    "stream complete"
                );
                Ok(())
            }
            Ok(Err(e)) => Err(ServerError::from(e)),
            Err(e) => Err(ServerError::Internal(format!("task join: {e}"))),
        };
        if let Err(err) = outcome {
            tracing::warn!(error = %err, "stream failed");
            yield Event::default().event("error").json_data(err.body());
        }

        yield Ok(Event::default().data("[DONE]"));
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}
