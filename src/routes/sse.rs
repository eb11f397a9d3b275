use std::convert::Infallible;

use axum::{Router, extract::State, response::sse::Sse, routing::get};
use futures::Stream;
use tracing::info;

use crate::{error::AppError, services::sse_service, state::SharedState};

#[utoipa::path(
    get,
    path = "/sse/display",
    tag = "sse",
    responses(
        (status = 200, description = "Public game view for a shared screen", content_type = "text/event-stream", body = String),
        (status = 503, description = "Game coordinator unavailable")
    )
)]
/// Stream the public game view to a shared display. Role data is never sent here.
pub async fn display_stream(
    State(state): State<SharedState>,
) -> Result<Sse<impl Stream<Item = Result<axum::response::sse::Event, Infallible>>>, AppError> {
    let (receiver, handshake) = sse_service::subscribe_display(&state)?;
    info!(subscribers = state.display().subscriber_count(), "new display SSE connection");
    Ok(sse_service::to_sse_stream(receiver, handshake))
}

/// Configure the SSE endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/sse/display", get(display_stream))
}
