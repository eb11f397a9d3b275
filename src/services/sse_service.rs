use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::{
    broadcast::{self, error::RecvError},
    mpsc,
};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use crate::{
    dto::sse::{Handshake, ServerEvent},
    error::ServiceError,
    services::coordinator::Command,
    state::SharedState,
};

/// Name of the display stream, as announced in its handshake.
pub const DISPLAY_STREAM: &str = "display";

/// Subscribe a display and ask the coordinator for a fresh public view.
///
/// The handshake event is queued ahead of the subscription so it is always the
/// first event the client sees.
pub fn subscribe_display(
    state: &SharedState,
) -> Result<(broadcast::Receiver<ServerEvent>, Option<ServerEvent>), ServiceError> {
    let receiver = state.display().subscribe();
    state.coordinator().send(Command::DisplayConnected)?;
    let handshake = ServerEvent::json(
        Some("handshake".to_owned()),
        &Handshake {
            stream: DISPLAY_STREAM.to_owned(),
            message: "display stream connected".to_owned(),
        },
    )
    .inspect_err(|err| warn!(error = %err, "failed to serialise handshake"))
    .ok();
    Ok((receiver, handshake))
}

/// Convert a broadcast receiver into an SSE response, sending `first` before
/// anything broadcast.
pub fn to_sse_stream(
    mut receiver: broadcast::Receiver<ServerEvent>,
    first: Option<ServerEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    // small bounded channel between forwarder and response
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);

    tokio::spawn(async move {
        if let Some(first) = first
            && tx.send(Ok(to_event(first))).await.is_err()
        {
            return;
        }
        loop {
            tokio::select! {
                _ = tx.closed() => break,
                recv_result = receiver.recv() => {
                    match recv_result {
                        Ok(payload) => {
                            if tx.send(Ok(to_event(payload))).await.is_err() {
                                break;
                            }
                        }
                        Err(RecvError::Closed) => break,
                        Err(RecvError::Lagged(skipped)) => {
                            // The next state push supersedes whatever was lost.
                            debug!(skipped, "display stream lagged");
                            continue;
                        }
                    }
                }
            }
        }
        info!("display SSE stream disconnected");
    });

    let stream = ReceiverStream::new(rx);
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

fn to_event(payload: ServerEvent) -> Event {
    let event = Event::default().data(payload.data);
    match payload.event {
        Some(name) => event.event(name),
        None => event,
    }
}
