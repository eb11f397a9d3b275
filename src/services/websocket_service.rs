use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::{sync::mpsc, task::JoinHandle, time::timeout};
use tracing::{debug, info, warn};

use crate::{
    dto::ws::{ClientMessage, ServerMessage, WelcomeMessage},
    services::coordinator::Command,
    state::{CLOSE_CONNECTION_LIMIT, Outbound, SharedState},
};

/// Frames buffered per connection before new ones are dropped.
const OUTBOUND_BUFFER: usize = 64;

/// Handle the full lifecycle of one participant WebSocket connection.
pub async fn handle_socket(state: SharedState, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Outbound>(OUTBOUND_BUFFER);
    let send_timeout = state.config().timings.send_timeout;

    // Dedicated writer task keeps outbound frames flowing while we await inbound ones.
    let mut writer_task = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            let (message, closing) = to_message(frame);
            match timeout(send_timeout, sender.send(message)).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    debug!(error = %err, "websocket write failed");
                    break;
                }
                Err(_) => {
                    warn!(timeout = ?send_timeout, "websocket write timed out");
                    break;
                }
            }
            if closing {
                break;
            }
        }
    });

    let connection = match state.connections().register(outbound_tx.clone()) {
        Ok(connection) => connection,
        Err(err) => {
            warn!(open = state.connections().len(), "connection limit reached; refusing socket");
            queue(&outbound_tx, &ServerMessage::from(&err));
            let _ = outbound_tx.try_send(Outbound::Close {
                code: CLOSE_CONNECTION_LIMIT,
                reason: "connection limit reached".into(),
            });
            finalize(writer_task, outbound_tx, send_timeout).await;
            return;
        }
    };

    info!(connection = %connection, "websocket connected");
    queue(
        &outbound_tx,
        &ServerMessage::Welcome(WelcomeMessage::new(connection)),
    );

    let writer_finished = loop {
        tokio::select! {
            _ = &mut writer_task => break true,
            message = receiver.next() => match message {
                Some(Ok(Message::Text(text))) => match ClientMessage::parse(&text) {
                    Ok(message) => {
                        let command = Command::Message { connection, message };
                        if let Err(err) = state.coordinator().send(command) {
                            warn!(connection = %connection, error = %err, "dropping connection");
                            break false;
                        }
                    }
                    Err(err) => {
                        debug!(connection = %connection, code = err.code(), "unreadable message");
                        queue(&outbound_tx, &ServerMessage::from(&err));
                    }
                },
                Some(Ok(Message::Close(_))) | None => break false,
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    debug!(connection = %connection, error = %err, "websocket error");
                    break false;
                }
            },
        }
    };

    info!(connection = %connection, "websocket disconnected");
    if state
        .coordinator()
        .send(Command::Disconnected { connection })
        .is_err()
    {
        state.connections().unregister(connection);
    }

    if !writer_finished {
        finalize(writer_task, outbound_tx, send_timeout).await;
    }
}

/// Serialise `message` onto this connection's own queue.
fn queue(tx: &mpsc::Sender<Outbound>, message: &ServerMessage) {
    match message.to_json() {
        Ok(payload) => {
            if tx.try_send(Outbound::Text(payload)).is_err() {
                debug!("outbound queue unavailable; frame dropped");
            }
        }
        Err(err) => warn!(error = %err, "failed to serialise message"),
    }
}

/// WebSocket message for a queued frame, and whether the writer stops after it.
fn to_message(frame: Outbound) -> (Message, bool) {
    match frame {
        Outbound::Text(text) => (Message::Text(text.into()), false),
        Outbound::Close { code, reason } => (
            Message::Close(Some(CloseFrame {
                code,
                reason: reason.into(),
            })),
            true,
        ),
    }
}

/// Let the writer drain what is queued, then stop it.
async fn finalize(
    mut writer_task: JoinHandle<()>,
    outbound_tx: mpsc::Sender<Outbound>,
    grace: Duration,
) {
    drop(outbound_tx);
    if timeout(grace, &mut writer_task).await.is_err() {
        writer_task.abort();
    }
}
