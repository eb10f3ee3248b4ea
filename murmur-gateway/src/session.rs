//! Lifecycle of one client socket: admission, join/leave announcements,
//! inbound message handling, and the writer that drains the outbox.

use axum::body::Bytes;
use axum::extract::ws::{CloseFrame, Message, WebSocket, close_code};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::AppState;
use crate::events::{ClientMessage, Event, PongFrame};
use crate::registry::{Admission, ConnectionId, Outbound, Outbox};
use crate::validation::parse_client_message;

/// Admit a connection and announce its arrival. Returns `None` when the
/// instance is full; nothing is appended in that case.
///
/// The registry holds the new peer back from broadcast ticks until its
/// first snapshot goes out, so a tick racing this function never sends it
/// a diff ahead of that snapshot.
pub async fn open(state: &AppState, outbox: Outbox) -> Option<ConnectionId> {
    let (id, count) = match state.registry.admit(outbox).await {
        Admission::Accepted { id, count } => (id, count),
        Admission::Rejected { count } => {
            info!(count, "connection rejected, instance full");
            return None;
        }
    };
    info!(%id, count, "connection admitted");

    state.scaling.on_admit(count);
    announce(state, Event::joined(id.clone())).await;
    state.hub.request_full_state(id.clone()).await;

    Some(id)
}

/// Release a connection and announce its departure, unless another path
/// already did. Returns whether this call released it.
pub async fn close(state: &AppState, id: &ConnectionId) -> bool {
    if !state.registry.release(id).await {
        return false;
    }
    info!(%id, "connection closed");

    state.scaling.observe(state.registry.count());
    announce(state, Event::left(id.clone())).await;
    true
}

/// Append an event to the log. Failures are logged and not retried; the
/// change then stays invisible cluster-wide.
pub async fn announce(state: &AppState, event: Event) {
    let encoded = match serde_json::to_string(&event) {
        Ok(encoded) => encoded,
        Err(e) => {
            error!(error = %e, "failed to encode event");
            return;
        }
    };

    if let Err(e) = state.log.append(encoded).await {
        error!(error = %e, player = %event.player_id(), "event log append failed");
    }
}

/// Handle one inbound text frame. Bad frames are dropped; the connection
/// stays open.
pub async fn handle_text(state: &AppState, id: &ConnectionId, text: &str) {
    match parse_client_message(text, state.config.max_message_bytes) {
        Ok(ClientMessage::Ping) => echo_ping(state).await,
        Err(e) => warn!(%id, error = %e, "discarding client message"),
    }
}

/// Round-trip the event log's liveness check and share the reply with every
/// local connection.
async fn echo_ping(state: &AppState) {
    let reply = match state.log.ping().await {
        Ok(reply) => reply,
        Err(e) => {
            error!(error = %e, "event log ping failed");
            return;
        }
    };

    match serde_json::to_string(&PongFrame::new(&reply)) {
        Ok(frame) => {
            state.registry.broadcast(frame.into()).await;
        }
        Err(e) => error!(error = %e, "failed to encode pong"),
    }
}

/// Drive an upgraded socket until either side ends it.
pub async fn run(socket: WebSocket, state: Arc<AppState>) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel();

    let Some(id) = open(&state, tx).await else {
        let _ = sink
            .send(Message::Close(Some(CloseFrame {
                code: close_code::AGAIN,
                reason: "server full".into(),
            })))
            .await;
        return;
    };

    let writer = async {
        while let Some(frame) = rx.recv().await {
            match frame {
                Outbound::Text(text) => sink.send(Message::Text(text)).await?,
                Outbound::Ping => sink.send(Message::Ping(Bytes::new())).await?,
                Outbound::Close => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            }
        }
        Ok::<(), axum::Error>(())
    };

    let reader = async {
        while let Some(message) = stream.next().await {
            match message {
                Ok(Message::Text(text)) => handle_text(&state, &id, text.as_str()).await,
                Ok(Message::Pong(_)) => {
                    state.registry.mark_alive(&id).await;
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    debug!(%id, error = %e, "socket read failed");
                    break;
                }
            }
        }
    };

    tokio::select! {
        result = writer => {
            if let Err(e) = result {
                debug!(%id, error = %e, "socket write failed");
            }
        }
        _ = reader => {}
    }

    close(&state, &id).await;
}
