// =============================================================================
// WebSocket Handler — Push-based state updates
// =============================================================================
//
// Clients connect to `/api/v1/ws` and receive:
//   1. An immediate full StateSnapshot on connect.
//   2. A fresh full snapshot every 500 ms whenever the state_version has
//      changed since the last push. Unchanged state pushes nothing.
//
// The feed is strictly one-way dashboard data. Incoming text frames are
// ignored, Pings are answered, and a Close frame (or any receive error)
// ends the connection.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use tokio::time::{interval, Duration};
use tracing::{debug, info, warn};

use crate::app_state::DashboardState;

/// Axum handler for the WebSocket upgrade request.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<DashboardState>>,
) -> impl IntoResponse {
    info!("WebSocket connection accepted — upgrading");
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
}

/// Manages a single WebSocket connection lifecycle: an initial snapshot,
/// then a version-gated push loop multiplexed with the receive side via
/// `tokio::select!`.
async fn handle_ws_connection(socket: WebSocket, state: Arc<DashboardState>) {
    let (mut sender, mut receiver) = socket.split();
    use futures_util::{SinkExt, StreamExt};

    // Send the initial full snapshot immediately.
    let mut sequence: u64 = 0;
    if let Err(e) = send_snapshot(&mut sender, &state, &mut sequence).await {
        warn!(error = %e, "failed to send initial WebSocket snapshot");
        return;
    }
    let mut last_sent_version = state.current_state_version();

    let mut push_interval = interval(Duration::from_millis(500));

    loop {
        tokio::select! {
            // ── Push loop: check for version changes every 500 ms ───────
            _ = push_interval.tick() => {
                let current_version = state.current_state_version();
                if current_version != last_sent_version {
                    match send_snapshot(&mut sender, &state, &mut sequence).await {
                        Ok(()) => {
                            last_sent_version = current_version;
                        }
                        Err(e) => {
                            debug!(error = %e, "WebSocket send failed — disconnecting");
                            break;
                        }
                    }
                }
            }

            // ── Recv loop: process incoming messages ────────────────────
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        // Read-only feed; client text carries no meaning.
                        debug!(msg = %text, "WebSocket text message ignored");
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = sender.send(Message::Pong(data)).await {
                            debug!(error = %e, "failed to send Pong — disconnecting");
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        debug!("WebSocket Pong received");
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("WebSocket Close frame received — disconnecting");
                        break;
                    }
                    Some(Ok(Message::Binary(_))) => {
                        debug!("WebSocket binary message ignored");
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket receive error — disconnecting");
                        break;
                    }
                    None => {
                        info!("WebSocket stream ended");
                        break;
                    }
                }
            }
        }
    }

    info!("WebSocket connection closed");
}

/// Serialize and send the current StateSnapshot over the WebSocket.
///
/// Increments the global `ws_sequence_number` on each send.
async fn send_snapshot<S>(
    sender: &mut S,
    state: &Arc<DashboardState>,
    sequence: &mut u64,
) -> Result<(), axum::Error>
where
    S: futures_util::Sink<Message, Error = axum::Error> + Unpin,
{
    use futures_util::SinkExt;

    state
        .ws_sequence_number
        .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    *sequence += 1;

    let snapshot = state.build_snapshot();

    match serde_json::to_string(&snapshot) {
        Ok(json) => {
            sender.send(Message::Text(json)).await?;
            debug!(
                version = snapshot.state_version,
                seq = *sequence,
                "WebSocket snapshot sent"
            );
            Ok(())
        }
        Err(e) => {
            warn!(error = %e, "failed to serialize snapshot");
            // Serialisation errors are not network errors; don't disconnect.
            Ok(())
        }
    }
}
