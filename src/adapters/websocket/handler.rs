//! WebSocket upgrade handler for device control connections.
//!
//! Connection lifecycle:
//! 1. Upgrade to WebSocket
//! 2. Open a [`DeviceSession`] (registers for every device)
//! 3. Relay frames until either side goes away
//! 4. Close the session (unregisters every listener)

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{stream::SplitSink, SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::application::DeviceController;

use super::{messages::ServerMessage, session::DeviceSession};

/// State required for WebSocket handling.
#[derive(Clone)]
pub struct ZigbeeState {
    /// Shared by every connection.
    pub controller: Arc<DeviceController>,
    /// Frames each connection may buffer ahead of its socket.
    pub outbound_capacity: usize,
}

impl ZigbeeState {
    pub fn new(controller: Arc<DeviceController>, outbound_capacity: usize) -> Self {
        Self {
            controller,
            outbound_capacity,
        }
    }
}

/// Handle WebSocket upgrade requests for device control.
///
/// Route: `GET /api/zigbee`
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<ZigbeeState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Drive one established connection until it closes.
async fn handle_socket(socket: WebSocket, state: ZigbeeState) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<ServerMessage>(state.outbound_capacity);

    let session = Arc::new(DeviceSession::new(state.controller.clone(), outbound_tx));
    let session_id = session.id();

    // Sole writer for this connection
    let mut send_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if let Err(e) = send_message(&mut sender, &message).await {
                tracing::debug!(session_id = %session_id, "Send error, closing connection: {}", e);
                break;
            }
        }
    });

    if let Err(e) = session.open().await {
        tracing::warn!(session_id = %session_id, error = %e, "Failed to open device session");
    }

    loop {
        tokio::select! {
            _ = &mut send_task => {
                tracing::debug!(session_id = %session_id, "Writer stopped");
                break;
            }
            frame = receiver.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    // Requests may be in flight concurrently; replies carry their ids.
                    let session = session.clone();
                    tokio::spawn(async move {
                        session.handle_text(&text).await;
                    });
                }
                Some(Ok(Message::Binary(_))) => {
                    tracing::warn!(session_id = %session_id, "Received unsupported binary message");
                }
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                    // Answered by axum
                }
                Some(Ok(Message::Close(_))) | None => {
                    tracing::debug!(session_id = %session_id, "Client closed connection");
                    break;
                }
                Some(Err(e)) => {
                    tracing::debug!(session_id = %session_id, "Receive error: {}", e);
                    break;
                }
            }
        }
    }

    session.close().await;
    send_task.abort();
}

/// Send one envelope as a text frame.
async fn send_message(
    sender: &mut SplitSink<WebSocket, Message>,
    message: &ServerMessage,
) -> Result<(), axum::Error> {
    let json = match message.to_json() {
        Ok(json) => json,
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize outbound message");
            return Ok(());
        }
    };
    sender.send(Message::Text(json)).await
}

/// Create axum router for the device control endpoint.
///
/// # Example
///
/// ```ignore
/// let app = Router::new()
///     .nest("/api", zigbee_router())
///     .with_state(ZigbeeState::new(controller, 128));
/// ```
pub fn zigbee_router() -> axum::Router<ZigbeeState> {
    use axum::routing::get;

    axum::Router::new().route("/zigbee", get(ws_handler))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mqtt::InMemoryBroker;
    use crate::domain::zigbee::DeviceTopics;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn state() -> ZigbeeState {
        let broker = Arc::new(InMemoryBroker::new());
        ZigbeeState::new(DeviceController::new_shared(broker, DeviceTopics::default()), 8)
    }

    #[test]
    fn zigbee_state_shares_controller() {
        let state = state();
        let cloned = state.clone();

        assert!(Arc::ptr_eq(&state.controller, &cloned.controller));
    }

    #[tokio::test]
    async fn plain_get_is_not_upgraded() {
        let app = zigbee_router().with_state(state());

        let response = app
            .oneshot(Request::get("/zigbee").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert!(response.status().is_client_error());
        assert_ne!(response.status(), StatusCode::NOT_FOUND);
    }
}
