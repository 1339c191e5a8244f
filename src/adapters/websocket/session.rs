//! Per-connection device session.
//!
//! A session registers one state-push listener per catalog device when the
//! connection opens, answers control requests while it is open, and hands
//! every listener back to the controller when the connection goes away.
//!
//! All output goes through one bounded channel. The connection's writer
//! task is its only consumer, so whole envelopes are written one at a time.
//! Responses wait for room in the queue; state pushes never wait and are
//! dropped for a connection that has fallen behind.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex};

use crate::application::DeviceController;
use crate::domain::foundation::{DomainError, ErrorCode, SessionId, StateMachine};
use crate::domain::zigbee::{DeviceName, DeviceState};
use crate::ports::DeviceListener;

use super::messages::{parse_incoming, ClientRequest, InboundError, Incoming, Response, ServerMessage};

/// Sending half of a connection's outbound queue.
pub type Outbound = mpsc::Sender<ServerMessage>;

/// Lifecycle of a device session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Registering listeners.
    Opening,
    /// Serving requests and pushing state.
    Open,
    /// Unregistering listeners.
    Closing,
    Closed,
}

impl StateMachine for SessionState {
    fn can_transition_to(&self, target: &Self) -> bool {
        use SessionState::*;
        matches!(
            (self, target),
            (Opening, Open) | (Opening, Closing) | (Open, Closing) | (Closing, Closed)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use SessionState::*;
        match self {
            Opening => vec![Open, Closing],
            Open => vec![Closing],
            Closing => vec![Closed],
            Closed => vec![],
        }
    }
}

/// Wraps state updates into `showDeviceState` notifications for one connection.
struct StatePushListener {
    session_id: SessionId,
    outbound: Outbound,
}

#[async_trait]
impl DeviceListener for StatePushListener {
    async fn on_state(&self, device: DeviceName, state: DeviceState) -> Result<(), DomainError> {
        match self.outbound.try_send(ServerMessage::show_device_state(state)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                tracing::warn!(
                    session_id = %self.session_id,
                    device = %device,
                    "Outbound queue full, dropping state push"
                );
                Err(DomainError::new(
                    ErrorCode::OutboundQueueFull,
                    format!("Session {} is not keeping up", self.session_id),
                )
                .with_detail("device", device.as_str()))
            }
            Err(TrySendError::Closed(_)) => Err(DomainError::new(
                ErrorCode::ConnectionClosed,
                format!("Session {} is no longer connected", self.session_id),
            )
            .with_detail("device", device.as_str())),
        }
    }

    fn name(&self) -> &'static str {
        "StatePushListener"
    }
}

/// Protocol handler for one WebSocket connection.
pub struct DeviceSession {
    id: SessionId,
    controller: Arc<DeviceController>,
    outbound: Outbound,
    state: Mutex<SessionState>,
    registrations: Mutex<Vec<(DeviceName, Arc<dyn DeviceListener>)>>,
}

impl DeviceSession {
    /// Create a session writing to `outbound`. Call [`open`](Self::open) next.
    pub fn new(controller: Arc<DeviceController>, outbound: Outbound) -> Self {
        Self {
            id: SessionId::new(),
            controller,
            outbound,
            state: Mutex::new(SessionState::Opening),
            registrations: Mutex::new(Vec::new()),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub async fn state(&self) -> SessionState {
        *self.state.lock().await
    }

    /// Devices this session currently has a listener registered for.
    pub async fn registered_devices(&self) -> Vec<DeviceName> {
        self.registrations
            .lock()
            .await
            .iter()
            .map(|(device, _)| *device)
            .collect()
    }

    /// Register a state-push listener for every catalog device.
    ///
    /// A device whose registration fails is logged and skipped; the session
    /// opens with whatever succeeded.
    ///
    /// # Errors
    ///
    /// Returns an error only if the session is not in `Opening`.
    pub async fn open(&self) -> Result<(), DomainError> {
        let mut state = self.state.lock().await;
        let next = state.transition_to(SessionState::Open)?;

        let mut registrations = self.registrations.lock().await;
        for device in DeviceName::ALL {
            let listener: Arc<dyn DeviceListener> = Arc::new(StatePushListener {
                session_id: self.id,
                outbound: self.outbound.clone(),
            });
            match self
                .controller
                .subscribe_to_device(device, listener.clone())
                .await
            {
                Ok(()) => registrations.push((device, listener)),
                Err(e) => {
                    tracing::warn!(
                        session_id = %self.id,
                        device = %device,
                        error = %e,
                        "Failed to register device listener"
                    );
                }
            }
        }

        *state = next;
        tracing::info!(
            session_id = %self.id,
            devices = registrations.len(),
            "Device session opened"
        );
        Ok(())
    }

    /// Handle one text frame from the client.
    ///
    /// Requests are answered with a response envelope echoing their id.
    /// Frames that cannot be handled get an error envelope when an id can
    /// be recovered and are dropped otherwise.
    pub async fn handle_text(&self, text: &str) {
        if *self.state.lock().await != SessionState::Open {
            tracing::debug!(session_id = %self.id, "Ignoring frame on inactive session");
            return;
        }

        match parse_incoming(text) {
            Ok(Incoming::Request(request)) => {
                let id = request.id().clone();
                let method = request.method();
                let response = match self.handle_request(request).await {
                    Ok(result) => Response::success(id, result),
                    Err(e) => {
                        tracing::warn!(
                            session_id = %self.id,
                            request_id = %id,
                            method = %method,
                            error = %e,
                            "Request failed"
                        );
                        Response::error(id, e.message)
                    }
                };
                self.send(response.into()).await;
            }
            Ok(Incoming::Response { id }) => {
                tracing::debug!(
                    session_id = %self.id,
                    request_id = ?id,
                    "Ignoring client response"
                );
            }
            Err(InboundError { id: Some(id), error }) => {
                tracing::debug!(
                    session_id = %self.id,
                    request_id = %id,
                    error = %error,
                    "Rejecting client message"
                );
                self.send(Response::error(id, error.to_string()).into()).await;
            }
            Err(InboundError { id: None, error }) => {
                tracing::debug!(
                    session_id = %self.id,
                    error = %error,
                    "Dropping client message without id"
                );
            }
        }
    }

    async fn handle_request(&self, request: ClientRequest) -> Result<Value, DomainError> {
        match request {
            ClientRequest::SetDeviceState { params, .. } => {
                let device = params.device_name;
                let state = DeviceState::from_value(device, params.state);
                self.controller.set_device_state(device, &state).await?;
                Ok(Value::Bool(true))
            }
            ClientRequest::SubscribeToDevice { params, .. } => {
                self.controller.request_state(params.device_name).await?;
                Ok(Value::Bool(true))
            }
        }
    }

    /// Unregister every listener this session registered.
    ///
    /// Safe to call more than once; later calls do nothing.
    pub async fn close(&self) {
        let mut state = self.state.lock().await;
        let Ok(closing) = state.transition_to(SessionState::Closing) else {
            return;
        };
        *state = closing;

        let registrations = std::mem::take(&mut *self.registrations.lock().await);
        let count = registrations.len();
        for (device, listener) in registrations {
            if let Err(e) = self
                .controller
                .unsubscribe_from_device(device, &listener)
                .await
            {
                tracing::warn!(
                    session_id = %self.id,
                    device = %device,
                    error = %e,
                    "Failed to unregister device listener"
                );
            }
        }

        *state = SessionState::Closed;
        tracing::info!(session_id = %self.id, devices = count, "Device session closed");
    }

    async fn send(&self, message: ServerMessage) {
        if self.outbound.send(message).await.is_err() {
            tracing::debug!(session_id = %self.id, "Connection gone, dropping outbound message");
        }
    }
}
