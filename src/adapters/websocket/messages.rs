//! WebSocket message types for device control.
//!
//! Every frame carries one JSON-RPC 2.0 style envelope:
//! - Client → Server: `setDeviceState` and `subscribeToDevice` requests
//! - Server → Client: responses to those requests, and unsolicited
//!   `showDeviceState` notifications that reuse the request shape
//!
//! ```json
//! {"id":"abc","jsonrpc":"2.0","method":"setDeviceState",
//!  "params":{"deviceName":"desk_lamp","state":{"state":"ON"}}}
//! {"id":"abc","jsonrpc":"2.0","result":true}
//! ```

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::foundation::RequestId;
use crate::domain::zigbee::{DeviceName, DeviceState};

// ============================================
// Envelope
// ============================================

/// Protocol version tag carried in every envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum JsonRpcVersion {
    #[default]
    #[serde(rename = "2.0")]
    V2,
}

impl JsonRpcVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            JsonRpcVersion::V2 => "2.0",
        }
    }
}

/// The closed method catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Method {
    /// Command a device (client → server).
    SetDeviceState,
    /// Ask for a fresh state snapshot (client → server).
    SubscribeToDevice,
    /// State push (server → client notification).
    ShowDeviceState,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::SetDeviceState => "setDeviceState",
            Method::SubscribeToDevice => "subscribeToDevice",
            Method::ShowDeviceState => "showDeviceState",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "setDeviceState" => Ok(Method::SetDeviceState),
            "subscribeToDevice" => Ok(Method::SubscribeToDevice),
            "showDeviceState" => Ok(Method::ShowDeviceState),
            other => Err(ProtocolError::UnknownMethod(other.to_string())),
        }
    }
}

/// Request (or notification) envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request<P> {
    pub id: RequestId,
    pub jsonrpc: JsonRpcVersion,
    pub method: Method,
    pub params: P,
}

/// Exactly one of `result` or `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Result(Value),
    Error(String),
}

/// Response envelope, echoing the id of the request it answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: RequestId,
    pub jsonrpc: JsonRpcVersion,
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl Response {
    /// Successful response carrying `result`.
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            id,
            jsonrpc: JsonRpcVersion::V2,
            outcome: Outcome::Result(result),
        }
    }

    /// Error response carrying a description.
    pub fn error(id: RequestId, message: impl Into<String>) -> Self {
        Self {
            id,
            jsonrpc: JsonRpcVersion::V2,
            outcome: Outcome::Error(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Result(_))
    }
}

// ============================================
// Params
// ============================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetDeviceStateParams {
    #[serde(alias = "deviceId")]
    pub device_name: DeviceName,
    /// Any JSON; forwarded to the device unchanged.
    pub state: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeToDeviceParams {
    #[serde(alias = "deviceId")]
    pub device_name: DeviceName,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShowDeviceStateParams {
    pub device_name: DeviceName,
    pub state: DeviceState,
}

// ============================================
// Server → Client Messages
// ============================================

/// Anything the server writes to a connection.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ServerMessage {
    /// Unsolicited state push.
    Notification(Request<ShowDeviceStateParams>),
    /// Reply to a client request.
    Response(Response),
}

impl ServerMessage {
    /// Build a `showDeviceState` notification with a freshly minted id.
    pub fn show_device_state(state: DeviceState) -> Self {
        ServerMessage::Notification(Request {
            id: RequestId::generate(),
            jsonrpc: JsonRpcVersion::V2,
            method: Method::ShowDeviceState,
            params: ShowDeviceStateParams {
                device_name: state.device(),
                state,
            },
        })
    }

    /// Serialize to the text of one frame.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl From<Response> for ServerMessage {
    fn from(response: Response) -> Self {
        ServerMessage::Response(response)
    }
}

// ============================================
// Client → Server Messages
// ============================================

/// A request the server knows how to handle.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientRequest {
    SetDeviceState {
        id: RequestId,
        params: SetDeviceStateParams,
    },
    SubscribeToDevice {
        id: RequestId,
        params: SubscribeToDeviceParams,
    },
}

impl ClientRequest {
    pub fn id(&self) -> &RequestId {
        match self {
            ClientRequest::SetDeviceState { id, .. } => id,
            ClientRequest::SubscribeToDevice { id, .. } => id,
        }
    }

    pub fn method(&self) -> Method {
        match self {
            ClientRequest::SetDeviceState { .. } => Method::SetDeviceState,
            ClientRequest::SubscribeToDevice { .. } => Method::SubscribeToDevice,
        }
    }
}

/// A successfully classified inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    Request(ClientRequest),
    /// Reply to a server-issued request. Not acted upon.
    Response { id: Option<RequestId> },
}

/// Why an inbound frame could not be handled.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Malformed(String),

    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(String),

    #[error("unknown method: {0}")]
    UnknownMethod(String),

    #[error("method {0} cannot be sent by clients")]
    NotAcceptedFromClient(Method),

    #[error("invalid params for {method}: {reason}")]
    InvalidParams { method: Method, reason: String },
}

/// A protocol error plus the request id, when one could be recovered.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{error}")]
pub struct InboundError {
    pub id: Option<RequestId>,
    pub error: ProtocolError,
}

/// Classify one inbound text frame.
///
/// The request id is recovered as early as possible so that even a
/// rejected request can be answered with an error envelope.
pub fn parse_incoming(text: &str) -> Result<Incoming, InboundError> {
    let value: Value = serde_json::from_str(text).map_err(|e| InboundError {
        id: None,
        error: ProtocolError::Malformed(e.to_string()),
    })?;

    let Value::Object(mut envelope) = value else {
        return Err(InboundError {
            id: None,
            error: ProtocolError::Malformed("envelope must be a JSON object".to_string()),
        });
    };

    let id = envelope
        .get("id")
        .and_then(Value::as_str)
        .and_then(|raw| RequestId::new(raw).ok());
    let fail = |error: ProtocolError| InboundError {
        id: id.clone(),
        error,
    };

    match envelope.get("jsonrpc") {
        None => {}
        Some(Value::String(tag)) if tag == JsonRpcVersion::V2.as_str() => {}
        Some(other) => return Err(fail(ProtocolError::UnsupportedVersion(other.to_string()))),
    }

    if let Some(method) = envelope.get("method") {
        let method: Method = method
            .as_str()
            .ok_or_else(|| fail(ProtocolError::Malformed("method must be a string".to_string())))?
            .parse()
            .map_err(fail)?;
        let request_id = id
            .clone()
            .ok_or_else(|| fail(ProtocolError::Malformed("request has no id".to_string())))?;
        let params = envelope.remove("params").unwrap_or(Value::Null);

        let request = match method {
            Method::SetDeviceState => ClientRequest::SetDeviceState {
                id: request_id,
                params: decode_params(method, params).map_err(fail)?,
            },
            Method::SubscribeToDevice => ClientRequest::SubscribeToDevice {
                id: request_id,
                params: decode_params(method, params).map_err(fail)?,
            },
            Method::ShowDeviceState => {
                return Err(fail(ProtocolError::NotAcceptedFromClient(method)));
            }
        };
        return Ok(Incoming::Request(request));
    }

    if envelope.contains_key("result") || envelope.contains_key("error") {
        return Ok(Incoming::Response { id });
    }

    Err(fail(ProtocolError::Malformed(
        "envelope has neither method nor result/error".to_string(),
    )))
}

fn decode_params<P: DeserializeOwned>(method: Method, params: Value) -> Result<P, ProtocolError> {
    serde_json::from_value(params).map_err(|e| ProtocolError::InvalidParams {
        method,
        reason: e.to_string(),
    })
}
