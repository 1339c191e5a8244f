//! WebSocket adapters for live device control.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                      MessageBroker (MQTT)                         │
//! └──────────────────────────────────────────────────────────────────┘
//!                                  │ BrokerInbox
//!                                  ▼
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                       DeviceController                            │
//! │   desk_lamp ──► [listener a, listener b]                         │
//! │   living_room_floor_lamp ──► [listener a, listener b]            │
//! └──────────────────────────────────────────────────────────────────┘
//!                  │ showDeviceState          ▲ setDeviceState
//!                  ▼                          │ subscribeToDevice
//! ┌──────────────────────────────────────────────────────────────────┐
//! │   DeviceSession (one per connection) ──► outbound ──► writer task │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`messages`] - JSON-RPC style envelope types and parsing
//! - [`session`] - Per-connection protocol handler
//! - [`handler`] - Axum WebSocket upgrade handler

pub mod handler;
pub mod messages;
pub mod session;

pub use handler::{ws_handler, zigbee_router, ZigbeeState};
pub use messages::{
    parse_incoming, ClientRequest, InboundError, Incoming, JsonRpcVersion, Method, Outcome,
    ProtocolError, Request, Response, ServerMessage, SetDeviceStateParams, ShowDeviceStateParams,
    SubscribeToDeviceParams,
};
pub use session::{DeviceSession, Outbound, SessionState};
