//! Foundation module - Shared domain primitives.
//!
//! Identifiers, timestamps, the state machine trait and the error types
//! used across the device bridge and the session protocol.

mod errors;
mod ids;
mod state_machine;
mod timestamp;

pub use errors::{DomainError, ErrorCode, ValidationError};
pub use ids::{RequestId, SessionId};
pub use state_machine::StateMachine;
pub use timestamp::Timestamp;
