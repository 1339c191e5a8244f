//! Domain layer containing the device vocabulary.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (IDs, timestamps, errors, state machine)
//! - `zigbee` - Device catalog, per-device state shapes and topic naming

pub mod foundation;
pub mod zigbee;
