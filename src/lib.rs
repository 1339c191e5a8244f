//! Nexus Hub - Smart-home dashboard backend
//!
//! This crate bridges dashboard WebSocket connections to Zigbee devices
//! reachable through an MQTT gateway.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
