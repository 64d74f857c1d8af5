//! Core types for the bridge.
//!
//! This module provides foundational types used throughout the system:
//! - **IDs**: Strongly-typed identifiers (SessionHandle, DeviceAddress)
//! - **Errors**: Application error types with thiserror derives
//! - **Config**: Connection policy, permission and observability settings
//! - **Device**: Peer device and connection info values received from the platform

mod config;
mod device;
mod errors;
mod ids;

pub use config::{
    Config, ConnectPolicy, ObservabilityConfig, PermissionConfig, MAX_GROUP_OWNER_INTENT,
};
pub use device::{ConnectionInfo, DeviceStatus, PeerDevice};
pub use errors::{Error, Result};
pub use ids::{DeviceAddress, SessionHandle};
