//! Peer device and connection values received from the platform.
//!
//! These are immutable snapshots: the lifecycle references them, never
//! mutates them. Field names serialize camelCase to match the host wire format.

use serde::{Deserialize, Serialize};

use super::ids::DeviceAddress;

const DEVICE_CAPAB_SERVICE_DISCOVERY: u32 = 1;
const DEVICE_CAPAB_CLIENT_DISCOVERABILITY: u32 = 1 << 1;
const DEVICE_CAPAB_CONCURRENT_OPER: u32 = 1 << 2;
const DEVICE_CAPAB_INVITATION_PROCEDURE: u32 = 1 << 5;

const GROUP_CAPAB_GROUP_OWNER: u32 = 1;
const GROUP_CAPAB_PERSISTENT_GROUP: u32 = 1 << 1;
const GROUP_CAPAB_GROUP_LIMIT: u32 = 1 << 2;

/// Peer availability as last reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Connected,
    Invited,
    Failed,
    Available,
    #[default]
    Unavailable,
}

/// A peer (or the local device) as seen by the P2P radio.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerDevice {
    pub device_address: DeviceAddress,
    #[serde(default)]
    pub device_name: String,
    #[serde(default)]
    pub primary_device_type: String,
    #[serde(default)]
    pub secondary_device_type: String,
    #[serde(default)]
    pub status: DeviceStatus,
    /// Device capability bit set.
    #[serde(default)]
    pub device_capability: u32,
    /// Group capability bit set.
    #[serde(default)]
    pub group_capability: u32,
}

impl PeerDevice {
    pub fn new(device_address: DeviceAddress) -> Self {
        Self {
            device_address,
            device_name: String::new(),
            primary_device_type: String::new(),
            secondary_device_type: String::new(),
            status: DeviceStatus::default(),
            device_capability: 0,
            group_capability: 0,
        }
    }

    pub fn is_service_discovery_capable(&self) -> bool {
        self.device_capability & DEVICE_CAPAB_SERVICE_DISCOVERY != 0
    }

    pub fn is_client_discoverable(&self) -> bool {
        self.device_capability & DEVICE_CAPAB_CLIENT_DISCOVERABILITY != 0
    }

    pub fn supports_concurrent_operation(&self) -> bool {
        self.device_capability & DEVICE_CAPAB_CONCURRENT_OPER != 0
    }

    pub fn supports_invitation(&self) -> bool {
        self.device_capability & DEVICE_CAPAB_INVITATION_PROCEDURE != 0
    }

    /// True when the peer currently owns a group.
    pub fn is_group_owner(&self) -> bool {
        self.group_capability & GROUP_CAPAB_GROUP_OWNER != 0
    }

    pub fn is_persistent_group(&self) -> bool {
        self.group_capability & GROUP_CAPAB_PERSISTENT_GROUP != 0
    }

    /// True when the peer's group cannot accept more clients.
    pub fn is_group_limit_reached(&self) -> bool {
        self.group_capability & GROUP_CAPAB_GROUP_LIMIT != 0
    }
}

/// Connection info carried by a connection-changed broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
    pub connected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_owner_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_group_owner: Option<bool>,
}

impl ConnectionInfo {
    pub fn disconnected() -> Self {
        Self {
            connected: false,
            group_owner_address: None,
            is_group_owner: None,
        }
    }
}
