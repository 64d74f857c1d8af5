//! Platform abstraction layer for the P2P session manager.
//!
//! The radio driver, its broadcast mechanism and the permission prompt live
//! outside this crate. Every platform action is a single async operation that
//! resolves to `Ok(())` on ack or the platform's numeric [`ReasonCode`].
//! Broadcasts arrive on a channel the platform feeds from its own thread.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tokio::sync::mpsc;

use crate::types::{DeviceAddress, PeerDevice, SessionHandle};

/// Numeric failure reason reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReasonCode(pub i32);

impl ReasonCode {
    pub const ERROR: ReasonCode = ReasonCode(0);
    pub const P2P_UNSUPPORTED: ReasonCode = ReasonCode(1);
    pub const BUSY: ReasonCode = ReasonCode(2);
    pub const NO_SERVICE_REQUESTS: ReasonCode = ReasonCode(3);
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome of a platform action.
pub type ActionResult = std::result::Result<(), ReasonCode>;

/// WPS provisioning method for a connection request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WpsSetup {
    PushButton,
    Display,
    Keypad,
    Label,
}

/// Connection request handed to [`P2pPlatform::connect`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectConfig {
    pub device_address: DeviceAddress,
    pub wps_setup: WpsSetup,
    pub group_owner_intent: u8,
}

/// Group the local device currently belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupInfo {
    pub network_name: String,
    pub owner: Option<PeerDevice>,
    pub is_group_owner: bool,
    #[serde(default)]
    pub clients: Vec<PeerDevice>,
}

/// Native broadcast actions the translator subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeAction {
    StateChanged,
    PeersChanged,
    ConnectionChanged,
    ThisDeviceChanged,
    DiscoveryChanged,
}

impl NativeAction {
    pub const ALL: [NativeAction; 5] = [
        NativeAction::StateChanged,
        NativeAction::PeersChanged,
        NativeAction::ConnectionChanged,
        NativeAction::ThisDeviceChanged,
        NativeAction::DiscoveryChanged,
    ];

    /// Wire identifier of the broadcast action.
    pub fn identifier(self) -> &'static str {
        match self {
            NativeAction::StateChanged => "android.net.wifi.p2p.STATE_CHANGED",
            NativeAction::PeersChanged => "android.net.wifi.p2p.PEERS_CHANGED",
            NativeAction::ConnectionChanged => "android.net.wifi.p2p.CONNECTION_STATE_CHANGE",
            NativeAction::ThisDeviceChanged => "android.net.wifi.p2p.THIS_DEVICE_CHANGED",
            NativeAction::DiscoveryChanged => "android.net.wifi.p2p.DISCOVERY_STATE_CHANGE",
        }
    }

    pub fn from_identifier(identifier: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|action| action.identifier() == identifier)
    }
}

/// A raw broadcast as delivered by the platform: an action identifier and
/// loosely-typed extras.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawBroadcast {
    pub action: String,
    #[serde(default)]
    pub extras: Value,
}

impl RawBroadcast {
    pub fn new(action: NativeAction, extras: Value) -> Self {
        Self {
            action: action.identifier().to_string(),
            extras,
        }
    }
}

/// P2P session manager operations.
///
/// Completion of each action may be delivered on any thread; callers must
/// not assume it resolves on the task that issued it.
#[async_trait]
pub trait P2pPlatform: Send + Sync {
    /// Open the session handle every other action requires.
    async fn initialize_session(&self) -> std::result::Result<SessionHandle, ReasonCode>;

    async fn discover_peers(&self, session: &SessionHandle) -> ActionResult;

    async fn stop_peer_discovery(&self, session: &SessionHandle) -> ActionResult;

    async fn connect(&self, session: &SessionHandle, config: &ConnectConfig) -> ActionResult;

    async fn cancel_connect(&self, session: &SessionHandle) -> ActionResult;

    /// Current group, or `None` when the device is not in one.
    async fn request_group_info(&self, session: &SessionHandle) -> Option<GroupInfo>;

    async fn remove_group(&self, session: &SessionHandle) -> ActionResult;

    /// Start delivering broadcasts for `actions`.
    fn subscribe_broadcasts(&self, actions: &[NativeAction]) -> mpsc::UnboundedReceiver<RawBroadcast>;

    /// Stop delivering broadcasts. Must tolerate being called when not subscribed.
    fn unsubscribe_broadcasts(&self);

    /// Synchronous check of the fine-location runtime permission.
    fn is_location_permission_granted(&self) -> bool;
}

/// Per-permission answer returned by the prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionGrant {
    Granted,
    Denied,
}

/// Host surface able to show a runtime permission prompt.
///
/// The answer comes back later through
/// [`P2pBridge::on_permission_result`](crate::bridge::P2pBridge::on_permission_result).
#[cfg_attr(test, mockall::automock)]
pub trait PermissionHost: Send + Sync {
    fn request_location_permission(&self, request_code: i32);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_identifier_round_trip() {
        for action in NativeAction::ALL {
            assert_eq!(NativeAction::from_identifier(action.identifier()), Some(action));
        }
        assert_eq!(NativeAction::from_identifier("android.net.wifi.STATE_CHANGE"), None);
    }

    #[test]
    fn test_reason_code_display() {
        assert_eq!(ReasonCode::BUSY.to_string(), "2");
        assert_eq!(ReasonCode(-7).to_string(), "-7");
    }
}
