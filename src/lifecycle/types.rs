//! Lifecycle types: ConnectionState and the inputs that drive it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Connection lifecycle state.
///
/// State transitions:
/// ```text
/// IDLE → DISCOVERING → CONNECTING → {CONNECTED | GROUP_OWNER | GROUP_MEMBER}
///   ↑         ↓             ↓                       ↓
///   └─────────┴─────────────┴────── IDLE ←── TEARING_DOWN
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Idle,
    Discovering,
    Connecting,
    Connected,
    GroupOwner,
    GroupMember,
    TearingDown,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Discovering => "discovering",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::GroupOwner => "group_owner",
            ConnectionState::GroupMember => "group_member",
            ConnectionState::TearingDown => "tearing_down",
        }
    }

    /// Connected in any role.
    pub fn is_in_group(self) -> bool {
        matches!(
            self,
            ConnectionState::Connected | ConnectionState::GroupOwner | ConnectionState::GroupMember
        )
    }

    /// State reached by `input`, or `None` when this state does not accept it.
    pub fn next(self, input: LifecycleInput) -> Option<ConnectionState> {
        use ConnectionState::*;
        use LifecycleInput::*;

        match (self, input) {
            // IDLE
            (Idle, DiscoverSucceeded) => Some(Discovering),
            (Idle, DiscoveryChanged(true)) => Some(Discovering),
            // DISCOVERING
            (Discovering, StopDiscoverSucceeded) => Some(Idle),
            (Discovering, DiscoveryChanged(false)) => Some(Idle),
            (Idle | Discovering, ConnectSucceeded) => Some(Connecting),
            // CONNECTING
            (Connecting, CancelConnectSucceeded) => Some(Idle),
            // A peer may also connect to us while idle or discovering.
            (
                Idle | Discovering | Connecting | Connected | GroupOwner | GroupMember,
                ConnectionChanged {
                    connected: true,
                    is_group_owner,
                },
            ) => Some(match is_group_owner {
                Some(true) => GroupOwner,
                Some(false) => GroupMember,
                None => Connected,
            }),
            // CONNECTED (any role)
            (
                Connected | GroupOwner | GroupMember | TearingDown,
                ConnectionChanged {
                    connected: false, ..
                },
            ) => Some(Idle),
            // TEARING_DOWN
            (TearingDown, RemoveGroupSucceeded) => Some(Idle),
            // All other inputs leave the state alone
            _ => None,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Something that may advance the lifecycle: a command the platform acked,
/// or a translated broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleInput {
    DiscoverSucceeded,
    StopDiscoverSucceeded,
    ConnectSucceeded,
    CancelConnectSucceeded,
    RemoveGroupSucceeded,
    DiscoveryChanged(bool),
    ConnectionChanged {
        connected: bool,
        is_group_owner: Option<bool>,
    },
}
