//! Event translation — native P2P broadcasts → channel events.
//!
//! Pure deterministic mapping from `{action, extras}` to a typed
//! [`ChannelEvent`].
//!
//! Translation rules:
//!   STATE_CHANGED            → state-change      (`wifi_p2p_state`)
//!   PEERS_CHANGED            → peers-change      (`wifiP2pDeviceList`)
//!   CONNECTION_STATE_CHANGE  → connection-change (`networkInfo`, `wifiP2pInfo`)
//!   THIS_DEVICE_CHANGED      → this-device-change (`wifiP2pDevice`)
//!   DISCOVERY_STATE_CHANGE   → discovery-change  (`discoveryState`: 2 started, 1 stopped)
//!   (all others)             → rejected, not forwarded

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::channels::ChannelEvent;
use crate::platform::{NativeAction, RawBroadcast};
use crate::types::{ConnectionInfo, PeerDevice};

const DISCOVERY_STARTED: i64 = 2;
const DISCOVERY_STOPPED: i64 = 1;

/// Why a broadcast was not forwarded.
#[derive(Error, Debug)]
pub enum TranslationError {
    #[error("unknown broadcast action: {0}")]
    UnknownAction(String),

    #[error("malformed {action} broadcast: {reason}")]
    Malformed { action: &'static str, reason: String },
}

#[derive(Debug, Deserialize)]
struct NetworkInfo {
    connected: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct P2pInfo {
    #[serde(default)]
    group_formed: bool,
    #[serde(default)]
    is_group_owner: bool,
    group_owner_address: Option<String>,
}

/// Translate a native broadcast into its channel payload.
pub fn translate_broadcast(raw: &RawBroadcast) -> Result<ChannelEvent, TranslationError> {
    let action = NativeAction::from_identifier(&raw.action)
        .ok_or_else(|| TranslationError::UnknownAction(raw.action.clone()))?;
    let extras = &raw.extras;

    match action {
        NativeAction::StateChanged => {
            let state = extras
                .get("wifi_p2p_state")
                .and_then(|v| v.as_i64())
                .and_then(|v| i32::try_from(v).ok())
                .ok_or_else(|| malformed(action, "missing integer wifi_p2p_state"))?;
            Ok(ChannelEvent::StateChanged(state))
        }

        NativeAction::PeersChanged => {
            let peers: Vec<PeerDevice> = field(action, extras, "wifiP2pDeviceList")?;
            Ok(ChannelEvent::PeersChanged(peers))
        }

        NativeAction::ConnectionChanged => {
            let network: NetworkInfo = field(action, extras, "networkInfo")?;
            let info: P2pInfo = match extras.get("wifiP2pInfo") {
                Some(value) if !value.is_null() => serde_json::from_value(value.clone())
                    .map_err(|e| malformed(action, format!("wifiP2pInfo: {}", e)))?,
                _ => P2pInfo::default(),
            };

            Ok(ChannelEvent::ConnectionChanged(ConnectionInfo {
                connected: network.connected,
                group_owner_address: info.group_owner_address,
                // Role is only meaningful once the group exists
                is_group_owner: info.group_formed.then_some(info.is_group_owner),
            }))
        }

        NativeAction::ThisDeviceChanged => {
            let device: PeerDevice = field(action, extras, "wifiP2pDevice")?;
            Ok(ChannelEvent::DeviceChanged(device))
        }

        NativeAction::DiscoveryChanged => {
            match extras.get("discoveryState").and_then(|v| v.as_i64()) {
                Some(DISCOVERY_STARTED) => Ok(ChannelEvent::DiscoveryChanged(true)),
                Some(DISCOVERY_STOPPED) => Ok(ChannelEvent::DiscoveryChanged(false)),
                other => Err(malformed(
                    action,
                    format!("unexpected discoveryState {:?}", other),
                )),
            }
        }
    }
}

fn field<T: serde::de::DeserializeOwned>(
    action: NativeAction,
    extras: &Value,
    key: &str,
) -> Result<T, TranslationError> {
    let value = extras
        .get(key)
        .ok_or_else(|| malformed(action, format!("missing {}", key)))?;
    serde_json::from_value(value.clone()).map_err(|e| malformed(action, format!("{}: {}", key, e)))
}

fn malformed(action: NativeAction, reason: impl Into<String>) -> TranslationError {
    TranslationError::Malformed {
        action: action.identifier(),
        reason: reason.into(),
    }
}
