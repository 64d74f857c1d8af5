//! Shared test utilities: a scripted in-memory P2P platform.

#![allow(dead_code)]

use async_trait::async_trait;
use base64::Engine as _;
use p2p_bridge::platform::{
    ActionResult, ConnectConfig, GroupInfo, NativeAction, P2pPlatform, PermissionHost,
    RawBroadcast, ReasonCode,
};
use p2p_bridge::types::{DeviceAddress, PeerDevice, SessionHandle};
use p2p_bridge::{Config, P2pBridge};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

pub const TIMEOUT: Duration = Duration::from_secs(2);

/// Platform call as recorded by [`ScriptedPlatform`].
#[derive(Debug, Clone, PartialEq)]
pub enum PlatformCall {
    InitializeSession,
    DiscoverPeers,
    StopPeerDiscovery,
    Connect(ConnectConfig),
    CancelConnect,
    RequestGroupInfo,
    RemoveGroup,
    Subscribe(Vec<NativeAction>),
    Unsubscribe,
}

/// Fake platform: acks every action unless told to fail it, records calls,
/// and emits broadcasts on demand.
#[derive(Debug, Default)]
pub struct ScriptedPlatform {
    calls: Mutex<Vec<PlatformCall>>,
    failures: Mutex<HashMap<&'static str, ReasonCode>>,
    group: Mutex<Option<GroupInfo>>,
    broadcasts: Mutex<Option<mpsc::UnboundedSender<RawBroadcast>>>,
    permission_granted: AtomicBool,
}

impl ScriptedPlatform {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make `action` fail with `code` from now on.
    pub fn fail(&self, action: &'static str, code: ReasonCode) {
        self.failures.lock().unwrap().insert(action, code);
    }

    pub fn set_group(&self, group: Option<GroupInfo>) {
        *self.group.lock().unwrap() = group;
    }

    pub fn set_permission_granted(&self, granted: bool) {
        self.permission_granted.store(granted, Ordering::SeqCst);
    }

    /// Deliver a broadcast. `false` when nobody is subscribed.
    pub fn emit(&self, broadcast: RawBroadcast) -> bool {
        match self.broadcasts.lock().unwrap().as_ref() {
            Some(tx) => tx.send(broadcast).is_ok(),
            None => false,
        }
    }

    pub fn calls(&self) -> Vec<PlatformCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, matches: impl Fn(&PlatformCall) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| matches(c)).count()
    }

    fn record(&self, call: PlatformCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn outcome(&self, action: &'static str) -> ActionResult {
        match self.failures.lock().unwrap().get(action) {
            Some(code) => Err(*code),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl P2pPlatform for ScriptedPlatform {
    async fn initialize_session(&self) -> Result<SessionHandle, ReasonCode> {
        self.record(PlatformCall::InitializeSession);
        self.outcome("initialize_session")?;
        Ok(SessionHandle::new())
    }

    async fn discover_peers(&self, _session: &SessionHandle) -> ActionResult {
        self.record(PlatformCall::DiscoverPeers);
        tokio::task::yield_now().await;
        self.outcome("discover_peers")
    }

    async fn stop_peer_discovery(&self, _session: &SessionHandle) -> ActionResult {
        self.record(PlatformCall::StopPeerDiscovery);
        self.outcome("stop_peer_discovery")
    }

    async fn connect(&self, _session: &SessionHandle, config: &ConnectConfig) -> ActionResult {
        self.record(PlatformCall::Connect(config.clone()));
        tokio::task::yield_now().await;
        self.outcome("connect")
    }

    async fn cancel_connect(&self, _session: &SessionHandle) -> ActionResult {
        self.record(PlatformCall::CancelConnect);
        self.outcome("cancel_connect")
    }

    async fn request_group_info(&self, _session: &SessionHandle) -> Option<GroupInfo> {
        self.record(PlatformCall::RequestGroupInfo);
        self.group.lock().unwrap().clone()
    }

    async fn remove_group(&self, _session: &SessionHandle) -> ActionResult {
        self.record(PlatformCall::RemoveGroup);
        let outcome = self.outcome("remove_group");
        if outcome.is_ok() {
            self.set_group(None);
        }
        outcome
    }

    fn subscribe_broadcasts(&self, actions: &[NativeAction]) -> mpsc::UnboundedReceiver<RawBroadcast> {
        self.record(PlatformCall::Subscribe(actions.to_vec()));
        let (tx, rx) = mpsc::unbounded_channel();
        *self.broadcasts.lock().unwrap() = Some(tx);
        rx
    }

    fn unsubscribe_broadcasts(&self) {
        self.record(PlatformCall::Unsubscribe);
        self.broadcasts.lock().unwrap().take();
    }

    fn is_location_permission_granted(&self) -> bool {
        self.permission_granted.load(Ordering::SeqCst)
    }
}

/// Permission host that only records the request codes it was asked for.
#[derive(Debug, Default)]
pub struct RecordingHost {
    requests: Mutex<Vec<i32>>,
}

impl RecordingHost {
    pub fn requests(&self) -> Vec<i32> {
        self.requests.lock().unwrap().clone()
    }
}

impl PermissionHost for RecordingHost {
    fn request_location_permission(&self, request_code: i32) {
        self.requests.lock().unwrap().push(request_code);
    }
}

/// Attach a bridge with default config.
pub async fn attach(platform: &Arc<ScriptedPlatform>) -> P2pBridge {
    P2pBridge::attach(platform.clone(), Config::default())
        .await
        .expect("attach failed")
}

pub fn address(raw: &str) -> DeviceAddress {
    DeviceAddress::from_string(raw.to_string()).expect("invalid address")
}

/// `connect` payload: base64 of the JSON-encoded peer.
pub fn peer_payload(raw_address: &str) -> String {
    let peer = PeerDevice::new(address(raw_address));
    let json = serde_json::to_vec(&peer).expect("peer serializes");
    base64::engine::general_purpose::STANDARD.encode(json)
}

pub fn group(network_name: &str, is_group_owner: bool) -> GroupInfo {
    GroupInfo {
        network_name: network_name.to_string(),
        owner: None,
        is_group_owner,
        clients: Vec::new(),
    }
}

pub fn connection_broadcast(
    connected: bool,
    group_owner: Option<bool>,
    owner_address: &str,
) -> RawBroadcast {
    let mut info = json!({"groupOwnerAddress": owner_address});
    if let Some(owner) = group_owner {
        info["groupFormed"] = json!(true);
        info["isGroupOwner"] = json!(owner);
    }
    RawBroadcast::new(
        NativeAction::ConnectionChanged,
        json!({"networkInfo": {"connected": connected}, "wifiP2pInfo": info}),
    )
}

pub fn peers_broadcast(names: &[&str]) -> RawBroadcast {
    let peers: Vec<_> = names
        .iter()
        .enumerate()
        .map(|(i, name)| json!({"deviceAddress": format!("02:00:00:00:00:{:02x}", i + 1), "deviceName": name}))
        .collect();
    RawBroadcast::new(NativeAction::PeersChanged, json!({"wifiP2pDeviceList": peers}))
}
