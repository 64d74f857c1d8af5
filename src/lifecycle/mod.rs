//! Connection lifecycle management.
//!
//! Implements the discovery/connection/group state machine:
//! IDLE → DISCOVERING → CONNECTING → CONNECTED → TEARING_DOWN → IDLE
//!
//! Commands advance it once the platform acks them; translated broadcasts
//! advance it independently. The state is owned here and only observed
//! elsewhere through a `watch` channel.

pub mod permissions;
pub mod types;

use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::channels::ChannelEvent;

pub use permissions::PermissionBroker;
pub use types::{ConnectionState, LifecycleInput};

/// Lifecycle manager - sole owner of the connection state.
///
/// Shared behind an `Arc`; transitions are atomic through `send_if_modified`.
///
/// Whether peer discovery runs is tracked apart from the state: a connect
/// leaves DISCOVERING while the platform keeps scanning.
#[derive(Debug)]
pub struct ConnectionLifecycle {
    state: watch::Sender<ConnectionState>,
    discovery_active: AtomicBool,
}

impl ConnectionLifecycle {
    pub fn new() -> Self {
        let (state, _) = watch::channel(ConnectionState::Idle);
        Self {
            state,
            discovery_active: AtomicBool::new(false),
        }
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Receiver notified on every state change.
    pub fn watch(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Stream yielding the current state, then each change.
    pub fn state_stream(&self) -> WatchStream<ConnectionState> {
        WatchStream::new(self.state.subscribe())
    }

    /// True between a discover ack (or discovery-started broadcast) and the
    /// matching stop.
    pub fn is_discovery_active(&self) -> bool {
        self.discovery_active.load(Ordering::Acquire)
    }

    /// Apply an input. Returns the new state when it caused a transition.
    pub fn apply(&self, input: LifecycleInput) -> Option<ConnectionState> {
        match input {
            LifecycleInput::DiscoverSucceeded | LifecycleInput::DiscoveryChanged(true) => {
                self.discovery_active.store(true, Ordering::Release);
            }
            LifecycleInput::StopDiscoverSucceeded | LifecycleInput::DiscoveryChanged(false) => {
                self.discovery_active.store(false, Ordering::Release);
            }
            _ => {}
        }

        let mut transition = None;
        self.state.send_if_modified(|state| match state.next(input) {
            Some(next) if next != *state => {
                transition = Some((*state, next));
                *state = next;
                true
            }
            _ => false,
        });

        match transition {
            Some((from, to)) => {
                tracing::info!("Connection state {} -> {} ({:?})", from, to, input);
                Some(to)
            }
            None => {
                tracing::debug!("Connection state {} ignores {:?}", self.state(), input);
                None
            }
        }
    }

    /// Feed a translated broadcast. Categories that carry no lifecycle
    /// information are ignored.
    pub fn observe(&self, event: &ChannelEvent) -> Option<ConnectionState> {
        match event {
            ChannelEvent::DiscoveryChanged(running) => {
                self.apply(LifecycleInput::DiscoveryChanged(*running))
            }
            ChannelEvent::ConnectionChanged(info) => self.apply(LifecycleInput::ConnectionChanged {
                connected: info.connected,
                is_group_owner: info.is_group_owner,
            }),
            _ => None,
        }
    }

    /// Enter TEARING_DOWN. Returns the state left behind, so a failed
    /// removal can restore it; `None` when no group was active.
    pub fn begin_teardown(&self) -> Option<ConnectionState> {
        let mut previous = None;
        self.state.send_if_modified(|state| {
            if state.is_in_group() {
                previous = Some(*state);
                *state = ConnectionState::TearingDown;
                true
            } else {
                false
            }
        });

        if let Some(from) = previous {
            tracing::info!("Connection state {} -> {}", from, ConnectionState::TearingDown);
        }
        previous
    }

    /// Undo [`begin_teardown`](Self::begin_teardown) after the platform refused to remove the group.
    pub fn abort_teardown(&self, previous: ConnectionState) {
        let restored = self.state.send_if_modified(|state| {
            if *state == ConnectionState::TearingDown {
                *state = previous;
                true
            } else {
                false
            }
        });

        if restored {
            tracing::info!("Group removal failed, state restored to {}", previous);
        }
    }

    /// Back to IDLE regardless of the current state (detach).
    pub fn reset(&self) {
        self.discovery_active.store(false, Ordering::Release);
        let previous = self.state.send_replace(ConnectionState::Idle);
        if previous != ConnectionState::Idle {
            tracing::info!("Connection state {} -> idle (reset)", previous);
        }
    }
}

impl Default for ConnectionLifecycle {
    fn default() -> Self {
        Self::new()
    }
}
