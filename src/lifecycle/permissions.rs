//! Runtime location-permission flow.
//!
//! A request parks its result sink until the host reports the prompt's
//! answer. Only one request may be outstanding: a second one is rejected
//! with `PermissionRequestOverlap` and the first keeps waiting.
//!
//! The host may detach and reattach (a configuration change) while a
//! request is pending; the answer then arrives through the new host. Only a
//! bridge detach abandons the request.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::dispatch::ResultSink;
use crate::platform::{PermissionGrant, PermissionHost};
use crate::types::Error;

#[derive(Default)]
struct BrokerState {
    host: Option<Arc<dyn PermissionHost>>,
    pending: Option<ResultSink>,
}

/// Holds the permission host and the single pending request.
pub struct PermissionBroker {
    request_code: i32,
    state: Mutex<BrokerState>,
}

impl std::fmt::Debug for PermissionBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("PermissionBroker")
            .field("request_code", &self.request_code)
            .field("host_attached", &state.host.is_some())
            .field("pending", &state.pending.is_some())
            .finish()
    }
}

impl PermissionBroker {
    pub fn new(request_code: i32) -> Self {
        Self {
            request_code,
            state: Mutex::new(BrokerState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn request_code(&self) -> i32 {
        self.request_code
    }

    pub fn is_pending(&self) -> bool {
        self.lock().pending.is_some()
    }

    pub fn attach_host(&self, host: Arc<dyn PermissionHost>) {
        self.lock().host = Some(host);
        tracing::debug!("Permission host attached");
    }

    /// Drop the host. A pending request stays pending for the next host.
    pub fn detach_host(&self) {
        let pending = {
            let mut state = self.lock();
            state.host = None;
            state.pending.is_some()
        };
        tracing::debug!("Permission host detached (request pending: {})", pending);
    }

    /// Start a request whose answer resolves `sink`.
    pub fn request(&self, sink: ResultSink) {
        let host = {
            let mut state = self.lock();
            if state.pending.is_some() {
                drop(state);
                tracing::warn!("Permission request rejected: another one is pending");
                sink.fail(&Error::PermissionRequestOverlap);
                return;
            }
            let Some(host) = state.host.clone() else {
                drop(state);
                sink.fail(&Error::NoPermissionHost);
                return;
            };
            state.pending = Some(sink);
            host
        };

        // Outside the lock: a host may answer synchronously.
        tracing::debug!("Requesting location permission (code={})", self.request_code);
        host.request_location_permission(self.request_code);
    }

    /// Deliver the prompt's answer. Returns `true` when it resolved a pending
    /// request; answers for other request codes are ignored.
    pub fn on_result(&self, request_code: i32, grants: &[PermissionGrant]) -> bool {
        if request_code != self.request_code {
            return false;
        }

        let Some(sink) = self.lock().pending.take() else {
            tracing::debug!("Permission result with no pending request");
            return false;
        };

        let granted = grants.first() == Some(&PermissionGrant::Granted);
        tracing::info!("Location permission granted: {}", granted);
        sink.success(granted)
    }

    /// Fail the pending request, if any.
    pub fn abandon(&self, reason: &str) {
        if let Some(sink) = self.lock().pending.take() {
            sink.fail(&Error::abandoned(reason));
        }
    }
}
