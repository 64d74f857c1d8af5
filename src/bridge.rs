//! P2P bridge — the attach/detach scoped context.
//!
//! A [`P2pBridge`] owns everything one host attachment needs: the event
//! channel pool, the connection lifecycle, the permission broker, the lazily
//! opened platform session and the broadcast translator started by
//! `register`. Dropping the host means calling [`P2pBridge::detach`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{watch, MappedMutexGuard, Mutex, MutexGuard};

use crate::channels::{EventCategory, EventChannelPool, EventStream, PoolStats};
use crate::dispatch::{handlers, Command, CommandDispatcher, CommandResult, ResultSink};
use crate::events::TranslatorHandle;
use crate::lifecycle::{ConnectionLifecycle, ConnectionState, PermissionBroker};
use crate::platform::{P2pPlatform, PermissionGrant, PermissionHost, ReasonCode};
use crate::types::{Config, Error, Result, SessionHandle};

/// State shared by every command handler.
pub struct BridgeContext {
    pub(crate) config: Config,
    pub(crate) platform: Arc<dyn P2pPlatform>,
    pub(crate) pool: EventChannelPool,
    pub(crate) lifecycle: Arc<ConnectionLifecycle>,
    pub(crate) permissions: PermissionBroker,
    session: Mutex<Option<SessionHandle>>,
    /// Translator started by `register`. `detached` is only set while this
    /// lock is held, so a subscription can never outlive a detach.
    pub(crate) receiver: Mutex<Option<TranslatorHandle>>,
    detached: AtomicBool,
}

impl std::fmt::Debug for BridgeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeContext")
            .field("config", &self.config)
            .field("lifecycle", &self.lifecycle)
            .field("permissions", &self.permissions)
            .finish_non_exhaustive()
    }
}

impl BridgeContext {
    pub(crate) fn is_detached(&self) -> bool {
        self.detached.load(Ordering::Acquire)
    }

    /// Lock the session, opening it on first use.
    ///
    /// The guard serializes platform actions; hold it for the whole action.
    pub(crate) async fn session(
        &self,
    ) -> std::result::Result<MappedMutexGuard<'_, SessionHandle>, ReasonCode> {
        let mut slot = self.session.lock().await;
        if slot.is_none() {
            let handle = self.platform.initialize_session().await?;
            tracing::info!("P2P session initialized: {}", handle);
            *slot = Some(handle);
        }
        MutexGuard::try_map(slot, |slot| slot.as_mut()).map_err(|_| ReasonCode::ERROR)
    }
}

/// Host-facing entry point: commands in, events out.
#[derive(Debug)]
pub struct P2pBridge {
    context: Arc<BridgeContext>,
    dispatcher: CommandDispatcher<BridgeContext>,
}

impl P2pBridge {
    /// Attach to `platform`: validate config and register every event channel.
    ///
    /// Command handlers run on the runtime this is awaited on.
    pub async fn attach(platform: Arc<dyn P2pPlatform>, config: Config) -> Result<Self> {
        config.validate()?;

        let pool = EventChannelPool::new();
        pool.register_all().await;

        let context = Arc::new(BridgeContext {
            permissions: PermissionBroker::new(config.permissions.request_code),
            config,
            platform,
            pool,
            lifecycle: Arc::new(ConnectionLifecycle::new()),
            session: Mutex::new(None),
            receiver: Mutex::new(None),
            detached: AtomicBool::new(false),
        });

        tracing::info!("P2P bridge attached");
        Ok(Self {
            dispatcher: CommandDispatcher::new(
                context.clone(),
                Handle::current(),
                handlers::registry,
            ),
            context,
        })
    }

    pub fn is_detached(&self) -> bool {
        self.context.is_detached()
    }

    /// Route a command; `sink` is resolved exactly once. May be called from
    /// any thread.
    pub fn dispatch(&self, command: Command, sink: ResultSink) {
        if self.is_detached() {
            tracing::debug!("Command {} after detach", command.name);
            sink.fail(&Error::Detached);
            return;
        }
        self.dispatcher.dispatch(command, sink);
    }

    /// Dispatch and wait for the result.
    pub async fn call(&self, command: Command) -> CommandResult {
        let (sink, receiver) = ResultSink::channel(&command.name);
        self.dispatch(command, sink);
        receiver.await
    }

    pub fn command_names(&self) -> Vec<&'static str> {
        self.dispatcher.command_names()
    }

    // =========================================================================
    // Events
    // =========================================================================

    pub async fn subscribe(&self, category: EventCategory) -> Result<EventStream> {
        self.context.pool.subscribe(category).await
    }

    /// Subscribe by wire name, e.g. `bc/peers-change`.
    pub async fn subscribe_channel(&self, name: &str) -> Result<EventStream> {
        let category =
            EventCategory::from_channel_name(name).ok_or_else(|| Error::unknown_channel(name))?;
        self.subscribe(category).await
    }

    pub async fn pool_stats(&self) -> PoolStats {
        self.context.pool.stats().await
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    pub fn connection_state(&self) -> ConnectionState {
        self.context.lifecycle.state()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.context.lifecycle.watch()
    }

    // =========================================================================
    // Permissions
    // =========================================================================

    pub fn attach_permission_host(&self, host: Arc<dyn PermissionHost>) {
        self.context.permissions.attach_host(host);
    }

    /// Host went away but the bridge stays; a pending request is answered
    /// through whichever host attaches next.
    pub fn detach_permission_host(&self) {
        self.context.permissions.detach_host();
    }

    /// Answer from the permission prompt. Returns `true` when it resolved a
    /// pending `requestLocationPermission`.
    pub fn on_permission_result(&self, request_code: i32, grants: &[PermissionGrant]) -> bool {
        self.context.permissions.on_result(request_code, grants)
    }

    /// Tear down: stop the translator, unsubscribe, fail any pending
    /// permission request, drop the session and reset the lifecycle.
    /// Later commands fail with `detached`.
    pub async fn detach(&self) {
        let receiver = {
            let mut slot = self.context.receiver.lock().await;
            if self.context.detached.swap(true, Ordering::AcqRel) {
                return;
            }
            slot.take()
        };

        if let Some(handle) = receiver {
            self.context.platform.unsubscribe_broadcasts();
            handle.shutdown().await;
        }

        self.context.permissions.abandon("bridge detached");
        self.context.permissions.detach_host();
        self.context.session.lock().await.take();
        self.context.lifecycle.reset();

        tracing::info!("P2P bridge detached");
    }
}
