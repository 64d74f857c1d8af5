//! Bridge command handlers.
//!
//! One async fn per command. Platform actions resolve the sink with
//! `Success(true)` on ack or `Failure{code: <reason code>}` otherwise, and
//! advance the lifecycle only after the platform acked.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::MappedMutexGuard;

use super::{Command, HandlerRegistry, ResultSink};
use crate::bridge::BridgeContext;
use crate::events::BroadcastTranslator;
use crate::lifecycle::{ConnectionState, LifecycleInput};
use crate::platform::{ActionResult, ConnectConfig, NativeAction};
use crate::types::{Error, PeerDevice, Result, SessionHandle};

/// Build the closed command table.
pub fn registry() -> HandlerRegistry<BridgeContext> {
    let mut table: HandlerRegistry<BridgeContext> = HashMap::new();
    table.insert("register", |c, m, s| Box::pin(register(c, m, s)));
    table.insert("unregister", |c, m, s| Box::pin(unregister(c, m, s)));
    table.insert("discover", |c, m, s| Box::pin(discover(c, m, s)));
    table.insert("stopDiscover", |c, m, s| Box::pin(stop_discover(c, m, s)));
    table.insert("connect", |c, m, s| Box::pin(connect(c, m, s)));
    table.insert("cancelConnect", |c, m, s| Box::pin(cancel_connect(c, m, s)));
    table.insert("removeGroup", |c, m, s| Box::pin(remove_group(c, m, s)));
    table.insert("requestLocationPermission", |c, m, s| {
        Box::pin(request_location_permission(c, m, s))
    });
    table.insert("isLocationPermissionGranted", |c, m, s| {
        Box::pin(is_location_permission_granted(c, m, s))
    });
    table.insert("getConnectionState", |c, m, s| {
        Box::pin(get_connection_state(c, m, s))
    });
    table
}

fn resolve_action(sink: &ResultSink, outcome: ActionResult) {
    match outcome {
        Ok(()) => {
            sink.success(true);
        }
        Err(code) => {
            tracing::debug!("{} failed with reason {}", sink.command(), code);
            sink.fail(&Error::from(code));
        }
    }
}

/// Session guard, or the sink failed with the initialization reason.
async fn open_session<'a>(
    ctx: &'a BridgeContext,
    sink: &ResultSink,
) -> Option<MappedMutexGuard<'a, SessionHandle>> {
    match ctx.session().await {
        Ok(session) => Some(session),
        Err(code) => {
            resolve_action(sink, Err(code));
            None
        }
    }
}

// =============================================================================
// Broadcast receiver
// =============================================================================

async fn register(ctx: Arc<BridgeContext>, _command: Command, sink: ResultSink) -> Result<()> {
    let mut receiver = ctx.receiver.lock().await;
    if ctx.is_detached() {
        sink.fail(&Error::Detached);
        return Ok(());
    }
    if receiver.is_some() {
        tracing::debug!("Broadcast receiver already registered");
        sink.success(false);
        return Ok(());
    }

    let broadcasts = ctx.platform.subscribe_broadcasts(&NativeAction::ALL);
    let translator = BroadcastTranslator::new(ctx.pool.clone(), ctx.lifecycle.clone());
    *receiver = Some(translator.spawn(broadcasts));
    tracing::info!("Broadcast receiver registered");

    sink.success(true);
    Ok(())
}

async fn unregister(ctx: Arc<BridgeContext>, _command: Command, sink: ResultSink) -> Result<()> {
    let Some(handle) = ctx.receiver.lock().await.take() else {
        tracing::debug!("Broadcast receiver not registered");
        sink.success(false);
        return Ok(());
    };

    ctx.platform.unsubscribe_broadcasts();
    handle.shutdown().await;
    tracing::info!("Broadcast receiver unregistered");

    sink.success(true);
    Ok(())
}

// =============================================================================
// Platform actions
// =============================================================================

async fn discover(ctx: Arc<BridgeContext>, _command: Command, sink: ResultSink) -> Result<()> {
    let Some(session) = open_session(&ctx, &sink).await else {
        return Ok(());
    };

    let outcome = ctx.platform.discover_peers(&session).await;
    if outcome.is_ok() {
        ctx.lifecycle.apply(LifecycleInput::DiscoverSucceeded);
    }
    resolve_action(&sink, outcome);
    Ok(())
}

async fn stop_discover(ctx: Arc<BridgeContext>, _command: Command, sink: ResultSink) -> Result<()> {
    if !ctx.lifecycle.is_discovery_active() {
        tracing::debug!("stopDiscover with no discovery running");
        sink.success(true);
        return Ok(());
    }

    let Some(session) = open_session(&ctx, &sink).await else {
        return Ok(());
    };

    let outcome = ctx.platform.stop_peer_discovery(&session).await;
    if outcome.is_ok() {
        ctx.lifecycle.apply(LifecycleInput::StopDiscoverSucceeded);
    }
    resolve_action(&sink, outcome);
    Ok(())
}

async fn connect(ctx: Arc<BridgeContext>, command: Command, sink: ResultSink) -> Result<()> {
    let payload = command.bytes_arg("payload")?;
    let peer: PeerDevice = serde_json::from_slice(&payload)?;

    let config = ConnectConfig {
        device_address: peer.device_address,
        wps_setup: ctx.config.connect.wps_setup,
        group_owner_intent: ctx.config.connect.group_owner_intent,
    };

    let Some(session) = open_session(&ctx, &sink).await else {
        return Ok(());
    };

    tracing::debug!("Connecting to {}", config.device_address);
    let outcome = ctx.platform.connect(&session, &config).await;
    if outcome.is_ok() {
        ctx.lifecycle.apply(LifecycleInput::ConnectSucceeded);
    }
    resolve_action(&sink, outcome);
    Ok(())
}

async fn cancel_connect(ctx: Arc<BridgeContext>, _command: Command, sink: ResultSink) -> Result<()> {
    if ctx.lifecycle.state() != ConnectionState::Connecting {
        tracing::debug!("cancelConnect with no connect in flight");
        sink.success(true);
        return Ok(());
    }

    let Some(session) = open_session(&ctx, &sink).await else {
        return Ok(());
    };

    let outcome = ctx.platform.cancel_connect(&session).await;
    if outcome.is_ok() {
        ctx.lifecycle.apply(LifecycleInput::CancelConnectSucceeded);
    }
    resolve_action(&sink, outcome);
    Ok(())
}

async fn remove_group(ctx: Arc<BridgeContext>, _command: Command, sink: ResultSink) -> Result<()> {
    let Some(session) = open_session(&ctx, &sink).await else {
        return Ok(());
    };

    let Some(group) = ctx.platform.request_group_info(&session).await else {
        tracing::debug!("removeGroup with no active group");
        sink.success(true);
        return Ok(());
    };

    tracing::debug!("Removing group {}", group.network_name);
    let previous = ctx.lifecycle.begin_teardown();
    let outcome = ctx.platform.remove_group(&session).await;
    match (&outcome, previous) {
        (Ok(()), _) => {
            ctx.lifecycle.apply(LifecycleInput::RemoveGroupSucceeded);
        }
        (Err(_), Some(previous)) => ctx.lifecycle.abort_teardown(previous),
        (Err(_), None) => {}
    }
    resolve_action(&sink, outcome);
    Ok(())
}

// =============================================================================
// Permissions / queries
// =============================================================================

async fn request_location_permission(
    ctx: Arc<BridgeContext>,
    _command: Command,
    sink: ResultSink,
) -> Result<()> {
    ctx.permissions.request(sink);
    Ok(())
}

async fn is_location_permission_granted(
    ctx: Arc<BridgeContext>,
    _command: Command,
    sink: ResultSink,
) -> Result<()> {
    sink.success(ctx.platform.is_location_permission_granted());
    Ok(())
}

async fn get_connection_state(
    ctx: Arc<BridgeContext>,
    _command: Command,
    sink: ResultSink,
) -> Result<()> {
    sink.success(ctx.lifecycle.state().as_str());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::CommandResult;

    #[test]
    fn test_registry_covers_command_surface() {
        let mut names: Vec<_> = registry().keys().copied().collect();
        names.sort_unstable();
        assert_eq!(
            names,
            vec![
                "cancelConnect",
                "connect",
                "discover",
                "getConnectionState",
                "isLocationPermissionGranted",
                "register",
                "removeGroup",
                "requestLocationPermission",
                "stopDiscover",
                "unregister",
            ]
        );
    }

    #[test]
    fn test_resolve_action_maps_reason_code() {
        let (sink, mut receiver) = ResultSink::channel("discover");
        resolve_action(&sink, Err(crate::platform::ReasonCode::BUSY));
        assert_eq!(
            receiver.try_result(),
            Some(CommandResult::Failure {
                code: "2".to_string(),
                message: None,
            })
        );
    }
}
