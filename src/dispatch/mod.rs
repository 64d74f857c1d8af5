//! Command dispatch — routes named commands to handler functions.
//!
//! The handler set is a closed registry (`name → fn`) built on first dispatch
//! and cached for the life of the dispatcher. Each handler receives the
//! command and a [`ResultSink`] it resolves exactly once, synchronously or
//! later from a platform completion on another task.

pub mod handlers;

use crate::types::{Error, Result};
use base64::Engine as _;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::{Arc, Mutex, OnceLock};
use std::task::{Context, Poll};
use tokio::runtime::Handle;
use tokio::sync::oneshot;

// =============================================================================
// Command / Result
// =============================================================================

/// A named call with loosely-typed arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub name: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

impl Command {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments: Map::new(),
        }
    }

    pub fn with_argument(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.arguments.insert(key.into(), value.into());
        self
    }

    pub fn argument(&self, key: &str) -> Option<&Value> {
        self.arguments.get(key)
    }

    pub fn str_arg(&self, key: &str) -> Result<&str> {
        self.argument(key)
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::validation(format!("Missing required argument: {}", key)))
    }

    /// Byte argument transported as a base64 string.
    pub fn bytes_arg(&self, key: &str) -> Result<Vec<u8>> {
        let encoded = self.str_arg(key)?;
        Ok(base64::engine::general_purpose::STANDARD.decode(encoded)?)
    }
}

/// Outcome delivered to the host, exactly once per command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "body", rename_all = "snake_case")]
pub enum CommandResult {
    Success(Value),
    Failure {
        code: String,
        message: Option<String>,
    },
    /// No handler exists for the command name.
    NotImplemented,
}

impl CommandResult {
    pub fn from_error(err: &Error) -> Self {
        match err {
            Error::UnknownCommand(_) => CommandResult::NotImplemented,
            other => CommandResult::Failure {
                code: other.failure_code(),
                message: other.failure_message(),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, CommandResult::Success(_))
    }

    /// Success payload, if any.
    pub fn value(&self) -> Option<&Value> {
        match self {
            CommandResult::Success(value) => Some(value),
            _ => None,
        }
    }

    /// Failure code, if any.
    pub fn failure_code(&self) -> Option<&str> {
        match self {
            CommandResult::Failure { code, .. } => Some(code),
            _ => None,
        }
    }

    fn abandoned(command: &str) -> Self {
        CommandResult::Failure {
            code: "abandoned".to_string(),
            message: Some(format!("{} was dropped without a result", command)),
        }
    }
}

// =============================================================================
// ResultSink
// =============================================================================

struct SinkSlot {
    command: String,
    tx: Mutex<Option<oneshot::Sender<CommandResult>>>,
}

impl SinkSlot {
    fn take(&self) -> Option<oneshot::Sender<CommandResult>> {
        match self.tx.lock() {
            Ok(mut tx) => tx.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }
}

impl Drop for SinkSlot {
    fn drop(&mut self) {
        if let Some(tx) = self.take() {
            tracing::warn!("Result for {} abandoned", self.command);
            let _ = tx.send(CommandResult::abandoned(&self.command));
        }
    }
}

/// One-shot result handle. Clones share the slot: the first resolution wins
/// and later ones are ignored. Dropping every clone unresolved delivers an
/// `abandoned` failure.
#[derive(Clone)]
pub struct ResultSink {
    slot: Arc<SinkSlot>,
}

impl fmt::Debug for ResultSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultSink")
            .field("command", &self.slot.command)
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

impl ResultSink {
    /// Create a sink and the receiver its result arrives on.
    pub fn channel(command: impl Into<String>) -> (ResultSink, ResultReceiver) {
        let (tx, rx) = oneshot::channel();
        let sink = ResultSink {
            slot: Arc::new(SinkSlot {
                command: command.into(),
                tx: Mutex::new(Some(tx)),
            }),
        };
        (sink, ResultReceiver { rx })
    }

    pub fn command(&self) -> &str {
        &self.slot.command
    }

    /// Deliver `result`. Returns `false` when a result was already delivered.
    pub fn resolve(&self, result: CommandResult) -> bool {
        match self.slot.take() {
            Some(tx) => {
                // Receiver gone means the host stopped waiting; still counts as delivered.
                let _ = tx.send(result);
                true
            }
            None => {
                tracing::warn!(
                    "Result for {} already delivered, dropping {:?}",
                    self.slot.command,
                    result
                );
                false
            }
        }
    }

    pub fn success(&self, value: impl Into<Value>) -> bool {
        self.resolve(CommandResult::Success(value.into()))
    }

    pub fn fail(&self, err: &Error) -> bool {
        self.resolve(CommandResult::from_error(err))
    }

    pub fn not_implemented(&self) -> bool {
        self.resolve(CommandResult::NotImplemented)
    }

    pub fn is_resolved(&self) -> bool {
        match self.slot.tx.lock() {
            Ok(tx) => tx.is_none(),
            Err(poisoned) => poisoned.into_inner().is_none(),
        }
    }
}

/// Host side of a [`ResultSink`]. Resolves to the command's result.
#[derive(Debug)]
pub struct ResultReceiver {
    rx: oneshot::Receiver<CommandResult>,
}

impl ResultReceiver {
    /// Non-blocking check; `None` while the result is still pending.
    pub fn try_result(&mut self) -> Option<CommandResult> {
        self.rx.try_recv().ok()
    }
}

impl Future for ResultReceiver {
    type Output = CommandResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|result| {
            result.unwrap_or_else(|_| CommandResult::Failure {
                code: "abandoned".to_string(),
                message: None,
            })
        })
    }
}

// =============================================================================
// Dispatcher
// =============================================================================

/// Future returned by a handler. `Err` is reported as a handler fault.
pub type HandlerFuture = BoxFuture<'static, Result<()>>;

/// Handler entry point. `C` is the context every handler shares.
pub type HandlerFn<C> = fn(Arc<C>, Command, ResultSink) -> HandlerFuture;

/// Closed `name → handler` table.
pub type HandlerRegistry<C> = HashMap<&'static str, HandlerFn<C>>;

/// Routes commands by name to handlers from a closed registry.
pub struct CommandDispatcher<C> {
    context: Arc<C>,
    runtime: Handle,
    build_registry: fn() -> HandlerRegistry<C>,
    handlers: OnceLock<HandlerRegistry<C>>,
}

impl<C> fmt::Debug for CommandDispatcher<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandDispatcher")
            .field("handlers_built", &self.handlers.get().is_some())
            .finish()
    }
}

impl<C: Send + Sync + 'static> CommandDispatcher<C> {
    /// Handlers run on `runtime`, whichever thread `dispatch` is called from.
    pub fn new(
        context: Arc<C>,
        runtime: Handle,
        build_registry: fn() -> HandlerRegistry<C>,
    ) -> Self {
        Self {
            context,
            runtime,
            build_registry,
            handlers: OnceLock::new(),
        }
    }

    fn handlers(&self) -> &HandlerRegistry<C> {
        self.handlers.get_or_init(|| {
            let handlers = (self.build_registry)();
            tracing::debug!("Handler registry built with {} commands", handlers.len());
            handlers
        })
    }

    /// Route `command` and return immediately.
    ///
    /// Safe to call from any thread, inside a runtime or not. Unknown names
    /// resolve `NotImplemented`; a handler that errors or panics before
    /// resolving yields `Failure{code: <name>}`.
    pub fn dispatch(&self, command: Command, sink: ResultSink) {
        let Some(handler) = self.handlers().get(command.name.as_str()).copied() else {
            tracing::debug!("No handler for command: {}", command.name);
            sink.fail(&Error::unknown_command(&command.name));
            return;
        };

        tracing::debug!("Command: {}", command.name);
        let context = self.context.clone();
        let name = command.name.clone();

        self.runtime.spawn(async move {
            let outcome = AssertUnwindSafe(handler(context, command, sink.clone()))
                .catch_unwind()
                .await;

            let message = match outcome {
                Ok(Ok(())) => return,
                Ok(Err(err)) => err.to_string(),
                Err(panic) => panic_message(panic.as_ref()),
            };

            if !sink.fail(&Error::handler_threw(&name, &message)) {
                tracing::warn!("Handler {} failed after resolving: {}", name, message);
            } else {
                tracing::warn!("Handler {} failed: {}", name, message);
            }
        });
    }

    /// Dispatch and wait for the result.
    pub async fn call(&self, command: Command) -> CommandResult {
        let (sink, receiver) = ResultSink::channel(&command.name);
        self.dispatch(command, sink);
        receiver.await
    }

    /// Registered command names, sorted.
    pub fn command_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.handlers().keys().copied().collect();
        names.sort_unstable();
        names
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "handler panicked".to_string()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Default)]
    struct Counter {
        calls: AtomicUsize,
    }

    async fn echo(ctx: Arc<Counter>, command: Command, sink: ResultSink) -> Result<()> {
        ctx.calls.fetch_add(1, Ordering::SeqCst);
        sink.success(command.argument("value").cloned().unwrap_or(Value::Null));
        Ok(())
    }

    async fn later(_ctx: Arc<Counter>, _command: Command, sink: ResultSink) -> Result<()> {
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            sink.success(true);
        });
        Ok(())
    }

    async fn fails(_ctx: Arc<Counter>, _command: Command, _sink: ResultSink) -> Result<()> {
        Err(Error::validation("boom"))
    }

    async fn panics(_ctx: Arc<Counter>, _command: Command, _sink: ResultSink) -> Result<()> {
        panic!("handler exploded")
    }

    async fn resolves_then_fails(
        _ctx: Arc<Counter>,
        _command: Command,
        sink: ResultSink,
    ) -> Result<()> {
        sink.success(1);
        Err(Error::validation("too late"))
    }

    async fn forgets(_ctx: Arc<Counter>, _command: Command, _sink: ResultSink) -> Result<()> {
        Ok(())
    }

    fn test_registry() -> HandlerRegistry<Counter> {
        let mut table: HandlerRegistry<Counter> = HashMap::new();
        table.insert("echo", |c, m, s| Box::pin(echo(c, m, s)));
        table.insert("later", |c, m, s| Box::pin(later(c, m, s)));
        table.insert("fails", |c, m, s| Box::pin(fails(c, m, s)));
        table.insert("panics", |c, m, s| Box::pin(panics(c, m, s)));
        table.insert("resolves_then_fails", |c, m, s| {
            Box::pin(resolves_then_fails(c, m, s))
        });
        table.insert("forgets", |c, m, s| Box::pin(forgets(c, m, s)));
        table
    }

    fn dispatcher() -> CommandDispatcher<Counter> {
        CommandDispatcher::new(Arc::new(Counter::default()), Handle::current(), test_registry)
    }

    #[tokio::test]
    async fn test_unknown_command_not_implemented() {
        let result = dispatcher().call(Command::new("doesNotExist")).await;
        assert_eq!(result, CommandResult::NotImplemented);
    }

    #[tokio::test]
    async fn test_routes_by_name() {
        let dispatcher = dispatcher();
        let result = dispatcher
            .call(Command::new("echo").with_argument("value", "hi"))
            .await;

        assert_eq!(result, CommandResult::Success(Value::from("hi")));
        assert_eq!(dispatcher.context.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_result_from_another_task() {
        let result = dispatcher().call(Command::new("later")).await;
        assert_eq!(result, CommandResult::Success(Value::Bool(true)));
    }

    #[tokio::test]
    async fn test_handler_error_becomes_failure() {
        let result = dispatcher().call(Command::new("fails")).await;
        match result {
            CommandResult::Failure { code, message } => {
                assert_eq!(code, "fails");
                assert!(message.unwrap().contains("boom"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_handler_panic_becomes_failure() {
        let result = dispatcher().call(Command::new("panics")).await;
        assert_eq!(
            result,
            CommandResult::Failure {
                code: "panics".to_string(),
                message: Some("handler exploded".to_string()),
            }
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_dispatch_from_foreign_thread() {
        let dispatcher = Arc::new(dispatcher());
        let (sink, receiver) = ResultSink::channel("echo");

        let remote = dispatcher.clone();
        std::thread::spawn(move || {
            remote.dispatch(Command::new("echo").with_argument("value", 7), sink);
        })
        .join()
        .unwrap();

        assert_eq!(receiver.await, CommandResult::Success(Value::from(7)));
    }

    #[tokio::test]
    async fn test_first_resolution_wins() {
        let result = dispatcher().call(Command::new("resolves_then_fails")).await;
        assert_eq!(result, CommandResult::Success(Value::from(1)));
    }

    #[tokio::test]
    async fn test_unresolved_sink_reports_abandoned() {
        let result = dispatcher().call(Command::new("forgets")).await;
        assert_eq!(result.failure_code(), Some("abandoned"));
    }

    #[test]
    fn test_sink_resolves_once() {
        let (sink, mut receiver) = ResultSink::channel("discover");
        let clone = sink.clone();

        assert!(sink.success(true));
        assert!(!clone.fail(&Error::validation("second")));
        assert!(clone.is_resolved());
        assert_eq!(receiver.try_result(), Some(CommandResult::Success(Value::Bool(true))));
    }

    #[test]
    fn test_receiver_pending_until_resolved() {
        let (sink, receiver) = ResultSink::channel("discover");
        let mut receiver = tokio_test::task::spawn(receiver);

        tokio_test::assert_pending!(receiver.poll());
        sink.fail(&Error::PlatformActionFailed(crate::platform::ReasonCode::BUSY));
        assert!(receiver.is_woken());
        assert_eq!(
            tokio_test::assert_ready!(receiver.poll()),
            CommandResult::Failure {
                code: "2".to_string(),
                message: None,
            }
        );
    }

    #[tokio::test]
    async fn test_registry_built_once() {
        let dispatcher = dispatcher();
        assert!(dispatcher.handlers.get().is_none());
        assert_eq!(dispatcher.command_names().len(), 6);
        assert!(dispatcher.handlers.get().is_some());
    }

    #[test]
    fn test_bytes_arg() {
        let command = Command::new("connect").with_argument("payload", "aGVsbG8=");
        assert_eq!(command.bytes_arg("payload").unwrap(), b"hello");

        let err = Command::new("connect").bytes_arg("payload").unwrap_err();
        assert!(err.to_string().contains("Missing required argument"));

        let err = Command::new("connect")
            .with_argument("payload", "***")
            .bytes_arg("payload")
            .unwrap_err();
        assert!(matches!(err, Error::Base64(_)));
    }

    #[test]
    fn test_result_serialization() {
        let value = serde_json::to_value(CommandResult::Failure {
            code: "2".to_string(),
            message: None,
        })
        .unwrap();
        assert_eq!(
            value,
            serde_json::json!({"status": "failure", "body": {"code": "2", "message": null}})
        );
    }
}
