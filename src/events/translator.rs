//! Broadcast translator task.
//!
//! Drains the platform's broadcast receiver, translates each broadcast,
//! advances the lifecycle and publishes to the pool. Malformed broadcasts and
//! broadcasts for unregistered channels are dropped with a warning.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::translation::translate_broadcast;
use crate::channels::EventChannelPool;
use crate::lifecycle::ConnectionLifecycle;
use crate::platform::RawBroadcast;

/// Republishes native broadcasts onto the event channel pool.
#[derive(Debug, Clone)]
pub struct BroadcastTranslator {
    pool: EventChannelPool,
    lifecycle: Arc<ConnectionLifecycle>,
}

impl BroadcastTranslator {
    pub fn new(pool: EventChannelPool, lifecycle: Arc<ConnectionLifecycle>) -> Self {
        Self { pool, lifecycle }
    }

    /// Run on a background task until cancelled or the source closes.
    pub fn spawn(self, broadcasts: mpsc::UnboundedReceiver<RawBroadcast>) -> TranslatorHandle {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(self.run(broadcasts, cancel.clone()));
        TranslatorHandle {
            cancel,
            task: Some(task),
        }
    }

    async fn run(
        self,
        mut broadcasts: mpsc::UnboundedReceiver<RawBroadcast>,
        cancel: CancellationToken,
    ) {
        tracing::info!("Broadcast translator started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Broadcast translator stopping");
                    break;
                }
                raw = broadcasts.recv() => match raw {
                    Some(raw) => self.handle(raw).await,
                    None => {
                        tracing::info!("Broadcast source closed");
                        break;
                    }
                },
            }
        }
    }

    /// Translate and forward one broadcast.
    pub async fn handle(&self, raw: RawBroadcast) {
        let event = match translate_broadcast(&raw) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!("Dropping broadcast: {}", e);
                return;
            }
        };

        self.lifecycle.observe(&event);

        let category = event.category();
        let sink = match self.pool.sink(category).await {
            Ok(sink) => sink,
            Err(e) => {
                tracing::warn!("Dropping {} broadcast: {}", category, e);
                return;
            }
        };

        if let Err(e) = sink.publish(event).await {
            tracing::warn!("Failed to publish {} broadcast: {}", category, e);
        }
    }
}

/// Running translator. Dropping it cancels the task.
#[derive(Debug)]
pub struct TranslatorHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl TranslatorHandle {
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Cancel and wait for the task to exit.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!("Broadcast translator exited abnormally: {}", e);
            }
        }
    }
}

impl Drop for TranslatorHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
