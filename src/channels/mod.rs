//! Event channel pool for broadcast fan-out.
//!
//! The pool owns one channel per [`EventCategory`]. Producers publish through
//! an [`EventSink`]; every subscriber gets its own unbounded, ordered queue
//! exposed as an [`EventStream`].
//!
//! Guarantees:
//!   - **Fan-out**: every event reaches all current subscribers of its channel
//!   - **Ordering**: a subscriber observes one channel in publish order
//!   - **Not retroactive**: late subscribers miss earlier events
//!   - **No buffering without readers**: publishing to zero subscribers drops the event
//!
//! There is no ordering between different channels.

use crate::types::{ConnectionInfo, Error, PeerDevice, Result};
use bytes::Bytes;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::{mpsc, RwLock};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;

// =============================================================================
// Categories and payloads
// =============================================================================

/// Closed set of broadcast categories. No dynamic registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    StateChanged,
    PeersChanged,
    ConnectionChanged,
    DeviceChanged,
    DiscoveryChanged,
    SocketData,
}

impl EventCategory {
    pub const ALL: [EventCategory; 6] = [
        EventCategory::StateChanged,
        EventCategory::PeersChanged,
        EventCategory::ConnectionChanged,
        EventCategory::DeviceChanged,
        EventCategory::DiscoveryChanged,
        EventCategory::SocketData,
    ];

    /// Stable channel name exposed to hosts.
    pub fn channel_name(self) -> &'static str {
        match self {
            EventCategory::StateChanged => "bc/state-change",
            EventCategory::PeersChanged => "bc/peers-change",
            EventCategory::ConnectionChanged => "bc/connection-change",
            EventCategory::DeviceChanged => "bc/this-device-change",
            EventCategory::DiscoveryChanged => "bc/discovery-change",
            EventCategory::SocketData => "socket/read",
        }
    }

    pub fn from_channel_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|category| category.channel_name() == name)
    }
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.channel_name())
    }
}

/// Category-specific payload carried on a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "category", content = "payload", rename_all = "snake_case")]
pub enum ChannelEvent {
    /// Raw P2P enable/disable state code.
    StateChanged(i32),
    /// Snapshot of the current peer list.
    PeersChanged(Vec<PeerDevice>),
    ConnectionChanged(ConnectionInfo),
    /// Snapshot of the local device.
    DeviceChanged(PeerDevice),
    /// `true` while discovery runs.
    DiscoveryChanged(bool),
    /// Reserved for a data transport; nothing in this crate produces it.
    SocketData(Bytes),
}

impl ChannelEvent {
    pub fn category(&self) -> EventCategory {
        match self {
            ChannelEvent::StateChanged(_) => EventCategory::StateChanged,
            ChannelEvent::PeersChanged(_) => EventCategory::PeersChanged,
            ChannelEvent::ConnectionChanged(_) => EventCategory::ConnectionChanged,
            ChannelEvent::DeviceChanged(_) => EventCategory::DeviceChanged,
            ChannelEvent::DiscoveryChanged(_) => EventCategory::DiscoveryChanged,
            ChannelEvent::SocketData(_) => EventCategory::SocketData,
        }
    }
}

/// Event as seen by subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedEvent {
    pub payload: ChannelEvent,
    pub timestamp_ms: i64,
}

impl PublishedEvent {
    pub fn category(&self) -> EventCategory {
        self.payload.category()
    }
}

// =============================================================================
// Pool
// =============================================================================

#[derive(Debug, Default)]
struct Channel {
    subscribers: Vec<mpsc::UnboundedSender<PublishedEvent>>,
    published: u64,
}

type Registry = Arc<RwLock<HashMap<EventCategory, Channel>>>;

/// Statistics about pool usage.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    pub registered_channels: usize,
    pub events_published: u64,
    pub active_subscribers: usize,
}

/// Registry of named broadcast channels.
#[derive(Debug, Clone, Default)]
pub struct EventChannelPool {
    channels: Registry,
}

impl EventChannelPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the channel for `category`.
    ///
    /// Registering the same category twice is an error.
    pub async fn register(&self, category: EventCategory) -> Result<()> {
        let mut channels = self.channels.write().await;

        if channels.contains_key(&category) {
            return Err(Error::validation(format!(
                "Channel already registered: {}",
                category
            )));
        }

        channels.insert(category, Channel::default());
        tracing::debug!("Registered channel: {}", category);
        Ok(())
    }

    /// Register every category that is not registered yet.
    pub async fn register_all(&self) {
        let mut channels = self.channels.write().await;
        for category in EventCategory::ALL {
            channels.entry(category).or_default();
        }
    }

    pub async fn is_registered(&self, category: EventCategory) -> bool {
        self.channels.read().await.contains_key(&category)
    }

    /// Write handle for a registered channel.
    pub async fn sink(&self, category: EventCategory) -> Result<EventSink> {
        if !self.is_registered(category).await {
            return Err(Error::unknown_channel(category.channel_name()));
        }
        Ok(EventSink {
            category,
            channels: self.channels.clone(),
        })
    }

    /// New independent stream of events published from now on.
    pub async fn subscribe(&self, category: EventCategory) -> Result<EventStream> {
        let mut channels = self.channels.write().await;
        let channel = channels
            .get_mut(&category)
            .ok_or_else(|| Error::unknown_channel(category.channel_name()))?;

        let (tx, rx) = mpsc::unbounded_channel();
        channel.subscribers.push(tx);

        tracing::debug!(
            "Subscriber added to {} (now {})",
            category,
            channel.subscribers.len()
        );

        Ok(EventStream {
            category,
            inner: UnboundedReceiverStream::new(rx),
        })
    }

    /// Get current pool statistics.
    pub async fn stats(&self) -> PoolStats {
        let channels = self.channels.read().await;
        PoolStats {
            registered_channels: channels.len(),
            events_published: channels.values().map(|c| c.published).sum(),
            active_subscribers: channels
                .values()
                .flat_map(|c| c.subscribers.iter())
                .filter(|tx| !tx.is_closed())
                .count(),
        }
    }
}

// =============================================================================
// Sink / Stream
// =============================================================================

/// Producer handle for one channel. Cheap to clone and `Send`.
#[derive(Clone)]
pub struct EventSink {
    category: EventCategory,
    channels: Registry,
}

impl fmt::Debug for EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSink")
            .field("category", &self.category)
            .finish()
    }
}

impl EventSink {
    pub fn category(&self) -> EventCategory {
        self.category
    }

    /// Publish to every current subscriber. Returns how many received it.
    ///
    /// Subscribers whose stream was dropped are pruned here.
    pub async fn publish(&self, payload: ChannelEvent) -> Result<usize> {
        if payload.category() != self.category {
            return Err(Error::validation(format!(
                "{} payload published on {}",
                payload.category(),
                self.category
            )));
        }

        let event = PublishedEvent {
            payload,
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
        };

        // Write lock keeps concurrent publishers on this channel in one order.
        let mut channels = self.channels.write().await;
        let channel = channels
            .get_mut(&self.category)
            .ok_or_else(|| Error::unknown_channel(self.category.channel_name()))?;

        channel
            .subscribers
            .retain(|tx| tx.send(event.clone()).is_ok());
        channel.published += 1;

        let delivered = channel.subscribers.len();
        tracing::debug!(
            "Published on {} to {} subscribers",
            self.category,
            delivered
        );

        Ok(delivered)
    }
}

/// Subscriber side of one channel.
#[derive(Debug)]
pub struct EventStream {
    category: EventCategory,
    inner: UnboundedReceiverStream<PublishedEvent>,
}

impl EventStream {
    pub fn category(&self) -> EventCategory {
        self.category
    }

    /// Next event, or `None` once the pool is gone.
    pub async fn recv(&mut self) -> Option<PublishedEvent> {
        self.inner.next().await
    }

    /// Next already-published event without waiting.
    pub fn try_recv(&mut self) -> Option<PublishedEvent> {
        self.inner.as_mut().try_recv().ok()
    }
}

impl Stream for EventStream {
    type Item = PublishedEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

// =============================================================================
// Tests
// =============================================================================
