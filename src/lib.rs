//! # P2P Bridge - Wi-Fi Direct command/event bridge
//!
//! Connects a host application to a platform's peer-to-peer radio:
//! - Named commands routed to platform actions, each resolved exactly once
//! - Native broadcasts translated into typed events on named channels
//! - Discovery/connection/group lifecycle tracking
//! - Runtime location-permission request flow
//!
//! ## Architecture
//!
//! A `P2pBridge` owns all per-attachment state:
//! ```text
//!                    ┌──────────────────────────────────────┐
//!   commands    →    │              P2pBridge               │
//!                    │  ┌──────────┐      ┌──────────────┐  │
//!                    │  │ Command  │ ───→ │ P2pPlatform  │  │  ← broadcasts
//!                    │  │Dispatcher│      └──────────────┘  │       │
//!                    │  └──────────┘             │          │       ▼
//!                    │  ┌──────────┐      ┌──────────────┐  │  ┌──────────┐
//!                    │  │Permission│      │  Connection  │ ←┼──│Broadcast │
//!                    │  │  Broker  │      │  Lifecycle   │  │  │Translator│
//!                    │  └──────────┘      └──────────────┘  │  └──────────┘
//!                    │          ┌──────────────────┐        │       │
//!   events      ←    │          │ EventChannelPool │ ←──────┼───────┘
//!                    │          └──────────────────┘        │
//!                    └──────────────────────────────────────┘
//! ```

// Enforce strict safety at compile time
#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]
#![warn(rust_2018_idioms)]

pub mod bridge;
pub mod channels;
pub mod dispatch;
pub mod events;
pub mod lifecycle;
pub mod platform;
pub mod types;

// Internal utilities
pub mod observability;

pub use bridge::P2pBridge;
pub use channels::{ChannelEvent, EventCategory, EventChannelPool, PublishedEvent};
pub use dispatch::{Command, CommandResult, ResultSink};
pub use lifecycle::ConnectionState;
pub use types::{Config, Error, Result};
