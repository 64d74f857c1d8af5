//! Configuration structures.
//!
//! Hosts usually hand the bridge a deserialized `Config`; `from_env` overlays a
//! few environment variables on top of the defaults.

use serde::{Deserialize, Serialize};

use super::errors::{Error, Result};
use crate::platform::WpsSetup;

/// Highest group-owner intent a connection request may carry.
pub const MAX_GROUP_OWNER_INTENT: u8 = 15;

/// Global bridge configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Connection request policy.
    #[serde(default)]
    pub connect: ConnectPolicy,

    /// Runtime permission flow.
    #[serde(default)]
    pub permissions: PermissionConfig,

    /// Observability configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Defaults overlaid with `P2P_BRIDGE_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(raw) = std::env::var("P2P_BRIDGE_GO_INTENT") {
            config.connect.group_owner_intent = raw.parse().map_err(|_| {
                Error::validation(format!("P2P_BRIDGE_GO_INTENT is not a number: {}", raw))
            })?;
        }
        if let Ok(level) = std::env::var("P2P_BRIDGE_LOG_LEVEL") {
            config.observability.log_level = level;
        }
        if let Ok(format) = std::env::var("P2P_BRIDGE_LOG_FORMAT") {
            config.observability.json_logs = format.eq_ignore_ascii_case("json");
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject values the platform would refuse.
    pub fn validate(&self) -> Result<()> {
        if self.connect.group_owner_intent > MAX_GROUP_OWNER_INTENT {
            return Err(Error::validation(format!(
                "group_owner_intent must be within 0..={}, got {}",
                MAX_GROUP_OWNER_INTENT, self.connect.group_owner_intent
            )));
        }
        Ok(())
    }
}

/// How `connect` builds its connection request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectPolicy {
    /// Bias towards becoming group owner (0 = least, 15 = most).
    pub group_owner_intent: u8,

    /// WPS provisioning method.
    pub wps_setup: WpsSetup,
}

impl Default for ConnectPolicy {
    fn default() -> Self {
        Self {
            group_owner_intent: 14,
            wps_setup: WpsSetup::PushButton,
        }
    }
}

/// Runtime permission flow configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionConfig {
    /// Request code tagging the location permission prompt.
    pub request_code: i32,
}

impl Default for PermissionConfig {
    fn default() -> Self {
        Self { request_code: 600 }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Tracing log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable JSON log formatting.
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}
