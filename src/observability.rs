//! Observability utilities.

use std::sync::OnceLock;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::types::ObservabilityConfig;

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Initialize tracing subscriber once for the process.
///
/// Log format defaults to compact text and can be switched to JSON via
/// `P2P_BRIDGE_LOG_FORMAT=json`. Filter defaults to `info` if `RUST_LOG` is unset.
pub fn init_tracing() {
    let json_logs = std::env::var("P2P_BRIDGE_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    init_tracing_with(&ObservabilityConfig {
        json_logs,
        ..ObservabilityConfig::default()
    });
}

/// Initialize from a loaded config. `RUST_LOG` still wins over `log_level`.
pub fn init_tracing_with(config: &ObservabilityConfig) {
    TRACING_INIT.get_or_init(|| {
        let env_filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&config.log_level))
            .unwrap_or_else(|_| EnvFilter::new("info"));

        let result = if config.json_logs {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json())
                .try_init()
        } else {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().compact())
                .try_init()
        };

        if let Err(err) = result {
            eprintln!("tracing init skipped: {err}");
        }
    });
}
