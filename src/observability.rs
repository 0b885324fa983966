//! Observability utilities.

use crate::types::ObservabilityConfig;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Environment variable that switches log output to JSON.
pub const LOG_FORMAT_ENV: &str = "GMS_MCP_LOG_FORMAT";

/// Initialize the tracing subscriber once for the process.
///
/// Logs always go to stderr; stdout carries the MCP stream when serving
/// over stdio. `RUST_LOG` overrides `config.log_level`, and
/// `GMS_MCP_LOG_FORMAT=json` forces JSON output.
pub fn init_tracing(config: &ObservabilityConfig) {
    TRACING_INIT.get_or_init(|| {
        let env_filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&config.log_level))
            .unwrap_or_else(|_| EnvFilter::new("info"));
        let json = std::env::var(LOG_FORMAT_ENV)
            .map(|v| v.eq_ignore_ascii_case("json"))
            .unwrap_or(config.json_logs);

        let result = if json {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .try_init()
        } else {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .try_init()
        };

        if let Err(err) = result {
            eprintln!("tracing init skipped: {err}");
        }
    });
}

// `init_tracing_is_idempotent` lives in tests/observability.rs: it installs the
// process-global subscriber, which collides with `#[traced_test]` unit tests.
