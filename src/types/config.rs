//! Configuration structures.
//!
//! Configuration is layered with figment: compiled defaults, then an optional
//! TOML file, then `GMS_MCP_`-prefixed environment variables (nested keys use
//! a double underscore, e.g. `GMS_MCP_STREAMS__MAX_SESSIONS=8`).

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use super::{Error, Result};

/// Environment variable prefix for configuration overrides.
pub const ENV_PREFIX: &str = "GMS_MCP_";

/// Global server configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, JsonSchema)]
pub struct Config {
    /// Transport configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Observability configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Tool dispatch configuration.
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Stream session configuration.
    #[serde(default)]
    pub streams: StreamConfig,

    /// Simulated instrument configuration.
    #[serde(default)]
    pub instrument: InstrumentConfig,
}

impl Config {
    /// Load configuration from defaults, an optional TOML file and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            if !path.exists() {
                return Err(Error::config(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            figment = figment.merge(Toml::file(path));
        }
        let config: Config = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would stall or disable the server.
    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.observability.log_level.as_str()) {
            return Err(Error::config(format!(
                "invalid log_level '{}', expected one of: {}",
                self.observability.log_level,
                valid_levels.join(", ")
            )));
        }
        if self.server.max_frame_bytes == 0 {
            return Err(Error::config("server.max_frame_bytes must be positive"));
        }
        if self.server.max_connections == 0 {
            return Err(Error::config("server.max_connections must be positive"));
        }
        if self.dispatch.call_timeout.is_zero() {
            return Err(Error::config("dispatch.call_timeout must be positive"));
        }
        if self.streams.max_sessions == 0 {
            return Err(Error::config("streams.max_sessions must be positive"));
        }
        if self.streams.cleanup_interval.is_zero() {
            return Err(Error::config("streams.cleanup_interval must be positive"));
        }
        if self.instrument.image_width == 0 || self.instrument.image_height == 0 {
            return Err(Error::config("instrument image dimensions must be positive"));
        }
        if self.instrument.frame_width == 0 || self.instrument.frame_height == 0 {
            return Err(Error::config("instrument frame dimensions must be positive"));
        }
        Ok(())
    }

    /// JSON schema of the configuration file.
    pub fn json_schema() -> serde_json::Value {
        serde_json::to_value(schemars::schema_for!(Config)).unwrap_or_default()
    }
}

/// Transport selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Stdio,
    Tcp,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ServerConfig {
    /// Server name reported in the MCP `initialize` handshake.
    pub name: String,

    /// Which transport to serve on.
    pub transport: Transport,

    /// TCP bind address (only used with the tcp transport).
    pub listen_addr: String,

    /// Maximum size of a single JSON-RPC line in bytes.
    pub max_frame_bytes: usize,

    /// Maximum concurrent TCP connections.
    pub max_connections: usize,

    /// Idle read timeout per connection. Idle connections are dropped.
    #[serde(with = "humantime_serde")]
    #[schemars(with = "String")]
    pub read_timeout: Duration,

    /// Write timeout per frame. Slow consumers are dropped.
    #[serde(with = "humantime_serde")]
    #[schemars(with = "String")]
    pub write_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "gms-microscopy".to_string(),
            transport: Transport::Stdio,
            listen_addr: "127.0.0.1:8000".to_string(),
            max_frame_bytes: 16 * 1024 * 1024,
            max_connections: 64,
            read_timeout: Duration::from_secs(600),
            write_timeout: Duration::from_secs(10),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ObservabilityConfig {
    /// Tracing log level used when `RUST_LOG` is unset.
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

/// Tool dispatch configuration.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DispatchConfig {
    /// Upper bound on a single tool call, including instrument I/O.
    #[serde(with = "humantime_serde")]
    #[schemars(with = "String")]
    pub call_timeout: Duration,

    /// Sliding window size for per-tool health metrics.
    pub health_window: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(120),
            health_window: 100,
        }
    }
}

/// Stream session configuration.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StreamConfig {
    /// Maximum number of live (started) sessions.
    pub max_sessions: usize,

    /// How often the background sweeper runs.
    #[serde(with = "humantime_serde")]
    #[schemars(with = "String")]
    pub cleanup_interval: Duration,

    /// How long stopped sessions stay queryable before they are reclaimed.
    #[serde(with = "humantime_serde")]
    #[schemars(with = "String")]
    pub stopped_retention: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            max_sessions: 16,
            cleanup_interval: Duration::from_secs(30),
            stopped_retention: Duration::from_secs(300),
        }
    }
}

/// Simulated instrument configuration.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct InstrumentConfig {
    /// Width of the simulated front image.
    pub image_width: usize,

    /// Height of the simulated front image.
    pub image_height: usize,

    /// Width of simulated stream frames.
    pub frame_width: usize,

    /// Height of simulated stream frames.
    pub frame_height: usize,
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            image_width: 512,
            image_height: 512,
            frame_width: 256,
            frame_height: 256,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.transport, Transport::Stdio);
        assert_eq!(config.server.listen_addr, "127.0.0.1:8000");
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = Config::load(None).unwrap();
        assert_eq!(config.streams.max_sessions, 16);
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[server]
transport = "tcp"
listen_addr = "0.0.0.0:9000"

[streams]
max_sessions = 4
cleanup_interval = "5s"
"#
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.server.transport, Transport::Tcp);
        assert_eq!(config.server.listen_addr, "0.0.0.0:9000");
        assert_eq!(config.streams.max_sessions, 4);
        assert_eq!(config.streams.cleanup_interval, Duration::from_secs(5));
        // untouched sections keep their defaults
        assert_eq!(config.instrument.frame_width, 256);
    }

    #[test]
    fn test_example_config_matches_defaults() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/gms-mcp.example.toml");
        let loaded = Config::load(Some(&path)).unwrap();
        let defaults = Config::default();
        assert_eq!(
            serde_json::to_value(&loaded).unwrap(),
            serde_json::to_value(&defaults).unwrap()
        );
    }

    #[test]
    fn test_load_missing_file_fails() {
        let err = Config::load(Some(Path::new("/nonexistent/gms-mcp.toml"))).unwrap_err();
        assert!(err.to_string().contains("config file not found"));
    }

    #[test]
    fn test_validate_rejects_bad_log_level() {
        let mut config = Config::default();
        config.observability.log_level = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_sessions() {
        let mut config = Config::default();
        config.streams.max_sessions = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_json_schema_lists_sections() {
        let schema = Config::json_schema();
        let props = &schema["properties"];
        assert!(props.get("server").is_some());
        assert!(props.get("streams").is_some());
    }
}
