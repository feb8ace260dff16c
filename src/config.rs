//! Link configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`). Device info and the entity schema may
//! be given inline or as paths to JSON files.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde_json::{Value, json};

use crate::codec::UnknownEntityPolicy;
use crate::domain::{ConnectionPolicy, EntitySchema};

/// Error type of configuration loading.
pub type ConfigError = Box<dyn std::error::Error + Send + Sync>;

/// Default bind address; port 30102 is the well-known mammoth port.
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:30102";

/// Top-level link configuration.
///
/// Loaded once at startup via [`LinkConfig::from_env`]. [`Default`] gives
/// the documented defaults with an empty schema.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Socket address to bind the HTTP/WebSocket server to.
    pub listen_addr: SocketAddr,

    /// Period of the broadcast scheduler.
    pub broadcast_interval: Duration,

    /// Upper bound on queueing one message for one connection.
    pub send_timeout: Duration,

    /// Upper bound on waiting for connections to drain at shutdown.
    pub shutdown_timeout: Duration,

    /// Depth of each connection's outbound queue.
    pub outbound_queue_capacity: usize,

    /// Connection identity policy.
    pub connection_policy: ConnectionPolicy,

    /// Handling of unknown entity ids in inbound frames.
    pub unknown_entity_policy: UnknownEntityPolicy,

    /// JSON object sent to every client on connect.
    pub device_info: Value,

    /// Outbound and inbound entity definitions.
    pub schema: EntitySchema,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 30102)),
            broadcast_interval: Duration::from_millis(20),
            send_timeout: Duration::from_millis(250),
            shutdown_timeout: Duration::from_millis(2000),
            outbound_queue_capacity: 64,
            connection_policy: ConnectionPolicy::default(),
            unknown_entity_policy: UnknownEntityPolicy::default(),
            device_info: default_device_info(),
            schema: EntitySchema::default(),
        }
    }
}

impl LinkConfig {
    /// Loads configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    /// Unparsable numbers fall back to their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if `LISTEN_ADDR` or a policy name cannot be parsed,
    /// or if a device-info or schema source is unreadable or not valid JSON.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let listen_addr: SocketAddr = std::env::var("LISTEN_ADDR")
            .unwrap_or_else(|_| DEFAULT_LISTEN_ADDR.to_string())
            .parse()?;

        let connection_policy = match std::env::var("CONNECTION_POLICY") {
            Ok(raw) => raw.parse::<ConnectionPolicy>()?,
            Err(_) => ConnectionPolicy::default(),
        };
        let unknown_entity_policy = match std::env::var("UNKNOWN_ENTITY_POLICY") {
            Ok(raw) => raw.parse::<UnknownEntityPolicy>()?,
            Err(_) => UnknownEntityPolicy::default(),
        };

        let device_info = match (
            std::env::var("DEVICE_INFO_PATH").ok(),
            std::env::var("DEVICE_INFO").ok(),
        ) {
            (Some(path), _) => load_device_info(Path::new(&path))?,
            (None, Some(inline)) => parse_device_info(&inline)?,
            (None, None) => default_device_info(),
        };

        let schema = match std::env::var("ENTITY_SCHEMA_PATH") {
            Ok(path) => load_schema(Path::new(&path))?,
            Err(_) => EntitySchema::default(),
        };

        Ok(Self {
            listen_addr,
            broadcast_interval: Duration::from_millis(
                parse_env::<u64>("BROADCAST_INTERVAL_MS", 20).max(1),
            ),
            send_timeout: Duration::from_millis(parse_env("SEND_TIMEOUT_MS", 250)),
            shutdown_timeout: Duration::from_millis(parse_env("SHUTDOWN_TIMEOUT_MS", 2000)),
            outbound_queue_capacity: parse_env::<usize>("OUTBOUND_QUEUE_CAPACITY", 64).max(1),
            connection_policy,
            unknown_entity_policy,
            device_info,
            schema,
        })
    }
}

/// Device info used when none is configured.
#[must_use]
pub fn default_device_info() -> Value {
    json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    })
}

/// Parses a device-info JSON object.
///
/// # Errors
///
/// Returns an error if `raw` is not JSON or not an object.
pub fn parse_device_info(raw: &str) -> Result<Value, ConfigError> {
    let value: Value = serde_json::from_str(raw)?;
    if !value.is_object() {
        return Err("device info must be a JSON object".into());
    }
    Ok(value)
}

/// Reads a device-info JSON object from a file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or does not hold an object.
pub fn load_device_info(path: &Path) -> Result<Value, ConfigError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read device info {}: {e}", path.display()))?;
    parse_device_info(&raw)
}

/// Reads an entity schema from a JSON file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_schema(path: &Path) -> Result<EntitySchema, ConfigError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read entity schema {}: {e}", path.display()))?;
    Ok(serde_json::from_str(&raw)?)
}

/// Parses an environment variable as `T`, returning `default` on missing
/// or invalid values.
fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = LinkConfig::default();
        assert_eq!(config.listen_addr.port(), 30102);
        assert_eq!(config.broadcast_interval, Duration::from_millis(20));
        assert_eq!(config.send_timeout, Duration::from_millis(250));
        assert_eq!(config.outbound_queue_capacity, 64);
        assert_eq!(config.connection_policy, ConnectionPolicy::Sequential);
        assert_eq!(config.unknown_entity_policy, UnknownEntityPolicy::Skip);
        assert_eq!(config.device_info["name"], "mammoth-link");
        assert!(config.schema.outbound.is_empty());
    }

    #[test]
    fn device_info_must_be_an_object() {
        assert!(parse_device_info(r#"{"name":"arm-01"}"#).is_ok());
        assert!(parse_device_info("[1,2]").is_err());
        assert!(parse_device_info("{").is_err());
    }

    #[test]
    fn schema_file_is_parsed() {
        let path = std::env::temp_dir().join(format!("mammoth-schema-{}.json", std::process::id()));
        let body = r#"{"outbound":[{"name":"temp","id":1,"types":["int16"]}]}"#;
        let Ok(()) = std::fs::write(&path, body) else {
            panic!("cannot write temp schema");
        };

        let loaded = load_schema(&path);
        let _ = std::fs::remove_file(&path);

        let Ok(schema) = loaded else {
            panic!("schema should parse");
        };
        assert_eq!(schema.outbound.len(), 1);
        assert!(schema.inbound.is_empty());
    }

    #[test]
    fn missing_schema_file_is_an_error() {
        assert!(load_schema(Path::new("/nonexistent/mammoth-schema.json")).is_err());
    }
}
