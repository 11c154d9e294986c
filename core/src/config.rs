//! Configuration for the CouchDB client
//!
//! This module provides the connection settings: server address, socket
//! timeouts and the query string encoding.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{to_config_error, CouchError, Result};
use crate::http::QueryEncoding;

/// Default CouchDB host
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default CouchDB port
pub const DEFAULT_PORT: u16 = 5984;

/// Default cap on the size of a response, headers included
pub const DEFAULT_MAX_RESPONSE_BYTES: u64 = 64 * 1024 * 1024;

/// Client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Timeout for opening the socket
    pub connect_timeout: Duration,

    /// Timeout for writing the request and reading the full response
    pub read_timeout: Duration,

    /// Query string escaping
    pub query_encoding: QueryEncoding,

    /// Whether to send a `Host` header
    pub send_host_header: bool,

    /// Largest response accepted, headers included
    #[serde(default = "default_max_response_bytes")]
    pub max_response_bytes: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(30),
            query_encoding: QueryEncoding::default(),
            send_host_header: true,
            max_response_bytes: DEFAULT_MAX_RESPONSE_BYTES,
        }
    }
}

impl ClientConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration pointing at `host:port`, defaults elsewhere
    pub fn with_address(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Load configuration from a JSON file
    pub fn from_file(path: &str) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let config = serde_json::from_reader(file)?;
        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn to_file(&self, path: &str) -> Result<()> {
        let file = std::fs::File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }

    /// Defaults overridden by `COUCHDB_HOST`, `COUCHDB_PORT`,
    /// `COUCHDB_CONNECT_TIMEOUT_SECS`, `COUCHDB_READ_TIMEOUT_SECS` and
    /// `COUCHDB_MAX_RESPONSE_BYTES`
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(host) = lookup("COUCHDB_HOST") {
            config.host = host;
        }
        if let Some(port) = lookup("COUCHDB_PORT") {
            config.port = port
                .parse()
                .map_err(|e| to_config_error(format!("COUCHDB_PORT {:?}: {}", port, e)))?;
        }
        if let Some(secs) = lookup("COUCHDB_CONNECT_TIMEOUT_SECS") {
            config.connect_timeout = parse_secs("COUCHDB_CONNECT_TIMEOUT_SECS", &secs)?;
        }
        if let Some(secs) = lookup("COUCHDB_READ_TIMEOUT_SECS") {
            config.read_timeout = parse_secs("COUCHDB_READ_TIMEOUT_SECS", &secs)?;
        }
        if let Some(bytes) = lookup("COUCHDB_MAX_RESPONSE_BYTES") {
            config.max_response_bytes = bytes.parse().map_err(|e| {
                to_config_error(format!("COUCHDB_MAX_RESPONSE_BYTES {:?}: {}", bytes, e))
            })?;
        }

        Ok(config)
    }

    /// Create a development configuration
    pub fn development() -> Self {
        Self {
            host: "localhost".to_string(),
            ..Self::default()
        }
    }

    /// Create a testing configuration
    pub fn testing() -> Self {
        Self {
            connect_timeout: Duration::from_secs(2),
            read_timeout: Duration::from_secs(5),
            ..Self::default()
        }
    }

    /// `host:port`
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn default_max_response_bytes() -> u64 {
    DEFAULT_MAX_RESPONSE_BYTES
}

fn parse_secs(key: &str, value: &str) -> Result<Duration> {
    value
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|e| CouchError::Configuration(format!("{} {:?}: {}", key, value, e)))
}
