//! Connection to a CouchDB server
//!
//! Each request opens its own socket, writes an HTTP/1.0 request, reads the
//! response until the server closes the connection and parses it. There is
//! no pooling and no retry: every failure is returned to the caller.

use chrono::Utc;
use log::{debug, info, warn};
use phly_couch_core::error::to_protocol_error;
use phly_couch_core::utils::{encode_path_segment, validate_database_name};
use phly_couch_core::{
    ClientConfig, CouchError, Method, QueryParams, Request, Response, Result,
};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

static DEFAULT_CONNECTION: OnceLock<Arc<Connection>> = OnceLock::new();

/// Register the process-wide default connection
///
/// The registry is init-once: a second registration fails with a
/// configuration error and leaves the first connection in place.
pub fn set_default_connection(connection: Arc<Connection>) -> Result<()> {
    DEFAULT_CONNECTION.set(connection).map_err(|_| {
        CouchError::Configuration("A default connection has already been set".to_string())
    })
}

/// The process-wide default connection
pub fn default_connection() -> Result<Arc<Connection>> {
    DEFAULT_CONNECTION
        .get()
        .cloned()
        .ok_or_else(|| CouchError::Configuration("No default connection given".to_string()))
}

/// Connection to a CouchDB server
#[derive(Debug)]
pub struct Connection {
    /// Connection settings
    config: ClientConfig,

    /// Raw text of the most recent request
    last_request: Mutex<Option<String>>,

    /// Most recent parsed response
    last_response: Mutex<Option<Response>>,
}

impl Default for Connection {
    fn default() -> Self {
        Self::new(ClientConfig::default())
    }
}

impl Connection {
    /// Create a connection from a configuration
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            last_request: Mutex::new(None),
            last_response: Mutex::new(None),
        }
    }

    /// Create a connection to `host:port` with default settings
    pub fn with_host_port(host: impl Into<String>, port: u16) -> Self {
        Self::new(ClientConfig::with_address(host, port))
    }

    /// Connection settings
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Server host
    pub fn host(&self) -> &str {
        &self.config.host
    }

    /// Set the server host
    pub fn set_host(&mut self, host: impl Into<String>) -> &mut Self {
        self.config.host = host.into();
        self
    }

    /// Server port
    pub fn port(&self) -> u16 {
        self.config.port
    }

    /// Set the server port
    pub fn set_port(&mut self, port: u16) -> &mut Self {
        self.config.port = port;
        self
    }

    /// Raw text of the most recent request
    pub fn last_request(&self) -> Option<String> {
        lock(&self.last_request).clone()
    }

    /// Most recent response, successful or not
    pub fn last_response(&self) -> Option<Response> {
        lock(&self.last_response).clone()
    }

    /// Send a request to `path` and return the parsed response
    ///
    /// A status outside [200, 400) is returned as an error carrying the
    /// response and the raw request; 409 and 412 are reported as conflicts.
    pub async fn send(
        &self,
        path: &str,
        method: Method,
        query: Option<&QueryParams>,
        body: Option<String>,
    ) -> Result<Response> {
        let mut request = Request::new(method, path);
        if let Some(query) = query {
            request = request.with_query(query.clone());
        }
        if let Some(body) = body {
            request = request.with_body(body);
        }
        self.execute(request).await
    }

    /// Send a prepared request
    pub async fn execute(&self, request: Request) -> Result<Response> {
        let request = if self.config.send_host_header {
            request.with_header("Host", self.config.address())
        } else {
            request
        };
        let encoding = self.config.query_encoding;
        let raw_request = request.to_raw(encoding, Utc::now());

        debug!(
            "Sending {} {} to {}",
            request.method(),
            request.target(encoding),
            self.config.address()
        );
        *lock(&self.last_request) = Some(raw_request.clone());

        let raw_response = self.transmit(&raw_request).await?;
        let response = Response::parse(raw_response)?;
        debug!(
            "Received status {} for {} {}",
            response.status(),
            request.method(),
            request.path()
        );
        *lock(&self.last_response) = Some(response.clone());

        if !response.is_successful() {
            return Err(CouchError::from_failed_response(response, raw_request));
        }
        Ok(response)
    }

    /// Write the request on a fresh socket and read until EOF
    ///
    /// Responses longer than `max_response_bytes` are rejected as protocol
    /// errors.
    async fn transmit(&self, raw_request: &str) -> Result<String> {
        let host = self.config.host.as_str();
        let port = self.config.port;

        let mut stream = match timeout(self.config.connect_timeout, TcpStream::connect((host, port))).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => {
                return Err(CouchError::Connection {
                    host: host.to_string(),
                    port,
                    source,
                })
            }
            Err(_) => return Err(self.timeout_error(self.config.connect_timeout)),
        };

        let limit = self.config.max_response_bytes;
        let exchange = async {
            stream.write_all(raw_request.as_bytes()).await?;
            stream.flush().await?;
            let mut buffer = Vec::with_capacity(8192);
            (&mut stream)
                .take(limit.saturating_add(1))
                .read_to_end(&mut buffer)
                .await?;
            Ok::<_, std::io::Error>(buffer)
        };
        let buffer = timeout(self.config.read_timeout, exchange)
            .await
            .map_err(|_| self.timeout_error(self.config.read_timeout))??;
        if buffer.len() as u64 > limit {
            return Err(to_protocol_error(format!(
                "Response from {} exceeds {} bytes",
                self.config.address(),
                limit
            )));
        }

        String::from_utf8(buffer)
            .map_err(|e| to_protocol_error(format!("Response is not valid UTF-8: {}", e)))
    }

    fn timeout_error(&self, after: Duration) -> CouchError {
        CouchError::Timeout {
            host: self.config.host.clone(),
            port: self.config.port,
            after,
        }
    }

    /// Get server information
    pub async fn server_info(&self) -> Result<Response> {
        self.send("", Method::Get, None, None).await
    }

    /// Get the list of all databases
    pub async fn fetch_all_databases(&self) -> Result<Response> {
        self.send("_all_dbs", Method::Get, None, None).await
    }

    /// Create a database
    pub async fn db_create(&self, name: &str) -> Result<Response> {
        validate_database_name(name)?;
        let response = self.send(&encode_path_segment(name), Method::Put, None, None).await?;
        info!("Created database {}", name);
        Ok(response)
    }

    /// Drop a database
    pub async fn db_drop(&self, name: &str) -> Result<Response> {
        validate_database_name(name)?;
        let response = self.send(&encode_path_segment(name), Method::Delete, None, None).await?;
        info!("Dropped database {}", name);
        Ok(response)
    }

    /// Get database information
    pub async fn db_info(&self, name: &str) -> Result<Response> {
        validate_database_name(name)?;
        self.send(&encode_path_segment(name), Method::Get, None, None).await
    }
}

fn lock<T>(slot: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    slot.lock().unwrap_or_else(|poisoned| {
        warn!("Recovering poisoned connection diagnostics lock");
        poisoned.into_inner()
    })
}
