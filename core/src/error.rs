//! Error types for the core crate
//!
//! This module provides the single error type shared by the core and client
//! crates. Every failure the library can report is one variant of
//! [`CouchError`], so callers can branch on the kind of failure.

use std::fmt;
use std::io;
use std::time::Duration;
use thiserror::Error;

use crate::http::Response;

/// Details of a request the server answered with a failure status
#[derive(Debug, Clone)]
pub struct RequestFailure {
    /// Parsed server response
    pub response: Response,

    /// Raw request text that produced the response
    pub request: String,

    /// `error` field of the JSON body, if the server sent one
    pub error: Option<String>,

    /// `reason` field of the JSON body, if the server sent one
    pub reason: Option<String>,
}

impl RequestFailure {
    /// Build a failure record from a response and the request that caused it
    pub fn new(response: Response, request: String) -> Self {
        let (error, reason) = response.error_fields();
        Self {
            response,
            request,
            error,
            reason,
        }
    }

    /// HTTP status of the failed response
    pub fn status(&self) -> u16 {
        self.response.status()
    }
}

impl fmt::Display for RequestFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "status {}", self.status())?;
        if let Some(error) = &self.error {
            write!(f, " ({})", error)?;
        }
        if let Some(reason) = &self.reason {
            write!(f, ": {}", reason)?;
        }
        Ok(())
    }
}

/// Error type for all CouchDB operations
#[derive(Error, Debug)]
pub enum CouchError {
    /// Invalid database name, document name or constructor input
    #[error("Validation error: {0}")]
    Validation(String),

    /// The socket to the server could not be opened
    #[error("Connection error: cannot connect to {host}:{port}: {source}")]
    Connection {
        /// Host the connection was attempted to
        host: String,
        /// Port the connection was attempted to
        port: u16,
        /// Underlying OS error
        #[source]
        source: io::Error,
    },

    /// Connecting or reading took longer than the configured timeout
    #[error("Timeout error: {host}:{port} did not respond within {after:?}")]
    Timeout {
        /// Host of the stalled request
        host: String,
        /// Port of the stalled request
        port: u16,
        /// Timeout that elapsed
        after: Duration,
    },

    /// The server answered with a status outside [200, 400)
    #[error("Request error: {0}")]
    Request(Box<RequestFailure>),

    /// The response could not be understood
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Stale revision, duplicate id or duplicate view name
    #[error("Conflict error: {message}")]
    Conflict {
        /// Description of the conflict
        message: String,
        /// Server response when the conflict was reported by CouchDB
        failure: Option<Box<RequestFailure>>,
    },

    /// Lookup or removal of an absent key
    #[error("Not found: {0}")]
    NotFound(String),

    /// Missing connection, database binding or design document
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Attempt to modify read-only data
    #[error("Read-only error: {0}")]
    ReadOnly(String),

    /// Operation needs data that has not been fetched yet
    #[error("State error: {0}")]
    State(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for CouchDB operations
pub type Result<T> = std::result::Result<T, CouchError>;

impl CouchError {
    /// Classify a failed response. 409 and 412 become conflicts, everything
    /// else a request error.
    pub fn from_failed_response(response: Response, request: String) -> Self {
        let failure = Box::new(RequestFailure::new(response, request));
        match failure.status() {
            409 | 412 => CouchError::Conflict {
                message: failure.to_string(),
                failure: Some(failure),
            },
            _ => CouchError::Request(failure),
        }
    }

    /// Server response attached to this error, if any
    pub fn response(&self) -> Option<&Response> {
        match self {
            CouchError::Request(failure) => Some(&failure.response),
            CouchError::Conflict {
                failure: Some(failure),
                ..
            } => Some(&failure.response),
            _ => None,
        }
    }

    /// HTTP status attached to this error, if any
    pub fn status(&self) -> Option<u16> {
        self.response().map(Response::status)
    }

    /// Whether this error is a conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, CouchError::Conflict { .. })
    }

    /// Whether this error reports an absent key or a 404 from the server
    pub fn is_not_found(&self) -> bool {
        match self {
            CouchError::NotFound(_) => true,
            CouchError::Request(failure) => failure.status() == 404,
            _ => false,
        }
    }
}

/// Convert a displayable error to a Validation error
pub fn to_validation_error<E: fmt::Display>(err: E) -> CouchError {
    CouchError::Validation(err.to_string())
}

/// Convert a displayable error to a Protocol error
pub fn to_protocol_error<E: fmt::Display>(err: E) -> CouchError {
    CouchError::Protocol(err.to_string())
}

/// Convert a displayable error to a Configuration error
pub fn to_config_error<E: fmt::Display>(err: E) -> CouchError {
    CouchError::Configuration(err.to_string())
}
