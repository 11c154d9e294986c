//! # Phly Couch Core
//!
//! Wire-level building blocks for the Phly CouchDB client: the error
//! taxonomy, client configuration, HTTP/1.0 request rendering, response
//! parsing and name validation. Nothing in this crate touches the network.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod config;
pub mod error;
pub mod http;
pub mod utils;

/// Re-export common types for ease of use
pub use config::ClientConfig;
pub use error::{CouchError, RequestFailure, Result};
pub use http::{Method, QueryEncoding, QueryParams, QueryValue, Request, Response};

/// Version of the core crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
