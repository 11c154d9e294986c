//! Phly Couch - a CouchDB connection and document/view access layer
//!
//! This is the root crate that ties the workspace together.
//! The implementation lives in the subcrates:
//! - `phly-couch-core`: errors, configuration, HTTP/1.0 request and response handling
//! - `phly-couch-client`: connections, databases, documents and views

pub use phly_couch_client::*;

/// Core building blocks
pub use phly_couch_core as couch_core;

/// Returns the version of the package.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
