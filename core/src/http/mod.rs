//! HTTP wire types
//!
//! Requests and responses are plain data here. Socket I/O lives in the
//! client crate's connection.

pub mod request;
pub mod response;

pub use request::{Method, QueryEncoding, QueryParams, QueryValue, Request};
pub use response::{Entries, EntryKey, Response};
