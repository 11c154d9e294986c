//! Client library for CouchDB
//!
//! This library talks to a CouchDB server over plain HTTP/1.0 and exposes
//! databases, documents, bulk document sets, design documents and views.
//!
//! ```no_run
//! use std::sync::Arc;
//! use phly_couch_client::{Connection, Database, ViewResults};
//!
//! # async fn demo() -> phly_couch_client::Result<()> {
//! let connection = Arc::new(Connection::with_host_port("127.0.0.1", 5984));
//! let database = Database::new("testdb", connection)?;
//! database.create().await?;
//!
//! let mut document = database.doc_new(serde_json::json!({"_id": "a", "foo": "bar"}))?;
//! document.save().await?;
//!
//! let mut view = database.fetch_all_documents();
//! view.load().await?;
//! for row in view.rows()? {
//!     let document = row?.fetch_document().await?;
//!     println!("{}", document.to_json()?);
//! }
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod database;
pub mod design_document;
pub mod document;
pub mod document_set;
pub mod view;
pub mod view_row;

#[cfg(test)]
mod test_support;

pub use connection::{default_connection, set_default_connection, Connection};
pub use database::Database;
pub use design_document::{DesignDocument, ViewDefinition, ViewInsert};
pub use document::{Document, RevisionInfo};
pub use document_set::{DocumentKey, DocumentSet};
pub use view::{TemporaryView, View, ViewResult, ViewResults, ViewRows, ViewTarget};
pub use view_row::ViewRow;

pub use phly_couch_core::{
    ClientConfig, CouchError, Method, QueryEncoding, QueryParams, QueryValue, Response, Result,
};
