//! Database facade
//!
//! A [`Database`] pairs a validated database name with a shared
//! [`Connection`] and is the entry point for document, view and bulk
//! operations. It is cheap to clone; documents, views and rows keep a clone
//! as their back reference.

use log::{debug, info};
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::connection::{default_connection, Connection};
use crate::design_document::DesignDocument;
use crate::document::{json_kind, Document};
use crate::document_set::DocumentSet;
use crate::view::{TemporaryView, View};
use phly_couch_core::utils::{
    design_document_id, document_path_segment, encode_path_segment, validate_database_name,
};
use phly_couch_core::{CouchError, Method, QueryParams, Response, Result};

/// A named database on a CouchDB server
#[derive(Debug, Clone)]
pub struct Database {
    /// Database name
    name: String,

    /// Connection shared with every object bound to this database
    connection: Arc<Connection>,
}

impl Database {
    /// Create a database handle; the name is validated, nothing is sent
    pub fn new(name: impl Into<String>, connection: Arc<Connection>) -> Result<Self> {
        let name = name.into();
        validate_database_name(&name)?;
        Ok(Self { name, connection })
    }

    /// Create a database handle on the registered default connection
    pub fn with_default_connection(name: impl Into<String>) -> Result<Self> {
        Self::new(name, default_connection()?)
    }

    /// Database name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Underlying connection
    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    /// Create the database on the server
    pub async fn create(&self) -> Result<Response> {
        self.connection.db_create(&self.name).await
    }

    /// Drop the database on the server
    pub async fn drop_database(&self) -> Result<Response> {
        self.connection.db_drop(&self.name).await
    }

    /// Database information
    pub async fn info(&self) -> Result<Response> {
        self.connection.db_info(&self.name).await
    }

    /// Start compaction
    pub async fn compact(&self) -> Result<Response> {
        let response = self
            .connection
            .send(&self.path("_compact"), Method::Post, None, Some("{}".to_string()))
            .await?;
        info!("Started compaction of {}", self.name);
        Ok(response)
    }

    /// The built-in `_all_docs` view, unfetched
    pub fn fetch_all_documents(&self) -> View {
        View::all_documents(self.clone())
    }

    /// A view addressed as `design/view`
    ///
    /// The view is queried right away when `params` is non-empty.
    pub async fn fetch_view(&self, name: &str, params: Option<QueryParams>) -> Result<View> {
        let mut view = View::parse(self.clone(), name)?;
        query_if_given(&mut view, params).await?;
        Ok(view)
    }

    /// An ad-hoc view from map and optional reduce sources
    ///
    /// The view is queried right away when `params` is non-empty.
    pub async fn fetch_temporary_view(
        &self,
        map: &str,
        reduce: Option<&str>,
        params: Option<QueryParams>,
    ) -> Result<TemporaryView> {
        let mut view = TemporaryView::new(self.clone(), map, reduce);
        if let Some(params) = params.filter(|params| !params.is_empty()) {
            view.query(&params).await?;
        }
        Ok(view)
    }

    /// A new unsaved document bound to this database
    pub fn doc_new(&self, fields: Value) -> Result<Document> {
        Ok(Document::try_from(fields)?.with_database(self.clone()))
    }

    /// Load a document
    pub async fn doc_open(&self, id: &str, options: Option<&QueryParams>) -> Result<Document> {
        if id.is_empty() {
            return Err(CouchError::Validation("Document id is empty".to_string()));
        }
        let response = self
            .connection
            .send(&self.document_path(id), Method::Get, options, None)
            .await?;
        let fields = object_body(response, "document")?;
        Ok(Document::from_fields(fields).with_database(self.clone()))
    }

    /// Load a design document; the `_design/` prefix is added when missing
    pub async fn design_doc_open(&self, name: &str) -> Result<DesignDocument> {
        let document = self.doc_open(&design_document_id(name), None).await?;
        DesignDocument::from_document(document)
    }

    /// Save a document
    ///
    /// Documents with an id are written with PUT, documents without one are
    /// POSTed and receive a server-assigned id. The id and revision from
    /// the response are written back into the document, which is then
    /// bound to this database.
    pub async fn doc_save(&self, document: &mut Document) -> Result<Response> {
        let body = document.to_json()?;
        let result = match document.id() {
            Some(id) => {
                self.connection
                    .send(&self.document_path(id), Method::Put, None, Some(body))
                    .await
            }
            None if document.revision().is_some() => {
                return Err(CouchError::Validation(
                    "Document has a revision but no id".to_string(),
                ))
            }
            None => {
                self.connection
                    .send(&self.path(""), Method::Post, None, Some(body))
                    .await
            }
        };

        let response = result.map_err(|err| match err {
            CouchError::Conflict { failure, .. } => CouchError::Conflict {
                message: format!(
                    "Document {:?} was modified since revision {:?}",
                    document.id().unwrap_or_default(),
                    document.revision().unwrap_or_default()
                ),
                failure,
            },
            other => other,
        })?;

        if let Some(id) = response.get("id").and_then(Value::as_str) {
            document.set_id(id);
        }
        if let Some(rev) = response.get("rev").and_then(Value::as_str) {
            document.set_revision(rev);
        }
        document.set_database(self.clone());
        debug!(
            "Saved document {} at revision {}",
            document.id().unwrap_or_default(),
            document.revision().unwrap_or_default()
        );
        Ok(response)
    }

    /// Delete a document; it must carry both id and revision
    pub async fn doc_remove(&self, document: &Document) -> Result<Response> {
        let (id, rev) = match (document.id(), document.revision()) {
            (Some(id), Some(rev)) => (id, rev),
            _ => {
                return Err(CouchError::Validation(
                    "Document needs an id and a revision to be removed".to_string(),
                ))
            }
        };
        let query = QueryParams::new().with_raw("rev", rev);
        let response = self
            .connection
            .send(&self.document_path(id), Method::Delete, Some(&query), None)
            .await?;
        debug!("Removed document {} at revision {}", id, rev);
        Ok(response)
    }

    /// Save many documents in one request
    pub async fn doc_bulk_save(
        &self,
        documents: &DocumentSet,
        options: Option<&QueryParams>,
    ) -> Result<Response> {
        let response = self
            .connection
            .send(
                &self.path("_bulk_docs"),
                Method::Post,
                options,
                Some(documents.to_json()?),
            )
            .await?;
        info!("Saved {} documents to {} in bulk", documents.len(), self.name);
        Ok(response)
    }

    /// Path of a resource inside this database; `resource` is used as given
    pub(crate) fn path(&self, resource: &str) -> String {
        format!("{}/{}", encode_path_segment(&self.name), resource)
    }

    /// Path of a document, with the id encoded as one segment
    pub(crate) fn document_path(&self, id: &str) -> String {
        self.path(&document_path_segment(id))
    }
}

async fn query_if_given(view: &mut View, params: Option<QueryParams>) -> Result<()> {
    if let Some(params) = params.filter(|params| !params.is_empty()) {
        view.query(&params).await?;
    }
    Ok(())
}

pub(crate) fn object_body(response: Response, what: &str) -> Result<Map<String, Value>> {
    match response.into_body() {
        Value::Object(fields) => Ok(fields),
        other => Err(CouchError::Protocol(format!(
            "Expected a {} object, got {}",
            what,
            json_kind(&other)
        ))),
    }
}
