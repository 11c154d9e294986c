//! Permanent and temporary views
//!
//! A view starts unfetched. [`View::query`] and [`TemporaryView::query`]
//! always execute and replace the stored result; `load()` queries once with
//! empty parameters when auto-fetch is enabled. The synchronous accessors
//! of [`ViewResults`] never touch the network and fail with a state error
//! until a result is present.

use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::database::Database;
use crate::design_document::{DesignDocument, ViewDefinition, ViewInsert};
use crate::view_row::ViewRow;
use phly_couch_core::error::to_protocol_error;
use phly_couch_core::utils::{encode_path_segment, strip_line_breaks, DESIGN_PREFIX};
use phly_couch_core::{CouchError, Method, QueryParams, Response, Result};

/// Decoded body of a view query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewResult {
    /// Rows in the whole view, as reported by the server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_rows: Option<u64>,

    /// Index of the first returned row
    #[serde(default)]
    pub offset: u64,

    /// Raw rows
    pub rows: Vec<Value>,
}

impl ViewResult {
    /// Decode a view response; the body must hold a `rows` array
    pub fn from_response(response: Response) -> Result<Self> {
        let body = response.into_body();
        if !body.get("rows").map_or(false, Value::is_array) {
            return Err(CouchError::Protocol("not a valid view result".to_string()));
        }
        serde_json::from_value(body)
            .map_err(|e| to_protocol_error(format!("not a valid view result: {}", e)))
    }
}

/// Accessors shared by [`View`] and [`TemporaryView`]
pub trait ViewResults {
    /// Stored result, `None` while unfetched
    fn result(&self) -> Option<&ViewResult>;

    /// Database the view reads from
    fn database(&self) -> &Database;

    /// Whether a result is stored
    fn is_fetched(&self) -> bool {
        self.result().is_some()
    }

    /// Stored result, or a state error while unfetched
    fn fetched(&self) -> Result<&ViewResult> {
        self.result().ok_or_else(|| {
            CouchError::State("View has not been queried yet".to_string())
        })
    }

    /// Number of rows in the stored result
    fn count(&self) -> Result<usize> {
        Ok(self.fetched()?.rows.len())
    }

    /// Server-reported `total_rows`, which can exceed [`ViewResults::count`]
    fn total_document_count(&self) -> Result<Option<u64>> {
        Ok(self.fetched()?.total_rows)
    }

    /// Server-reported offset
    fn offset(&self) -> Result<u64> {
        Ok(self.fetched()?.offset)
    }

    /// Rows of the stored result, built fresh on every call
    fn rows(&self) -> Result<ViewRows<'_>> {
        Ok(ViewRows {
            rows: self.fetched()?.rows.iter(),
            database: self.database(),
        })
    }

    /// Stored result as JSON
    fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self.fetched()?)?)
    }
}

/// Iterator building a [`ViewRow`] from each raw row
#[derive(Debug)]
pub struct ViewRows<'a> {
    rows: std::slice::Iter<'a, Value>,
    database: &'a Database,
}

impl<'a> Iterator for ViewRows<'a> {
    type Item = Result<ViewRow>;

    fn next(&mut self) -> Option<Self::Item> {
        self.rows
            .next()
            .map(|raw| ViewRow::from_value(raw, Some(self.database.clone())))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.rows.size_hint()
    }
}

/// What a permanent view reads from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewTarget {
    /// The built-in `_all_docs` view
    AllDocuments,

    /// A view defined in a design document
    Design {
        /// Design document name without the `_design/` prefix
        document: String,
        /// View name
        view: String,
    },
}

impl ViewTarget {
    /// Parse `_all_docs`, `design/view` or `_design/design/view`
    pub fn parse(name: &str) -> Result<Self> {
        if name == "_all_docs" {
            return Ok(ViewTarget::AllDocuments);
        }
        let bare = name.strip_prefix(DESIGN_PREFIX).unwrap_or(name);
        match bare.split_once('/') {
            Some((document, view))
                if !document.is_empty() && !view.is_empty() && !view.contains('/') =>
            {
                Ok(ViewTarget::Design {
                    document: document.to_string(),
                    view: view.to_string(),
                })
            }
            _ => Err(CouchError::Validation(format!(
                "View name must look like \"design/view\": {:?}",
                name
            ))),
        }
    }

    /// Request path below the database
    pub fn path(&self) -> String {
        match self {
            ViewTarget::AllDocuments => "_all_docs".to_string(),
            ViewTarget::Design { document, view } => {
                format!(
                    "{}{}/_view/{}",
                    DESIGN_PREFIX,
                    encode_path_segment(document),
                    encode_path_segment(view)
                )
            }
        }
    }
}

/// A permanent view
#[derive(Debug, Clone)]
pub struct View {
    database: Database,
    target: ViewTarget,
    auto_fetch: bool,
    result: Option<ViewResult>,
}

impl View {
    /// A view on `target`, unfetched
    pub fn new(database: Database, target: ViewTarget) -> Self {
        Self {
            database,
            target,
            auto_fetch: true,
            result: None,
        }
    }

    /// The built-in `_all_docs` view
    pub fn all_documents(database: Database) -> Self {
        Self::new(database, ViewTarget::AllDocuments)
    }

    /// A view addressed as `design/view`
    pub fn parse(database: Database, name: &str) -> Result<Self> {
        Ok(Self::new(database, ViewTarget::parse(name)?))
    }

    /// What the view reads from
    pub fn target(&self) -> &ViewTarget {
        &self.target
    }

    /// Whether `load()` may query an unfetched view
    pub fn auto_fetch(&self) -> bool {
        self.auto_fetch
    }

    /// Enable or disable the implicit query of `load()`
    pub fn set_auto_fetch(&mut self, enabled: bool) -> &mut Self {
        self.auto_fetch = enabled;
        self
    }

    /// Execute the view and store the result
    pub async fn query(&mut self, params: &QueryParams) -> Result<&ViewResult> {
        let result = self.execute(params).await?;
        Ok(&*self.result.insert(result))
    }

    /// The stored result, querying once when unfetched
    pub async fn load(&mut self) -> Result<&ViewResult> {
        if self.result.is_none() {
            require_auto_fetch(self.auto_fetch)?;
            let result = self.execute(&QueryParams::new()).await?;
            self.result = Some(result);
        }
        self.fetched()
    }

    async fn execute(&self, params: &QueryParams) -> Result<ViewResult> {
        let path = self.database.path(&self.target.path());
        let query = (!params.is_empty()).then_some(params);
        let response = self
            .database
            .connection()
            .send(&path, Method::Get, query, None)
            .await?;

        let result = ViewResult::from_response(response)?;
        debug!("View {} returned {} rows", path, result.rows.len());
        Ok(result)
    }

    /// Design document defining this view
    pub async fn fetch_design_document(&self) -> Result<DesignDocument> {
        match &self.target {
            ViewTarget::AllDocuments => Err(CouchError::Configuration(
                "_all_docs is not defined by a design document".to_string(),
            )),
            ViewTarget::Design { document, .. } => self.database.design_doc_open(document).await,
        }
    }
}

impl ViewResults for View {
    fn result(&self) -> Option<&ViewResult> {
        self.result.as_ref()
    }

    fn database(&self) -> &Database {
        &self.database
    }
}

/// An ad-hoc view executed through `_temp_view`
#[derive(Debug, Clone)]
pub struct TemporaryView {
    database: Database,
    map: String,
    reduce: Option<String>,
    auto_fetch: bool,
    result: Option<ViewResult>,
}

impl TemporaryView {
    /// A temporary view, unfetched; line breaks are stripped from the sources
    pub fn new(database: Database, map: &str, reduce: Option<&str>) -> Self {
        Self {
            database,
            map: strip_line_breaks(map),
            reduce: reduce.map(strip_line_breaks),
            auto_fetch: true,
            result: None,
        }
    }

    /// Map function source
    pub fn map(&self) -> &str {
        &self.map
    }

    /// Replace the map function
    pub fn set_map(&mut self, map: &str) -> &mut Self {
        self.map = strip_line_breaks(map);
        self
    }

    /// Reduce function source
    pub fn reduce(&self) -> Option<&str> {
        self.reduce.as_deref()
    }

    /// Replace or clear the reduce function
    pub fn set_reduce(&mut self, reduce: Option<&str>) -> &mut Self {
        self.reduce = reduce.map(strip_line_breaks);
        self
    }

    /// Whether `load()` may query an unfetched view
    pub fn auto_fetch(&self) -> bool {
        self.auto_fetch
    }

    /// Enable or disable the implicit query of `load()`
    pub fn set_auto_fetch(&mut self, enabled: bool) -> &mut Self {
        self.auto_fetch = enabled;
        self
    }

    /// Map and reduce as a view definition
    pub fn definition(&self) -> ViewDefinition {
        ViewDefinition {
            map: self.map.clone(),
            reduce: self.reduce.clone(),
        }
    }

    /// Execute the view and store the result
    pub async fn query(&mut self, params: &QueryParams) -> Result<&ViewResult> {
        let result = self.execute(params).await?;
        Ok(&*self.result.insert(result))
    }

    /// The stored result, querying once when unfetched
    pub async fn load(&mut self) -> Result<&ViewResult> {
        if self.result.is_none() {
            require_auto_fetch(self.auto_fetch)?;
            let result = self.execute(&QueryParams::new()).await?;
            self.result = Some(result);
        }
        self.fetched()
    }

    async fn execute(&self, params: &QueryParams) -> Result<ViewResult> {
        let mut body = json!({ "map": self.map });
        if let Some(reduce) = &self.reduce {
            body["reduce"] = Value::String(reduce.clone());
        }
        let query = (!params.is_empty()).then_some(params);
        let response = self
            .database
            .connection()
            .send(
                &self.database.path("_temp_view"),
                Method::Post,
                query,
                Some(serde_json::to_string(&body)?),
            )
            .await?;

        let result = ViewResult::from_response(response)?;
        debug!(
            "Temporary view on {} returned {} rows",
            self.database.name(),
            result.rows.len()
        );
        Ok(result)
    }

    /// Temporary views have no design document
    pub async fn fetch_design_document(&self) -> Result<DesignDocument> {
        Err(CouchError::Configuration(
            "Temporary views are not defined by a design document".to_string(),
        ))
    }

    /// Store this view's map/reduce as `view` in design document `design`
    ///
    /// The design document is loaded, or created when it does not exist yet,
    /// and saved after the view is inserted.
    pub async fn move_to_permanent_view(
        &self,
        design: &str,
        view: &str,
        mode: ViewInsert,
    ) -> Result<DesignDocument> {
        let mut document = match self.database.design_doc_open(design).await {
            Ok(document) => document,
            Err(err) if err.is_not_found() => {
                DesignDocument::new(design)?.with_database(self.database.clone())
            }
            Err(err) => return Err(err),
        };

        document.insert_view(view, self.definition(), mode)?;
        document.save().await?;
        debug!("Moved temporary view to {}/{}", document.name(), view);
        Ok(document)
    }
}

impl ViewResults for TemporaryView {
    fn result(&self) -> Option<&ViewResult> {
        self.result.as_ref()
    }

    fn database(&self) -> &Database {
        &self.database
    }
}

fn require_auto_fetch(enabled: bool) -> Result<()> {
    if enabled {
        Ok(())
    } else {
        Err(CouchError::State(
            "View has not been queried and auto-fetch is disabled".to_string(),
        ))
    }
}
