//! Design documents
//!
//! A design document is a regular document whose id starts with
//! `_design/`. It carries a `language` tag and a `views` object mapping
//! view names to map/reduce sources. Only `_id`, `_rev`, `language` and
//! `views` may be set on it.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::database::Database;
use crate::document::{json_kind, Document, ID_FIELD, REV_FIELD};
use crate::view::{View, ViewTarget};
use phly_couch_core::utils::{
    design_document_id, is_design_document_id, strip_line_breaks, validate_language,
    DESIGN_PREFIX,
};
use phly_couch_core::{CouchError, QueryParams, Response, Result};

/// Language of new design documents
pub const DEFAULT_LANGUAGE: &str = "javascript";

const LANGUAGE_FIELD: &str = "language";
const VIEWS_FIELD: &str = "views";

/// Map and optional reduce source of one view
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewDefinition {
    /// Map function source
    pub map: String,

    /// Reduce function source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reduce: Option<String>,
}

impl ViewDefinition {
    /// A definition with line breaks stripped from both sources
    pub fn new(map: &str, reduce: Option<&str>) -> Self {
        Self {
            map: strip_line_breaks(map),
            reduce: reduce.map(strip_line_breaks),
        }
    }
}

/// How a view is inserted when the name is already taken
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ViewInsert {
    /// Fail with a conflict
    #[default]
    Strict,

    /// Replace the existing definition
    Overwrite,
}

/// A design document
#[derive(Debug, Clone, PartialEq)]
pub struct DesignDocument {
    document: Document,
}

impl DesignDocument {
    /// A new design document named `name`, with or without the prefix
    pub fn new(name: &str) -> Result<Self> {
        let id = design_document_id(name);
        if id.len() == DESIGN_PREFIX.len() {
            return Err(CouchError::Validation(
                "Design document name is empty".to_string(),
            ));
        }

        let mut document = Document::with_id(id);
        document.set(LANGUAGE_FIELD, DEFAULT_LANGUAGE);
        document.set(VIEWS_FIELD, json!({}));
        Ok(Self { document })
    }

    /// Wrap a loaded document; its id must start with `_design/`
    pub fn from_document(document: Document) -> Result<Self> {
        if !document.is_design() {
            return Err(CouchError::Validation(format!(
                "{:?} is not a design document id",
                document.id().unwrap_or_default()
            )));
        }
        if let Some(views) = document.get(VIEWS_FIELD) {
            if !views.is_object() {
                return Err(CouchError::Validation(format!(
                    "Design document views must be an object, got {}",
                    json_kind(views)
                )));
            }
        }
        Ok(Self { document })
    }

    /// Bind to a database
    pub fn with_database(mut self, database: Database) -> Self {
        self.document.set_database(database);
        self
    }

    /// Name without the `_design/` prefix
    pub fn name(&self) -> &str {
        let id = self.id();
        id.strip_prefix(DESIGN_PREFIX).unwrap_or(id)
    }

    /// Full id
    pub fn id(&self) -> &str {
        self.document.id().unwrap_or_default()
    }

    /// The underlying document
    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Unwrap the underlying document
    pub fn into_document(self) -> Document {
        self.document
    }

    /// Language tag
    pub fn language(&self) -> Option<&str> {
        self.document.get(LANGUAGE_FIELD).and_then(Value::as_str)
    }

    /// Set the language tag
    pub fn set_language(&mut self, language: &str) -> Result<&mut Self> {
        validate_language(language)?;
        self.document.set(LANGUAGE_FIELD, language);
        Ok(self)
    }

    /// Every view definition, in document order
    pub fn view_definitions(&self) -> Result<Vec<(String, ViewDefinition)>> {
        match self.document.get(VIEWS_FIELD) {
            Some(Value::Object(views)) => views
                .iter()
                .map(|(name, definition)| {
                    Ok((name.clone(), serde_json::from_value(definition.clone())?))
                })
                .collect(),
            _ => Ok(Vec::new()),
        }
    }

    /// One view definition
    pub fn view(&self, name: &str) -> Option<ViewDefinition> {
        self.views()
            .and_then(|views| views.get(name))
            .and_then(|definition| serde_json::from_value(definition.clone()).ok())
    }

    /// Whether a view is defined
    pub fn has_view(&self, name: &str) -> bool {
        self.views().map_or(false, |views| views.contains_key(name))
    }

    /// Define a new view; fails with a conflict when the name is taken
    pub fn add_view(&mut self, name: &str, map: &str, reduce: Option<&str>) -> Result<&mut Self> {
        self.insert_view(name, ViewDefinition::new(map, reduce), ViewInsert::Strict)
    }

    /// Define or replace a view
    pub fn set_view(&mut self, name: &str, map: &str, reduce: Option<&str>) -> Result<&mut Self> {
        self.insert_view(name, ViewDefinition::new(map, reduce), ViewInsert::Overwrite)
    }

    /// Insert a view definition under `name`
    pub fn insert_view(
        &mut self,
        name: &str,
        definition: ViewDefinition,
        mode: ViewInsert,
    ) -> Result<&mut Self> {
        if name.is_empty() || name.contains('/') {
            return Err(CouchError::Validation(format!(
                "Invalid view name: {:?}",
                name
            )));
        }
        if mode == ViewInsert::Strict && self.has_view(name) {
            return Err(CouchError::Conflict {
                message: format!("View {:?} already exists in {}", name, self.id()),
                failure: None,
            });
        }

        let definition = serde_json::to_value(definition)?;
        self.views_mut()?.insert(name.to_string(), definition);
        Ok(self)
    }

    /// Remove a view, returning its definition
    pub fn remove_view(&mut self, name: &str) -> Result<ViewDefinition> {
        let removed = self.views_mut()?.shift_remove(name);
        match removed {
            Some(definition) => Ok(serde_json::from_value(definition)?),
            None => Err(CouchError::NotFound(format!(
                "View {:?} is not defined in {}",
                name,
                self.id()
            ))),
        }
    }

    /// A field value
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.document.get(key)
    }

    /// Set one of `_id`, `_rev`, `language` or `views`
    pub fn set(&mut self, key: &str, value: Value) -> Result<&mut Self> {
        match key {
            ID_FIELD => {
                let id = value.as_str().unwrap_or_default();
                if !is_design_document_id(id) {
                    return Err(CouchError::Validation(format!(
                        "{:?} is not a design document id",
                        id
                    )));
                }
                self.document.set_id(id);
            }
            REV_FIELD => {
                self.document.set(REV_FIELD, value);
            }
            LANGUAGE_FIELD => match value.as_str() {
                Some(language) => {
                    self.set_language(language)?;
                }
                None => {
                    return Err(CouchError::Validation(
                        "Design document language must be a string".to_string(),
                    ))
                }
            },
            VIEWS_FIELD => {
                if !value.is_object() {
                    return Err(CouchError::Validation(format!(
                        "Design document views must be an object, got {}",
                        json_kind(&value)
                    )));
                }
                self.document.set(VIEWS_FIELD, value);
            }
            other => {
                return Err(CouchError::Validation(format!(
                    "Design documents do not accept the {:?} field",
                    other
                )))
            }
        }
        Ok(self)
    }

    /// A view of this design document, queried right away when `params` is non-empty
    pub async fn fetch_view(&self, name: &str, params: Option<QueryParams>) -> Result<View> {
        if !self.has_view(name) {
            return Err(CouchError::NotFound(format!(
                "View {:?} is not defined in {}",
                name,
                self.id()
            )));
        }

        let target = ViewTarget::Design {
            document: self.name().to_string(),
            view: name.to_string(),
        };
        let mut view = View::new(self.document.database()?.clone(), target);
        if let Some(params) = params.filter(|params| !params.is_empty()) {
            view.query(&params).await?;
        }
        Ok(view)
    }

    /// Save through the bound database
    pub async fn save(&mut self) -> Result<Response> {
        self.document.save().await
    }

    fn views(&self) -> Option<&Map<String, Value>> {
        self.document.get(VIEWS_FIELD).and_then(Value::as_object)
    }

    fn views_mut(&mut self) -> Result<&mut Map<String, Value>> {
        self.document
            .fields_mut()
            .entry(VIEWS_FIELD)
            .or_insert_with(|| Value::Object(Map::new()))
            .as_object_mut()
            .ok_or_else(|| {
                CouchError::Validation("Design document views must be an object".to_string())
            })
    }
}

impl TryFrom<Document> for DesignDocument {
    type Error = CouchError;

    fn try_from(document: Document) -> Result<Self> {
        Self::from_document(document)
    }
}
