//! CouchDB documents
//!
//! A [`Document`] is an ordered map of JSON fields. Two keys are reserved by
//! CouchDB: `_id`, the document identity, and `_rev`, the revision token
//! used for optimistic concurrency. A document without `_id` has never been
//! saved.

use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::database::Database;
use phly_couch_core::utils::is_design_document_id;
use phly_couch_core::{CouchError, QueryParams, Response, Result};

/// Identity field
pub const ID_FIELD: &str = "_id";

/// Revision field
pub const REV_FIELD: &str = "_rev";

/// Revision history field returned with `revs_info=true`
pub const REVS_INFO_FIELD: &str = "_revs_info";

/// One entry of a document's revision history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionInfo {
    /// Revision token
    pub rev: String,

    /// `available`, `missing` or `deleted`
    pub status: String,
}

/// A JSON document
#[derive(Debug, Clone, Default)]
pub struct Document {
    /// Document fields in insertion order
    fields: Map<String, Value>,

    /// Revision history, once fetched
    revisions: Option<Vec<RevisionInfo>>,

    /// Database the document is saved to and loaded from
    database: Option<Database>,
}

impl Document {
    /// Create an empty, unsaved document
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a document with only an id
    pub fn with_id(id: impl Into<String>) -> Self {
        let mut document = Self::new();
        document.set_id(id);
        document
    }

    /// Create a document from a field map
    ///
    /// `_id` and `_rev` are coerced the way [`Document::set`] coerces them.
    pub fn from_fields(fields: Map<String, Value>) -> Self {
        Self {
            fields: with_reserved_strings(fields),
            ..Self::default()
        }
    }

    /// Parse a JSON object
    pub fn from_json(json: &str) -> Result<Self> {
        let mut document = Self::new();
        document.load_json(json)?;
        Ok(document)
    }

    /// A string starting with `{` is parsed as JSON, any other string is an id
    pub fn from_input(input: &str) -> Result<Self> {
        if input.starts_with('{') {
            Self::from_json(input)
        } else {
            Ok(Self::with_id(input))
        }
    }

    /// Bind the document to a database
    pub fn with_database(mut self, database: Database) -> Self {
        self.database = Some(database);
        self
    }

    /// Bind the document to a database
    pub fn set_database(&mut self, database: Database) {
        self.database = Some(database);
    }

    /// The bound database
    pub fn database(&self) -> Result<&Database> {
        self.database.as_ref().ok_or_else(|| {
            CouchError::Configuration("No database is bound to this document".to_string())
        })
    }

    /// Document id, `None` for unsaved documents
    pub fn id(&self) -> Option<&str> {
        self.fields.get(ID_FIELD).and_then(Value::as_str)
    }

    /// Set the document id
    pub fn set_id(&mut self, id: impl Into<String>) -> &mut Self {
        self.fields.insert(ID_FIELD.to_string(), Value::String(id.into()));
        self
    }

    /// Remove the document id; a no-op when none is set
    pub fn clear_id(&mut self) -> &mut Self {
        self.fields.shift_remove(ID_FIELD);
        self
    }

    /// Revision token, `None` until the server assigned one
    pub fn revision(&self) -> Option<&str> {
        self.fields.get(REV_FIELD).and_then(Value::as_str)
    }

    /// Set the revision token
    pub fn set_revision(&mut self, revision: impl Into<String>) -> &mut Self {
        self.fields
            .insert(REV_FIELD.to_string(), Value::String(revision.into()));
        self
    }

    /// Remove the revision token; a no-op when none is set
    pub fn clear_revision(&mut self) -> &mut Self {
        self.fields.shift_remove(REV_FIELD);
        self
    }

    /// Whether this is a design document
    pub fn is_design(&self) -> bool {
        self.id().map_or(false, is_design_document_id)
    }

    /// A field value
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Set a field
    ///
    /// `_id` and `_rev` are always stored as strings: other values are
    /// coerced to their JSON text and `null` removes the key.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        let key = key.into();
        let value = value.into();
        if key == ID_FIELD || key == REV_FIELD {
            match reserved_string(value) {
                Some(text) => {
                    self.fields.insert(key, text);
                }
                None => {
                    self.fields.shift_remove(&key);
                }
            }
        } else {
            self.fields.insert(key, value);
        }
        self
    }

    /// Remove a field, returning its value
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.fields.shift_remove(key)
    }

    /// Whether a field is present
    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// All fields
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub(crate) fn fields_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.fields
    }

    /// Fields as a JSON object
    pub fn to_value(&self) -> Value {
        Value::Object(self.fields.clone())
    }

    /// Fields as JSON text, in field order
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.fields)?)
    }

    /// Replace all fields
    pub fn load_fields(&mut self, fields: Map<String, Value>) -> &mut Self {
        self.fields = with_reserved_strings(fields);
        self
    }

    /// Replace all fields from a JSON object
    pub fn load_json(&mut self, json: &str) -> Result<&mut Self> {
        match serde_json::from_str(json)? {
            Value::Object(fields) => Ok(self.load_fields(fields)),
            other => Err(CouchError::Validation(format!(
                "Document JSON must be an object, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// Revision history without network access
    ///
    /// Returns the list cached by [`Document::fetch_all_revisions`] or a
    /// `_revs_info` field loaded with the document.
    pub fn revisions(&self) -> Result<Vec<RevisionInfo>> {
        if let Some(revisions) = &self.revisions {
            return Ok(revisions.clone());
        }
        match self.fields.get(REVS_INFO_FIELD) {
            Some(value) => Ok(serde_json::from_value(value.clone())?),
            None => Err(CouchError::State(
                "Revision history has not been fetched".to_string(),
            )),
        }
    }

    /// Revision history, fetched from the server on the first call only
    pub async fn fetch_all_revisions(&mut self) -> Result<Vec<RevisionInfo>> {
        if let Some(revisions) = &self.revisions {
            return Ok(revisions.clone());
        }

        let id = self.require_id()?.to_string();
        let query = QueryParams::new().with("revs_info", true);
        let fetched = self.database()?.doc_open(&id, Some(&query)).await?;
        let revisions: Vec<RevisionInfo> = match fetched.get(REVS_INFO_FIELD) {
            Some(value) => serde_json::from_value(value.clone())?,
            None => {
                return Err(CouchError::Protocol(format!(
                    "Server returned no revision history for {:?}",
                    id
                )))
            }
        };

        self.revisions = Some(revisions.clone());
        Ok(revisions)
    }

    /// Load a past revision as a new document; `self` is unchanged
    pub async fn fetch_revision(&self, revision: &str) -> Result<Document> {
        let id = self.require_id()?;
        let query = QueryParams::new().with_raw("rev", revision);
        self.database()?.doc_open(id, Some(&query)).await
    }

    /// Replace this document's fields with those of a past revision
    pub async fn revert_to_revision(&mut self, revision: &str) -> Result<()> {
        let fetched = self.fetch_revision(revision).await?;
        self.fields = fetched.fields;
        self.revisions = None;
        Ok(())
    }

    /// Save through the bound database
    pub async fn save(&mut self) -> Result<Response> {
        let database = self.database()?.clone();
        database.doc_save(self).await
    }

    /// Delete on the server through the bound database
    ///
    /// The in-memory document is left as it is.
    pub async fn delete(&self) -> Result<Response> {
        self.database()?.doc_remove(self).await
    }

    fn require_id(&self) -> Result<&str> {
        self.id()
            .ok_or_else(|| CouchError::Validation("Document has no id".to_string()))
    }
}

impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields
    }
}

impl Serialize for Document {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.fields.serialize(serializer)
    }
}

impl TryFrom<Value> for Document {
    type Error = CouchError;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Object(fields) => Ok(Document::from_fields(fields)),
            Value::String(input) => Document::from_input(&input),
            other => Err(CouchError::Validation(format!(
                "Invalid document input: {}",
                json_kind(&other)
            ))),
        }
    }
}

/// `_id`/`_rev` values are strings: null drops the key, anything else
/// becomes its JSON text
fn reserved_string(value: Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(Value::String(text)),
        other => Some(Value::String(other.to_string())),
    }
}

fn with_reserved_strings(mut fields: Map<String, Value>) -> Map<String, Value> {
    for key in [ID_FIELD, REV_FIELD] {
        let Some(value) = fields.get_mut(key) else {
            continue;
        };
        match reserved_string(value.take()) {
            Some(text) => *value = text,
            None => {
                fields.shift_remove(key);
            }
        }
    }
    fields
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
