//! Ordered document collections for bulk operations

use serde_json::{json, Value};

use crate::database::Database;
use crate::document::{json_kind, Document};
use phly_couch_core::{CouchError, Response, Result};

/// Key of an entry in a [`DocumentSet`]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DocumentKey {
    /// Entry keyed by document id
    Id(String),

    /// Entry of a document without id, by insertion position
    Index(usize),
}

impl From<&str> for DocumentKey {
    fn from(id: &str) -> Self {
        DocumentKey::Id(id.to_string())
    }
}

impl From<String> for DocumentKey {
    fn from(id: String) -> Self {
        DocumentKey::Id(id)
    }
}

impl From<usize> for DocumentKey {
    fn from(index: usize) -> Self {
        DocumentKey::Index(index)
    }
}

/// Documents keyed by id, in insertion order
///
/// Adding a document whose id is already present replaces the payload in
/// place. Documents without an id get the next free positional key.
#[derive(Debug, Clone, Default)]
pub struct DocumentSet {
    entries: Vec<(DocumentKey, Document)>,
    next_index: usize,
    database: Option<Database>,
}

impl DocumentSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `{"rows": [...]}`, `{"docs": [...]}` or a bare array of objects
    pub fn from_json(json: &str) -> Result<Self> {
        Self::from_value(serde_json::from_str(json)?)
    }

    /// Build a set from a JSON value, see [`DocumentSet::from_json`]
    pub fn from_value(value: Value) -> Result<Self> {
        let mut set = Self::new();
        set.extend_from_value(value)?;
        Ok(set)
    }

    /// Add every document of a JSON value
    pub fn extend_from_value(&mut self, value: Value) -> Result<&mut Self> {
        let items = match value {
            Value::Object(mut fields) => match fields
                .shift_remove("rows")
                .or_else(|| fields.shift_remove("docs"))
            {
                Some(Value::Array(items)) => items,
                Some(other) => {
                    return Err(CouchError::Validation(format!(
                        "Document list must be an array, got {}",
                        json_kind(&other)
                    )))
                }
                None => vec![Value::Object(fields)],
            },
            Value::Array(items) => items,
            other => {
                return Err(CouchError::Validation(format!(
                    "Invalid document set input: {}",
                    json_kind(&other)
                )))
            }
        };

        for item in items {
            self.add_value(item)?;
        }
        Ok(self)
    }

    /// Add a document, replacing any entry with the same id
    pub fn add(&mut self, document: Document) -> &mut Self {
        let key = match document.id() {
            Some(id) => DocumentKey::Id(id.to_string()),
            None => {
                let key = DocumentKey::Index(self.next_index);
                self.next_index += 1;
                key
            }
        };

        match self.entries.iter_mut().find(|(existing, _)| *existing == key) {
            Some((_, slot)) => *slot = document,
            None => self.entries.push((key, document)),
        }
        self
    }

    /// Add a JSON object as a document
    pub fn add_value(&mut self, value: Value) -> Result<&mut Self> {
        match value {
            Value::Object(fields) => Ok(self.add(Document::from_fields(fields))),
            other => Err(CouchError::Validation(format!(
                "Only objects can be added to a document set, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// Remove an entry
    pub fn remove(&mut self, key: impl Into<DocumentKey>) -> Result<Document> {
        let key = key.into();
        match self.entries.iter().position(|(existing, _)| *existing == key) {
            Some(position) => Ok(self.entries.remove(position).1),
            None => Err(CouchError::NotFound(format!(
                "No document {:?} in the set",
                key
            ))),
        }
    }

    /// Look up an entry
    pub fn fetch(&self, key: impl Into<DocumentKey>) -> Option<&Document> {
        let key = key.into();
        self.entries
            .iter()
            .find(|(existing, _)| *existing == key)
            .map(|(_, document)| document)
    }

    /// Look up an entry for modification
    pub fn fetch_mut(&mut self, key: impl Into<DocumentKey>) -> Option<&mut Document> {
        let key = key.into();
        self.entries
            .iter_mut()
            .find(|(existing, _)| *existing == key)
            .map(|(_, document)| document)
    }

    /// Remove every entry
    pub fn clear(&mut self) {
        self.entries.clear();
        self.next_index = 0;
    }

    /// Number of documents
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&DocumentKey, &Document)> {
        self.entries.iter().map(|(key, document)| (key, document))
    }

    /// `{"docs": [...]}` in insertion order
    pub fn to_value(&self) -> Value {
        let docs: Vec<Value> = self.entries.iter().map(|(_, document)| document.to_value()).collect();
        json!({ "docs": docs })
    }

    /// JSON text of [`DocumentSet::to_value`]
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.to_value())?)
    }

    /// Bind the set to a database
    pub fn set_database(&mut self, database: Database) -> &mut Self {
        self.database = Some(database);
        self
    }

    /// The bound database
    pub fn database(&self) -> Result<&Database> {
        self.database.as_ref().ok_or_else(|| {
            CouchError::Configuration("No database is bound to this document set".to_string())
        })
    }

    /// Save every document in one request through the bound database
    pub async fn bulk_save(&self) -> Result<Response> {
        self.database()?.doc_bulk_save(self, None).await
    }
}

impl<'a> IntoIterator for &'a DocumentSet {
    type Item = &'a Document;
    type IntoIter = Documents<'a>;

    fn into_iter(self) -> Self::IntoIter {
        Documents {
            inner: self.entries.iter(),
        }
    }
}

/// Iterator over the documents of a [`DocumentSet`]
#[derive(Debug)]
pub struct Documents<'a> {
    inner: std::slice::Iter<'a, (DocumentKey, Document)>,
}

impl<'a> Iterator for Documents<'a> {
    type Item = &'a Document;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, document)| document)
    }
}
