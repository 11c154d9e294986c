//! Read-only view rows

use serde_json::Value;

use crate::database::Database;
use crate::document::{json_kind, Document};
use phly_couch_core::{CouchError, Result};

/// One row of a view result: `{"id", "key", "value"}`
#[derive(Debug, Clone)]
pub struct ViewRow {
    id: String,
    key: Value,
    value: Value,
    database: Option<Database>,
}

impl ViewRow {
    /// Build a row from its raw JSON; `id`, `key` and `value` are required
    pub fn from_value(raw: &Value, database: Option<Database>) -> Result<Self> {
        let field = |name: &str| {
            raw.get(name).cloned().ok_or_else(|| {
                CouchError::Validation(format!("View row is missing the {:?} field", name))
            })
        };

        let id = match field("id")? {
            Value::String(id) => id,
            other => {
                return Err(CouchError::Validation(format!(
                    "View row id must be a string, got {}",
                    json_kind(&other)
                )))
            }
        };
        Ok(Self {
            id,
            key: field("key")?,
            value: field("value")?,
            database,
        })
    }

    /// Id of the document that emitted the row
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Emitted key
    pub fn key(&self) -> &Value {
        &self.key
    }

    /// Emitted value
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// A field of an object value
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.value.get(name)
    }

    /// Rows are read-only
    pub fn set(&mut self, name: &str, _value: impl Into<Value>) -> Result<()> {
        Err(CouchError::ReadOnly(format!(
            "Cannot set {:?}: view rows are read-only",
            name
        )))
    }

    /// Rows are read-only
    pub fn unset(&mut self, name: &str) -> Result<()> {
        Err(CouchError::ReadOnly(format!(
            "Cannot unset {:?}: view rows are read-only",
            name
        )))
    }

    /// Load the full document the row points at
    pub async fn fetch_document(&self) -> Result<Document> {
        let database = self.database.as_ref().ok_or_else(|| {
            CouchError::Configuration("No database is bound to this view row".to_string())
        })?;
        database.doc_open(&self.id, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ok, FakeServer};
    use serde_json::json;

    #[test]
    fn test_field_access_and_read_only() {
        let raw = json!({"id": "a", "key": ["x", 1], "value": {"title": "Hello", "n": 3}});
        let mut row = ViewRow::from_value(&raw, None).unwrap();

        assert_eq!(row.id(), "a");
        assert_eq!(row.key(), &json!(["x", 1]));
        assert_eq!(row.get("title"), Some(&json!("Hello")));
        assert_eq!(row.get("missing"), None);

        assert!(matches!(row.set("title", "Bye"), Err(CouchError::ReadOnly(_))));
        assert!(matches!(row.unset("title"), Err(CouchError::ReadOnly(_))));
        assert_eq!(row.get("title"), Some(&json!("Hello")));
    }

    #[test]
    fn test_missing_fields_are_rejected() {
        for raw in [
            json!({"key": 1, "value": 2}),
            json!({"id": "a", "value": 2}),
            json!({"id": "a", "key": 1}),
            json!({"id": null, "key": 1, "value": 2}),
            json!({"id": 7, "key": 1, "value": 2}),
        ] {
            assert!(matches!(
                ViewRow::from_value(&raw, None),
                Err(CouchError::Validation(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_fetch_document() {
        let row = ViewRow::from_value(&json!({"id": "a", "key": "a", "value": null}), None).unwrap();
        assert!(matches!(row.fetch_document().await, Err(CouchError::Configuration(_))));

        let server = FakeServer::start(vec![ok(r#"{"_id":"a","_rev":"1-x","foo":"bar"}"#)]).await;
        let raw = json!({"id": "a", "key": "a", "value": {"rev": "1-x"}});
        let row = ViewRow::from_value(&raw, Some(server.database("testdb"))).unwrap();

        let document = row.fetch_document().await.unwrap();
        assert_eq!(document.get("foo"), Some(&json!("bar")));

        let requests = server.requests().await;
        assert!(requests[0].starts_with("GET /testdb/a HTTP/1.0"));
    }
}
