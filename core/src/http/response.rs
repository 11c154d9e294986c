//! Raw HTTP response parsing
//!
//! A [`Response`] is built once from the text read off the socket and is
//! read-only afterwards.

use log::warn;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

use crate::error::{CouchError, Result};

/// Parsed CouchDB response
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    raw: String,
    status: u16,
    headers: HashMap<String, String>,
    body: Value,
}

impl Response {
    /// Parse a raw HTTP response
    ///
    /// The header block ends at the first blank line. The status code is
    /// read from characters 9 to 11 of the status line; header lines are
    /// split on the first `": "`. An empty body decodes to `Value::Null`.
    /// A successful response must carry JSON; a failed one whose body is not
    /// JSON (a proxy error page, say) keeps the text as `Value::String`.
    pub fn parse(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        let (head, body) = raw.split_once("\r\n\r\n").unwrap_or((raw.as_str(), ""));

        let mut lines = head.split("\r\n");
        let status_line = lines.next().unwrap_or_default();
        let status = status_line
            .get(9..12)
            .and_then(|code| code.parse::<u16>().ok())
            .ok_or_else(|| {
                CouchError::Protocol(format!("Malformed status line: {:?}", status_line))
            })?;

        let mut headers = HashMap::new();
        for line in lines {
            match line.split_once(": ") {
                Some((name, value)) => {
                    headers.insert(name.to_string(), value.to_string());
                }
                None => warn!("Skipping malformed response header line {:?}", line),
            }
        }

        let successful = matches!(status / 100, 2 | 3);
        let body = if body.trim().is_empty() {
            Value::Null
        } else {
            match serde_json::from_str(body) {
                Ok(value) => value,
                Err(_) if !successful => Value::String(body.to_string()),
                Err(e) => {
                    return Err(CouchError::Protocol(format!(
                        "Response body is not valid JSON: {}",
                        e
                    )))
                }
            }
        };

        Ok(Self {
            raw,
            status,
            headers,
            body,
        })
    }

    /// Raw response text
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// HTTP status code
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Whether the status is 2xx or 3xx
    pub fn is_successful(&self) -> bool {
        matches!(self.status / 100, 2 | 3)
    }

    /// All headers, keyed as received
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// A single header, `None` when absent
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// Decoded JSON body
    pub fn body(&self) -> &Value {
        &self.body
    }

    /// Take the decoded body
    pub fn into_body(self) -> Value {
        self.body
    }

    /// Field of an object body, `None` when absent or the body is not an object
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.body.as_object().and_then(|object| object.get(field))
    }

    /// Deserialize the body into a typed value
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.body.clone())?)
    }

    /// The `error` and `reason` fields CouchDB sends on failures
    pub fn error_fields(&self) -> (Option<String>, Option<String>) {
        let text = |field: &str| {
            self.get(field).map(|value| match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
        };
        (text("error"), text("reason"))
    }

    /// Number of top-level entries in an object or array body
    pub fn len(&self) -> usize {
        match &self.body {
            Value::Object(object) => object.len(),
            Value::Array(items) => items.len(),
            _ => 0,
        }
    }

    /// Whether the body has no top-level entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate over the top-level entries of the body in order
    pub fn iter(&self) -> Entries<'_> {
        let inner = match &self.body {
            Value::Object(object) => EntriesInner::Object(object.iter()),
            Value::Array(items) => EntriesInner::Array(items.iter().enumerate()),
            _ => EntriesInner::Empty,
        };
        Entries { inner }
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl<'a> IntoIterator for &'a Response {
    type Item = (EntryKey<'a>, &'a Value);
    type IntoIter = Entries<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Key of a top-level body entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKey<'a> {
    /// Object member name
    Name(&'a str),

    /// Array position
    Index(usize),
}

/// Iterator over the top-level entries of a response body
pub struct Entries<'a> {
    inner: EntriesInner<'a>,
}

enum EntriesInner<'a> {
    Object(serde_json::map::Iter<'a>),
    Array(std::iter::Enumerate<std::slice::Iter<'a, Value>>),
    Empty,
}

impl<'a> Iterator for Entries<'a> {
    type Item = (EntryKey<'a>, &'a Value);

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.inner {
            EntriesInner::Object(iter) => iter
                .next()
                .map(|(name, value)| (EntryKey::Name(name.as_str()), value)),
            EntriesInner::Array(iter) => iter
                .next()
                .map(|(index, value)| (EntryKey::Index(index), value)),
            EntriesInner::Empty => None,
        }
    }
}
