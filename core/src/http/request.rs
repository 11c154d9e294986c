//! Raw HTTP/1.0 request construction
//!
//! CouchDB is spoken to over plain HTTP/1.0: one request per socket, the
//! server closes the connection after answering. This module renders a
//! [`Request`] to the exact text written to the socket.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// HTTP method used by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
    /// GET
    Get,

    /// POST
    Post,

    /// PUT
    Put,

    /// DELETE
    Delete,
}

impl Method {
    /// Method token as written on the request line
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How query strings are escaped on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryEncoding {
    /// Form-urlencode keys and values
    Percent,

    /// Write keys and values verbatim (legacy wire format)
    Raw,
}

impl Default for QueryEncoding {
    fn default() -> Self {
        QueryEncoding::Percent
    }
}

/// A single query parameter value
#[derive(Debug, Clone, PartialEq)]
pub enum QueryValue {
    /// JSON-encoded on the wire; booleans come out as `true`/`false`
    Json(Value),

    /// Written as-is, e.g. a revision token
    Raw(String),
}

impl QueryValue {
    /// Value text before any escaping
    pub fn encode(&self) -> String {
        match self {
            QueryValue::Json(Value::Bool(flag)) => flag.to_string(),
            QueryValue::Json(value) => value.to_string(),
            QueryValue::Raw(text) => text.clone(),
        }
    }
}

/// Ordered query parameters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryParams {
    pairs: Vec<(String, QueryValue)>,
}

impl QueryParams {
    /// Create an empty parameter set
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`QueryParams::insert`]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Builder form of [`QueryParams::insert_raw`]
    pub fn with_raw(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert_raw(key, value);
        self
    }

    /// Set a JSON-encoded parameter, replacing an existing one with the same key
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.put(key.into(), QueryValue::Json(value.into()));
    }

    /// Set a parameter that is sent without JSON encoding
    pub fn insert_raw(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.put(key.into(), QueryValue::Raw(value.into()));
    }

    fn put(&mut self, key: String, value: QueryValue) {
        match self.pairs.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.pairs.push((key, value)),
        }
    }

    /// Look up a parameter
    pub fn get(&self, key: &str) -> Option<&QueryValue> {
        self.pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Remove a parameter, returning its value
    pub fn remove(&mut self, key: &str) -> Option<QueryValue> {
        let index = self.pairs.iter().position(|(k, _)| k == key)?;
        Some(self.pairs.remove(index).1)
    }

    /// Number of parameters
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Whether there are no parameters
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Iterate parameters in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &QueryValue)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Render as `k=v&k2=v2`
    pub fn encode(&self, encoding: QueryEncoding) -> String {
        match encoding {
            QueryEncoding::Percent => {
                let mut serializer = url::form_urlencoded::Serializer::new(String::new());
                for (key, value) in &self.pairs {
                    serializer.append_pair(key, &value.encode());
                }
                serializer.finish()
            }
            QueryEncoding::Raw => self
                .pairs
                .iter()
                .map(|(key, value)| format!("{}={}", key, value.encode()))
                .collect::<Vec<_>>()
                .join("&"),
        }
    }
}

impl From<serde_json::Map<String, Value>> for QueryParams {
    fn from(map: serde_json::Map<String, Value>) -> Self {
        map.into_iter().collect()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for QueryParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = QueryParams::new();
        for (key, value) in iter {
            params.insert(key, value);
        }
        params
    }
}

/// An HTTP request ready to be rendered
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    path: String,
    query: QueryParams,
    headers: Vec<(String, String)>,
    body: Option<String>,
}

impl Request {
    /// Create a request for `path`, relative to the server root
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: QueryParams::new(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// Attach query parameters
    pub fn with_query(mut self, query: QueryParams) -> Self {
        self.query = query;
        self
    }

    /// Attach a JSON body
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Add an extra header, written after `Date`
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Request method
    pub fn method(&self) -> Method {
        self.method
    }

    /// Request path as given
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Query parameters
    pub fn query(&self) -> &QueryParams {
        &self.query
    }

    /// Request body
    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }

    /// Request target: absolute path plus query string
    pub fn target(&self, encoding: QueryEncoding) -> String {
        let mut target = String::with_capacity(self.path.len() + 1);
        if !self.path.starts_with('/') {
            target.push('/');
        }
        target.push_str(&self.path);
        if !self.query.is_empty() {
            target.push('?');
            target.push_str(&self.query.encode(encoding));
        }
        target
    }

    /// Render the full request text
    pub fn to_raw(&self, encoding: QueryEncoding, date: DateTime<Utc>) -> String {
        let mut raw = format!(
            "{} {} HTTP/1.0\r\nDate: {}\r\n",
            self.method,
            self.target(encoding),
            date.to_rfc2822()
        );
        for (name, value) in &self.headers {
            raw.push_str(&format!("{}: {}\r\n", name, value));
        }
        match &self.body {
            Some(body) => {
                raw.push_str(&format!(
                    "Content-Length: {}\r\nContent-Type: application/json\r\n\r\n",
                    body.len()
                ));
                raw.push_str(body);
            }
            None => raw.push_str("\r\n"),
        }
        raw
    }
}
