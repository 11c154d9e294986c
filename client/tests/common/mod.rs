//! In-memory CouchDB emulator for integration tests
//!
//! Speaks just enough HTTP/1.0 and CouchDB to exercise the client end to
//! end: databases, documents with revision checks, revision history,
//! `_all_docs`, `_bulk_docs` and compaction.

#![allow(dead_code)]

use phly_couch_client::{ClientConfig, Connection, Database};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

#[derive(Default)]
struct StoredDocument {
    /// Every revision, oldest first
    revisions: Vec<Value>,
    deleted: bool,
}

impl StoredDocument {
    fn current(&self) -> Option<&Value> {
        if self.deleted {
            None
        } else {
            self.revisions.last()
        }
    }

    fn current_rev(&self) -> Option<&str> {
        self.current().and_then(|doc| doc["_rev"].as_str())
    }
}

#[derive(Default)]
struct StoredDatabase {
    documents: BTreeMap<String, StoredDocument>,
    next_id: u64,
}

type State = Arc<Mutex<HashMap<String, StoredDatabase>>>;

/// A running emulator
pub struct CouchEmulator {
    port: u16,
    state: State,
}

impl CouchEmulator {
    pub async fn start() -> Self {
        let _ = env_logger::builder().is_test(true).try_init();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let state: State = Arc::default();

        let shared = state.clone();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let state = shared.clone();
                tokio::spawn(async move { serve(socket, state).await });
            }
        });

        Self { port, state }
    }

    pub fn connection(&self) -> Arc<Connection> {
        Arc::new(Connection::new(ClientConfig {
            port: self.port,
            ..ClientConfig::testing()
        }))
    }

    pub fn database(&self, name: &str) -> Database {
        Database::new(name, self.connection()).unwrap()
    }

    /// Number of live documents in `db`
    pub fn document_count(&self, db: &str) -> usize {
        let state = self.state.lock().unwrap();
        state.get(db).map_or(0, |db| {
            db.documents.values().filter(|doc| doc.current().is_some()).count()
        })
    }
}

async fn serve(mut socket: TcpStream, state: State) {
    let raw = read_request(&mut socket).await;
    let (status, body) = handle(&raw, &state);
    let body = body.to_string();
    let response = format!(
        "HTTP/1.0 {} {}\r\nServer: CouchDB/0.9.0 (Erlang OTP/R12B)\r\nContent-Type: text/plain;charset=utf-8\r\nContent-Length: {}\r\n\r\n{}",
        status,
        reason_phrase(status),
        body.len(),
        body
    );
    let _ = socket.write_all(response.as_bytes()).await;
    let _ = socket.shutdown().await;
}

async fn read_request(socket: &mut TcpStream) -> String {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        if let Some(end) = buffer.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buffer[..end]).to_string();
            let length = head
                .lines()
                .find_map(|line| line.strip_prefix("Content-Length: "))
                .and_then(|value| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buffer.len() >= end + 4 + length {
                break;
            }
        }
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(read) => buffer.extend_from_slice(&chunk[..read]),
        }
    }
    String::from_utf8_lossy(&buffer).to_string()
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        400 => "Bad Request",
        404 => "Object Not Found",
        405 => "Method Not Allowed",
        409 => "Conflict",
        412 => "Precondition Failed",
        _ => "Unknown",
    }
}

fn error(status: u16, error: &str, reason: &str) -> (u16, Value) {
    (status, json!({"error": error, "reason": reason}))
}

fn handle(raw: &str, state: &State) -> (u16, Value) {
    let (head, body) = raw.split_once("\r\n\r\n").unwrap_or((raw, ""));
    let request_line = head.lines().next().unwrap_or_default();
    let mut parts = request_line.split(' ');
    let method = parts.next().unwrap_or_default();
    let target = parts.next().unwrap_or_default();

    let (path, query) = target.split_once('?').unwrap_or((target, ""));
    let query: HashMap<String, String> = url::form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .collect();
    let body: Value = if body.is_empty() {
        Value::Null
    } else {
        match serde_json::from_str(body) {
            Ok(value) => value,
            Err(_) => return error(400, "bad_request", "invalid UTF-8 JSON"),
        }
    };

    let mut state = state.lock().unwrap();
    let path = path.trim_start_matches('/');
    match (method, path) {
        ("GET", "") => (200, json!({"couchdb": "Welcome", "version": "0.9.0"})),
        ("GET", "_all_dbs") => {
            let mut names: Vec<&String> = state.keys().collect();
            names.sort();
            (200, json!(names))
        }
        _ => {
            let (db_name, resource) = path.split_once('/').unwrap_or((path, ""));
            let has_slash = path.contains('/');
            let db_name = percent_decode(db_name);
            let resource = percent_decode(resource);
            handle_database(&mut state, method, &db_name, &resource, has_slash, &query, body)
        }
    }
}

fn percent_decode(segment: &str) -> String {
    let bytes = segment.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let hex = segment
            .get(i + 1..i + 3)
            .filter(|_| bytes[i] == b'%')
            .and_then(|hex| u8::from_str_radix(hex, 16).ok());
        match hex {
            Some(byte) => {
                decoded.push(byte);
                i += 3;
            }
            None => {
                decoded.push(bytes[i]);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&decoded).to_string()
}

fn handle_database(
    state: &mut HashMap<String, StoredDatabase>,
    method: &str,
    db_name: &str,
    resource: &str,
    has_slash: bool,
    query: &HashMap<String, String>,
    body: Value,
) -> (u16, Value) {
    if !has_slash {
        return match method {
            "PUT" if state.contains_key(db_name) => error(
                412,
                "file_exists",
                "The database could not be created, the file already exists.",
            ),
            "PUT" => {
                state.insert(db_name.to_string(), StoredDatabase::default());
                (201, json!({"ok": true}))
            }
            "DELETE" => match state.remove(db_name) {
                Some(_) => (200, json!({"ok": true})),
                None => error(404, "not_found", "missing"),
            },
            "GET" => match state.get(db_name) {
                Some(db) => (
                    200,
                    json!({
                        "db_name": db_name,
                        "doc_count": db.documents.values().filter(|d| d.current().is_some()).count(),
                    }),
                ),
                None => error(404, "not_found", "no_db_file"),
            },
            _ => error(405, "method_not_allowed", "unsupported method"),
        };
    }

    let Some(db) = state.get_mut(db_name) else {
        return error(404, "not_found", "no_db_file");
    };

    match (method, resource) {
        ("POST", "_compact") => (202, json!({"ok": true})),
        ("GET", "_all_docs") => all_docs(db, query),
        ("POST", "_bulk_docs") => {
            let docs = body["docs"].as_array().cloned().unwrap_or_default();
            let results: Vec<Value> = docs
                .into_iter()
                .map(|doc| match write(db, None, doc) {
                    Ok((id, rev)) => json!({"id": id, "rev": rev}),
                    Err((_, err)) => json!({"id": err["id"], "error": "conflict", "reason": err["reason"]}),
                })
                .collect();
            (201, json!(results))
        }
        ("POST", "") => match write(db, None, body) {
            Ok((id, rev)) => (201, json!({"ok": true, "id": id, "rev": rev})),
            Err(failure) => failure,
        },
        ("PUT", id) => match write(db, Some(id), body) {
            Ok((id, rev)) => (201, json!({"ok": true, "id": id, "rev": rev})),
            Err(failure) => failure,
        },
        ("GET", id) => read(db, id, query),
        ("DELETE", id) => remove(db, id, query),
        _ => error(405, "method_not_allowed", "unsupported method"),
    }
}

fn all_docs(db: &StoredDatabase, query: &HashMap<String, String>) -> (u16, Value) {
    let live: Vec<(&String, &str)> = db
        .documents
        .iter()
        .filter_map(|(id, doc)| doc.current_rev().map(|rev| (id, rev)))
        .collect();
    let skip = query.get("skip").and_then(|v| v.parse().ok()).unwrap_or(0usize);
    let limit = query.get("limit").and_then(|v| v.parse().ok()).unwrap_or(usize::MAX);

    let rows: Vec<Value> = live
        .iter()
        .skip(skip)
        .take(limit)
        .map(|(id, rev)| json!({"id": id, "key": id, "value": {"rev": rev}}))
        .collect();
    (200, json!({"total_rows": live.len(), "offset": skip, "rows": rows}))
}

fn write(
    db: &mut StoredDatabase,
    path_id: Option<&str>,
    body: Value,
) -> Result<(String, String), (u16, Value)> {
    let Value::Object(mut fields) = body else {
        return Err(error(400, "bad_request", "Document must be a JSON object"));
    };

    let body_id = fields.get("_id").and_then(Value::as_str).map(str::to_string);
    let id = match path_id.map(str::to_string).or(body_id) {
        Some(id) => id,
        None => {
            db.next_id += 1;
            format!("{:032x}", db.next_id)
        }
    };
    let stored = db.documents.entry(id.clone()).or_default();
    let given = fields.get("_rev").and_then(Value::as_str);
    if given != stored.current_rev() {
        return Err((
            409,
            json!({"error": "conflict", "reason": "Document update conflict.", "id": id}),
        ));
    }

    let rev = format!("{}-{:08x}", stored.revisions.len() + 1, revision_hash(&id, stored.revisions.len()));
    fields.insert("_id".to_string(), json!(id));
    fields.insert("_rev".to_string(), json!(rev));
    stored.revisions.push(Value::Object(normalize(fields)));
    stored.deleted = false;
    Ok((id, rev))
}

fn normalize(mut fields: Map<String, Value>) -> Map<String, Value> {
    let mut ordered = Map::new();
    for key in ["_id", "_rev"] {
        if let Some(value) = fields.shift_remove(key) {
            ordered.insert(key.to_string(), value);
        }
    }
    ordered.extend(fields);
    ordered
}

fn revision_hash(id: &str, generation: usize) -> u32 {
    id.bytes()
        .fold(2166136261u32 ^ generation as u32, |hash, byte| {
            (hash ^ byte as u32).wrapping_mul(16777619)
        })
}

fn read(db: &StoredDatabase, id: &str, query: &HashMap<String, String>) -> (u16, Value) {
    let Some(stored) = db.documents.get(id) else {
        return error(404, "not_found", "missing");
    };

    if let Some(rev) = query.get("rev") {
        return match stored.revisions.iter().find(|doc| doc["_rev"] == json!(rev)) {
            Some(doc) => (200, doc.clone()),
            None => error(404, "not_found", "missing"),
        };
    }

    let Some(current) = stored.current() else {
        return error(404, "not_found", "deleted");
    };
    let mut document = current.clone();
    if query.get("revs_info").map(String::as_str) == Some("true") {
        let history: Vec<Value> = stored
            .revisions
            .iter()
            .rev()
            .map(|doc| json!({"rev": doc["_rev"], "status": "available"}))
            .collect();
        document["_revs_info"] = json!(history);
    }
    (200, document)
}

fn remove(db: &mut StoredDatabase, id: &str, query: &HashMap<String, String>) -> (u16, Value) {
    let Some(stored) = db.documents.get_mut(id) else {
        return error(404, "not_found", "missing");
    };
    if query.get("rev").map(String::as_str) != stored.current_rev() {
        return error(409, "conflict", "Document update conflict.");
    }

    let rev = format!("{}-{:08x}", stored.revisions.len() + 1, revision_hash(id, stored.revisions.len()));
    stored
        .revisions
        .push(json!({"_id": id, "_rev": rev, "_deleted": true}));
    stored.deleted = true;
    (200, json!({"ok": true, "id": id, "rev": rev}))
}
