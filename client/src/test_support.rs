//! Scripted TCP server for unit tests
//!
//! Answers each accepted connection with the next canned response and
//! records the raw request text it received.

use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use crate::connection::Connection;
use crate::database::Database;
use phly_couch_core::ClientConfig;

pub(crate) struct FakeServer {
    port: u16,
    handle: JoinHandle<Vec<String>>,
}

impl FakeServer {
    pub(crate) async fn start(responses: Vec<String>) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = tokio::spawn(async move {
            let mut requests = Vec::new();
            for response in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                requests.push(read_request(&mut socket).await);
                socket.write_all(response.as_bytes()).await.unwrap();
                socket.shutdown().await.unwrap();
            }
            requests
        });

        Self { port, handle }
    }

    pub(crate) fn connection(&self) -> Arc<Connection> {
        Arc::new(Connection::new(ClientConfig {
            port: self.port,
            ..ClientConfig::testing()
        }))
    }

    pub(crate) fn database(&self, name: &str) -> Database {
        Database::new(name, self.connection()).unwrap()
    }

    /// Wait until every scripted response was served
    pub(crate) async fn requests(self) -> Vec<String> {
        self.handle.await.unwrap()
    }

    /// A port with nothing listening on it
    pub(crate) async fn unused_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    /// A listener that accepts connections and never answers
    pub(crate) async fn silent() -> (u16, JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = tokio::spawn(async move {
            let mut open = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                open.push(socket);
            }
        });
        (port, handle)
    }
}

/// Read one request: headers, then `Content-Length` bytes of body
pub(crate) async fn read_request(socket: &mut TcpStream) -> String {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        if let Some(end) = header_end(&buffer) {
            let head = String::from_utf8_lossy(&buffer[..end]).to_string();
            if buffer.len() >= end + 4 + content_length(&head) {
                break;
            }
        }
        let read = socket.read(&mut chunk).await.unwrap();
        if read == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..read]);
    }
    String::from_utf8(buffer).unwrap()
}

fn header_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(4).position(|window| window == b"\r\n\r\n")
}

fn content_length(head: &str) -> usize {
    head.lines()
        .find_map(|line| line.strip_prefix("Content-Length: "))
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(0)
}

/// A 200 response with a JSON body
pub(crate) fn ok(body: &str) -> String {
    status(200, body)
}

/// A response with the given status and JSON body
pub(crate) fn status(code: u16, body: &str) -> String {
    format!(
        "HTTP/1.0 {} Status\r\nServer: CouchDB/0.9.0 (Erlang OTP/R12B)\r\nContent-Type: text/plain;charset=utf-8\r\nContent-Length: {}\r\n\r\n{}",
        code,
        body.len(),
        body
    )
}
