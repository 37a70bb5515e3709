//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use live_config::source::{Source, SourceError};
use live_config::{Manager, MemorySource};

/// A manager over an in-memory document with no schema.
pub fn manager(document: &str) -> Manager {
    manager_with_schema(document, "")
}

pub fn manager_with_schema(document: &str, schema: &str) -> Manager {
    let source = MemorySource::new(document, schema).expect("valid document");
    Manager::new(Arc::new(source)).expect("manager")
}

/// An in-memory source whose writes can be made to fail on demand.
pub struct FlakySource {
    document: ArcSwap<Value>,
    schema: String,
    failing: AtomicBool,
}

impl FlakySource {
    pub fn new(document: Value) -> Self {
        Self {
            document: ArcSwap::from_pointee(document),
            schema: String::new(),
            failing: AtomicBool::new(false),
        }
    }

    pub fn fail_writes(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl Source for FlakySource {
    fn config_object(&self) -> Arc<Value> {
        self.document.load_full()
    }

    fn config(&self) -> String {
        self.document.load().to_string()
    }

    fn schema(&self) -> String {
        self.schema.clone()
    }

    fn set_config(&self, document: Value) -> Result<(), SourceError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(SourceError::Rejected("disk is read-only".into()));
        }
        self.document.store(Arc::new(document));
        Ok(())
    }
}

/// Start a programmable HTTP service on an ephemeral port. `f` receives the
/// request body and returns the status and body to answer with.
pub async fn start_programmable_service<F, Fut>(f: F) -> SocketAddr
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        let body = match read_request_body(&mut socket).await {
                            Some(body) => body,
                            None => return,
                        };
                        let (status, body) = f(body).await;
                        let status_text = match status {
                            200 => "200 OK",
                            400 => "400 Bad Request",
                            500 => "500 Internal Server Error",
                            503 => "503 Service Unavailable",
                            _ => "200 OK",
                        };

                        let response_str = format!(
                            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_text,
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response_str.as_bytes()).await;
                        let _ = socket.shutdown().await;
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// Read one HTTP/1.1 request and return its body.
async fn read_request_body(socket: &mut tokio::net::TcpStream) -> Option<String> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(end) = find(&buf, b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
            let length = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            let body_start = end + 4;
            while buf.len() < body_start + length {
                let n = socket.read(&mut chunk).await.ok()?;
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
            }
            let body_end = (body_start + length).min(buf.len());
            return Some(String::from_utf8_lossy(&buf[body_start..body_end]).into_owned());
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}
