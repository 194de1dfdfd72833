//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// What the mock upstream does with the next request it reads.
#[derive(Debug, Clone)]
pub enum Step {
    /// Answer with a keep-alive response.
    Respond { status: u16, body: &'static str },
    /// Close the connection without answering.
    Close,
    /// Hold the connection open and never answer.
    Hang,
    /// Send headers and `first`, pause for `pause`, then send `rest`.
    SlowBody {
        status: u16,
        first: &'static str,
        pause: Duration,
        rest: &'static str,
    },
}

impl Step {
    pub fn ok(body: &'static str) -> Self {
        Step::Respond { status: 200, body }
    }

    pub fn status(status: u16) -> Self {
        Step::Respond { status, body: "" }
    }
}

#[derive(Debug, Default)]
struct Script {
    steps: Mutex<VecDeque<Step>>,
    requests: Mutex<Vec<String>>,
    hits: AtomicUsize,
    connections: AtomicUsize,
}

/// Raw-TCP HTTP/1.1 upstream that plays a script of steps, one per request.
///
/// Once the script runs out it answers `200 ok`.
pub struct MockUpstream {
    addr: SocketAddr,
    script: Arc<Script>,
}

impl MockUpstream {
    pub async fn start(steps: Vec<Step>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let script = Arc::new(Script {
            steps: Mutex::new(steps.into()),
            ..Script::default()
        });

        let shared = Arc::clone(&script);
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                shared.connections.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(serve(socket, Arc::clone(&shared)));
            }
        });

        Self { addr, script }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Requests read so far.
    pub fn hits(&self) -> usize {
        self.script.hits.load(Ordering::SeqCst)
    }

    /// TCP connections accepted so far.
    pub fn connections(&self) -> usize {
        self.script.connections.load(Ordering::SeqCst)
    }

    /// Request heads in arrival order, lower-cased.
    pub fn requests(&self) -> Vec<String> {
        self.script.requests.lock().unwrap().clone()
    }
}

async fn serve(mut socket: TcpStream, script: Arc<Script>) {
    loop {
        let Some(head) = read_request(&mut socket).await else {
            return;
        };
        script.hits.fetch_add(1, Ordering::SeqCst);
        script.requests.lock().unwrap().push(head.to_ascii_lowercase());

        let step = script
            .steps
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Step::ok("ok"));

        match step {
            Step::Respond { status, body } => {
                let response = format!(
                    "HTTP/1.1 {} {}\r\nContent-Length: {}\r\n\r\n{}",
                    status,
                    reason(status),
                    body.len(),
                    body
                );
                if socket.write_all(response.as_bytes()).await.is_err() {
                    return;
                }
            }
            Step::Close => {
                let _ = socket.shutdown().await;
                return;
            }
            Step::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                return;
            }
            Step::SlowBody {
                status,
                first,
                pause,
                rest,
            } => {
                let head = format!(
                    "HTTP/1.1 {} {}\r\nContent-Length: {}\r\n\r\n{}",
                    status,
                    reason(status),
                    first.len() + rest.len(),
                    first
                );
                if socket.write_all(head.as_bytes()).await.is_err() {
                    return;
                }
                let _ = socket.flush().await;
                tokio::time::sleep(pause).await;
                if socket.write_all(rest.as_bytes()).await.is_err() {
                    return;
                }
            }
        }
    }
}

/// Read one request (head plus Content-Length body). Returns the head.
async fn read_request(socket: &mut TcpStream) -> Option<String> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..end]).into_owned();
            let needed = content_length(&head);
            let mut have = buf.len() - (end + 4);
            while have < needed {
                let n = socket.read(&mut chunk).await.ok()?;
                if n == 0 {
                    return None;
                }
                have += n;
            }
            return Some(head);
        }
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

fn content_length(head: &str) -> usize {
    head.lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse().ok())
        .unwrap_or(0)
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

/// A port on localhost that nothing listens on.
pub async fn refused_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}/", addr)
}

/// Accepts TCP connections and holds them without ever reading or writing.
async fn silent_peer() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    addr
}

/// An https endpoint that accepts TCP and then never speaks, so the TLS handshake hangs.
pub async fn silent_tls_url() -> String {
    format!("https://{}/", silent_peer().await)
}

/// An http endpoint that accepts TCP and never reads, so large request bodies stall.
pub async fn silent_http_url() -> String {
    format!("http://{}/", silent_peer().await)
}
