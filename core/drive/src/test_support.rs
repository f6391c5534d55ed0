//! Test doubles: a scripted identity authority and an in-process HTTP server
//! standing in for the Drive metadata API.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use foldertrail_common::{AccessToken, Error, Result};

use crate::auth::IdentityAuthority;

/// Authority that hands out a scripted sequence of outcomes.
///
/// Once the script runs out every request fails with `AuthUnavailable`.
pub struct ScriptedAuthority {
    outcomes: Mutex<Vec<Result<AccessToken>>>,
    calls: AtomicUsize,
    scopes_seen: Mutex<Vec<String>>,
}

impl ScriptedAuthority {
    pub fn new(outcomes: Vec<Result<AccessToken>>) -> Arc<Self> {
        Arc::new(Self {
            outcomes: Mutex::new(outcomes.into_iter().rev().collect()),
            calls: AtomicUsize::new(0),
            scopes_seen: Mutex::new(Vec::new()),
        })
    }

    /// Authority that grants each of `tokens` in turn.
    pub fn granting(tokens: &[&str]) -> Arc<Self> {
        Self::new(
            tokens
                .iter()
                .map(|t| AccessToken::new(*t).ok_or_else(|| Error::AuthDenied("empty".to_string())))
                .collect(),
        )
    }

    /// Number of token requests received.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every scope requested so far.
    pub fn scopes_seen(&self) -> Vec<String> {
        self.scopes_seen.lock().expect("scope log").clone()
    }
}

#[async_trait]
impl IdentityAuthority for ScriptedAuthority {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn request_token(&self, _interactive: bool, scopes: &[&str]) -> Result<AccessToken> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.scopes_seen
            .lock()
            .expect("scope log")
            .extend(scopes.iter().map(|s| s.to_string()));
        self.outcomes
            .lock()
            .expect("script")
            .pop()
            .unwrap_or_else(|| Err(Error::AuthUnavailable("script exhausted".to_string())))
    }
}

/// One request as seen by the mock server.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub path: String,
    pub query: String,
    pub authorization: Option<String>,
}

/// Minimal mock Drive API built on tokio that returns canned responses.
///
/// Each route is keyed by request path (without query). Unknown paths get a
/// 404. Every connection is answered once and then closed.
pub struct MockDrive {
    base_url: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    task: JoinHandle<()>,
}

impl MockDrive {
    /// Start serving `routes` as `(path, status, body)` triples.
    pub async fn start(routes: &[(&str, u16, &str)]) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind mock server");
        let port = listener.local_addr().expect("mock server address").port();
        let base_url = format!("http://127.0.0.1:{port}");

        let routes: Arc<HashMap<String, (u16, String)>> = Arc::new(
            routes
                .iter()
                .map(|(path, status, body)| (path.to_string(), (*status, body.to_string())))
                .collect(),
        );
        let requests = Arc::new(Mutex::new(Vec::new()));

        let task = {
            let requests = requests.clone();
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    let routes = routes.clone();
                    let requests = requests.clone();
                    tokio::spawn(async move {
                        serve_one(stream, &routes, &requests).await;
                    });
                }
            })
        };

        Self {
            base_url,
            requests,
            task,
        }
    }

    /// Base URL to hand to the metadata client.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().expect("request log").clone()
    }

    /// Number of requests received for `path`.
    pub fn hits(&self, path: &str) -> usize {
        self.requests().iter().filter(|r| r.path == path).count()
    }
}

impl Drop for MockDrive {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve_one(
    mut stream: TcpStream,
    routes: &HashMap<String, (u16, String)>,
    requests: &Mutex<Vec<RecordedRequest>>,
) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }

    let head = String::from_utf8_lossy(&buf).to_string();
    let mut lines = head.lines();
    let target = lines
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("/")
        .to_string();
    let (path, query) = match target.split_once('?') {
        Some((p, q)) => (p.to_string(), q.to_string()),
        None => (target.clone(), String::new()),
    };
    let authorization = lines.find_map(|line| {
        let (name, value) = line.split_once(':')?;
        name.eq_ignore_ascii_case("authorization")
            .then(|| value.trim().to_string())
    });

    requests.lock().expect("request log").push(RecordedRequest {
        path: path.clone(),
        query,
        authorization,
    });

    let (status, body) = routes
        .get(&path)
        .cloned()
        .unwrap_or((404, r#"{"error":"not found"}"#.to_string()));

    let response = format!(
        "HTTP/1.1 {status} Mock\r\n\
         Content-Type: application/json\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n\
         {body}",
        body.len()
    );
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;
}
