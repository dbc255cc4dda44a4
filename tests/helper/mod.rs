//! Shared fixtures for integration tests
#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use overlay_autoupdate::transport::{
    BucketConfig, HttpClient, HttpClientConfig, RateLimitConfig, RateLimiter, RetryConfig,
};
use overlay_autoupdate::version::overlay::OverlayDir;
use overlay_autoupdate::version::{Cache, Checker, PendingQueue};

pub const TTL: Duration = Duration::from_secs(3600);

/// Temporary overlay plus state directory
pub struct TestEnv {
    pub temp_dir: TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().unwrap(),
        }
    }

    pub fn overlay_root(&self) -> PathBuf {
        self.temp_dir.path().join("overlay")
    }

    pub fn cache_path(&self) -> PathBuf {
        self.temp_dir.path().join("state/cache.json")
    }

    pub fn pending_path(&self) -> PathBuf {
        self.temp_dir.path().join("state/pending.json")
    }

    /// Create an empty `<name>-<version>.ebuild` for `package`
    pub fn add_recipe(&self, package: &str, version: &str) -> &Self {
        let (category, name) = package.split_once('/').unwrap();
        let dir = self.overlay_root().join(category).join(name);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(format!("{}-{}.ebuild", name, version)), "EAPI=8\n").unwrap();
        self
    }

    pub fn cache(&self) -> Cache {
        Cache::new(&self.cache_path(), TTL)
    }

    pub fn pending(&self) -> PendingQueue {
        PendingQueue::new(&self.pending_path())
    }

    pub fn checker(&self) -> Checker {
        self.checker_with_client(instant_client(HttpClientConfig::default()))
    }

    pub fn checker_with_client(&self, client: HttpClient) -> Checker {
        Checker::new(
            Arc::new(OverlayDir::new(&self.overlay_root())),
            Arc::new(self.cache()),
            Arc::new(self.pending()),
            Arc::new(client),
            Arc::new(unlimited_limiter()),
        )
    }
}

/// Client whose backoff delays return immediately
pub fn instant_client(config: HttpClientConfig) -> HttpClient {
    HttpClient::with_delay_fn(config, Arc::new(|_| Box::pin(async {}))).unwrap()
}

/// Client that never retries
pub fn single_attempt_client() -> HttpClient {
    instant_client(HttpClientConfig {
        retry: RetryConfig {
            max_retries: 0,
            ..RetryConfig::default()
        },
        ..HttpClientConfig::default()
    })
}

pub fn unlimited_limiter() -> RateLimiter {
    RateLimiter::new(RateLimitConfig {
        default_host: BucketConfig::new(0.0, 1),
        generation: BucketConfig::new(0.0, 1),
        hosts: HashMap::new(),
    })
}

pub fn read_json(path: &Path) -> serde_json::Value {
    serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap()
}

/// HTTP server that holds every request open for a while and records the
/// highest number of requests in flight at once
pub struct InFlightServer {
    url: String,
    peak: Arc<AtomicUsize>,
    handle: JoinHandle<()>,
}

impl InFlightServer {
    pub async fn start(hold: Duration, body: &'static str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handle = tokio::spawn({
            let peak = peak.clone();
            async move {
                while let Ok((stream, _)) = listener.accept().await {
                    tokio::spawn(serve(stream, in_flight.clone(), peak.clone(), hold, body));
                }
            }
        });

        Self { url, peak, handle }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl Drop for InFlightServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve(
    mut stream: TcpStream,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    hold: Duration,
    body: &'static str,
) {
    let mut request = Vec::new();
    let mut chunk = [0u8; 1024];
    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => request.extend_from_slice(&chunk[..n]),
        }
    }

    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    peak.fetch_max(now, Ordering::SeqCst);
    tokio::time::sleep(hold).await;
    // Released before responding so the next request cannot overlap this one
    in_flight.fetch_sub(1, Ordering::SeqCst);

    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;
}
