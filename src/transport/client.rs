//! HTTP client with exponential-backoff retry

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::{Method, Response, StatusCode, Url};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::{
    DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY, DEFAULT_MAX_RETRIES, FETCH_TIMEOUT, GITHUB_API_HOST,
    USER_AGENT,
};
use crate::transport::error::{LastFailure, TransportError};
use crate::transport::headers::{apply_github_token, merge_headers};

/// Sleeps for the given duration; replaced in tests to avoid real waiting
pub type DelayFn = Arc<dyn Fn(Duration) -> BoxFuture<'static, ()> + Send + Sync>;

/// Retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            timeout: FETCH_TIMEOUT,
        }
    }
}

impl RetryConfig {
    /// Delay before attempt `attempt` (1-based). The first attempt has none.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt < 2 {
            return Duration::ZERO;
        }
        let factor = 1u32.checked_shl(attempt - 2).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub retry: RetryConfig,
    pub user_agent: String,
    /// Sent with every request unless overridden per request
    pub default_headers: HashMap<String, String>,
    /// Bearer token attached to requests for `github_api_host`
    pub github_token: Option<String>,
    pub github_api_host: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            user_agent: USER_AGENT.to_string(),
            default_headers: HashMap::new(),
            github_token: None,
            github_api_host: GITHUB_API_HOST.to_string(),
        }
    }
}

fn sleep_delay() -> DelayFn {
    Arc::new(|delay| Box::pin(tokio::time::sleep(delay)))
}

/// Oldest recorded delays are dropped beyond this many
const MAX_RECORDED_DELAYS: usize = 256;

fn is_retryable(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

/// Retrying HTTP client shared by all checks
pub struct HttpClient {
    client: reqwest::Client,
    config: HttpClientConfig,
    delay: DelayFn,
    delays: Mutex<VecDeque<Duration>>,
}

impl HttpClient {
    pub fn new(config: HttpClientConfig) -> Result<Self, TransportError> {
        Self::with_delay_fn(config, sleep_delay())
    }

    /// Create a client whose backoff waits go through `delay`
    pub fn with_delay_fn(config: HttpClientConfig, delay: DelayFn) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .build()?;
        Ok(Self {
            client,
            config,
            delay,
            delays: Mutex::new(VecDeque::new()),
        })
    }

    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }

    fn delays(&self) -> MutexGuard<'_, VecDeque<Duration>> {
        self.delays
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Most recent backoff delays, in call order
    pub fn recorded_delays(&self) -> Vec<Duration> {
        self.delays().iter().copied().collect()
    }

    /// Return the recorded delays and start a fresh record
    pub fn take_recorded_delays(&self) -> Vec<Duration> {
        self.delays().drain(..).collect()
    }

    fn record_delay(&self, delay: Duration) {
        let mut delays = self.delays();
        if delays.len() == MAX_RECORDED_DELAYS {
            delays.pop_front();
        }
        delays.push_back(delay);
    }

    /// Send a request, retrying transport errors, 5xx and 429 responses.
    ///
    /// Any other response is returned as-is, including 4xx.
    pub async fn send(
        &self,
        cancel: &CancellationToken,
        method: Method,
        url: &str,
        headers: &HashMap<String, String>,
    ) -> Result<Response, TransportError> {
        let parsed = Url::parse(url).map_err(|e| TransportError::InvalidUrl(format!("{url}: {e}")))?;
        let mut header_map = merge_headers(&self.config.default_headers, headers)?;
        if let Some(host) = parsed.host_str() {
            apply_github_token(
                &mut header_map,
                host,
                &self.config.github_api_host,
                self.config.github_token.as_deref(),
            )?;
        }

        let retry = self.config.retry;
        let attempts = retry.max_retries + 1;
        let mut last_status: Option<u16> = None;
        let mut last_error: Option<String> = None;

        for attempt in 1..=attempts {
            if attempt > 1 {
                let delay = retry.delay_before(attempt);
                self.record_delay(delay);
                debug!("Retrying {} in {:?} (attempt {}/{})", url, delay, attempt, attempts);
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(TransportError::Cancelled),
                    _ = (self.delay)(delay) => {}
                }
            }

            if cancel.is_cancelled() {
                return Err(TransportError::Cancelled);
            }

            let request = self
                .client
                .request(method.clone(), parsed.clone())
                .headers(header_map.clone())
                .timeout(retry.timeout);

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(TransportError::Cancelled),
                result = request.send() => result,
            };

            match result {
                Ok(response) if is_retryable(response.status()) => {
                    warn!("{} returned {} (attempt {}/{})", url, response.status(), attempt, attempts);
                    last_status = Some(response.status().as_u16());
                }
                Ok(response) => return Ok(response),
                Err(e) => {
                    warn!("Request to {} failed (attempt {}/{}): {}", url, attempt, attempts, e);
                    last_error = Some(e.to_string());
                }
            }
        }

        let last = match (last_status, last_error) {
            (Some(status), _) => LastFailure::Status(status),
            (None, Some(error)) => LastFailure::Transport(error),
            (None, None) => LastFailure::Transport("no attempt was made".to_string()),
        };
        Err(TransportError::RetriesExhausted { attempts, last })
    }

    pub async fn get(
        &self,
        cancel: &CancellationToken,
        url: &str,
        headers: &HashMap<String, String>,
    ) -> Result<Response, TransportError> {
        self.send(cancel, Method::GET, url, headers).await
    }

    /// GET `url` and return the body, treating any non-2xx status as an error.
    pub async fn fetch_bytes(
        &self,
        cancel: &CancellationToken,
        url: &str,
        headers: &HashMap<String, String>,
    ) -> Result<Vec<u8>, TransportError> {
        let response = self.get(cancel, url, headers).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }
        Ok(response.bytes().await?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;
    use rstest::rstest;

    fn instant_client(config: HttpClientConfig) -> HttpClient {
        HttpClient::with_delay_fn(config, Arc::new(|_| Box::pin(async {}))).unwrap()
    }

    fn no_headers() -> HashMap<String, String> {
        HashMap::new()
    }

    #[test]
    fn delay_before_doubles_up_to_cap() {
        let retry = RetryConfig::default();

        assert_eq!(retry.delay_before(1), Duration::ZERO);
        assert_eq!(retry.delay_before(2), Duration::from_secs(1));
        assert_eq!(retry.delay_before(3), Duration::from_secs(2));
        assert_eq!(retry.delay_before(4), Duration::from_secs(4));
        assert_eq!(retry.delay_before(5), Duration::from_secs(4));
        assert_eq!(retry.delay_before(40), Duration::from_secs(4));
    }

    #[rstest]
    #[case(1)]
    #[case(2)]
    #[case(3)]
    #[tokio::test]
    async fn send_retries_until_success(#[case] failures: usize) {
        let mut server = Server::new_async().await;
        let failing = server
            .mock("GET", "/version")
            .with_status(503)
            .expect(failures)
            .create_async()
            .await;
        let succeeding = server
            .mock("GET", "/version")
            .with_status(200)
            .with_body("1.0")
            .expect(1)
            .create_async()
            .await;

        let client = instant_client(HttpClientConfig::default());
        let response = client
            .get(&CancellationToken::new(), &format!("{}/version", server.url()), &no_headers())
            .await
            .unwrap();

        failing.assert_async().await;
        succeeding.assert_async().await;
        assert_eq!(response.status(), StatusCode::OK);
        let expected = [1, 2, 4].map(Duration::from_secs);
        assert_eq!(client.recorded_delays(), expected[..failures].to_vec());
    }

    #[tokio::test]
    async fn send_reports_retries_exhausted_after_max_attempts() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/down")
            .with_status(500)
            .expect(4)
            .create_async()
            .await;

        let client = instant_client(HttpClientConfig::default());
        let result = client
            .get(&CancellationToken::new(), &format!("{}/down", server.url()), &no_headers())
            .await;

        mock.assert_async().await;
        assert!(matches!(
            result,
            Err(TransportError::RetriesExhausted {
                attempts: 4,
                last: LastFailure::Status(500)
            })
        ));
        assert_eq!(client.take_recorded_delays().len(), 3);
        assert!(client.recorded_delays().is_empty());
    }

    #[test]
    fn recorded_delays_keep_only_the_most_recent() {
        let client = instant_client(HttpClientConfig::default());

        for ms in 0..(MAX_RECORDED_DELAYS as u64 + 10) {
            client.record_delay(Duration::from_millis(ms));
        }

        let delays = client.recorded_delays();
        assert_eq!(delays.len(), MAX_RECORDED_DELAYS);
        assert_eq!(delays[0], Duration::from_millis(10));
        assert_eq!(
            delays.last(),
            Some(&Duration::from_millis(MAX_RECORDED_DELAYS as u64 + 9))
        );
    }

    #[tokio::test]
    async fn send_retries_rate_limited_responses() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/limited")
            .with_status(429)
            .expect(2)
            .create_async()
            .await;

        let config = HttpClientConfig {
            retry: RetryConfig {
                max_retries: 1,
                ..RetryConfig::default()
            },
            ..HttpClientConfig::default()
        };
        let client = instant_client(config);
        let result = client
            .get(&CancellationToken::new(), &format!("{}/limited", server.url()), &no_headers())
            .await;

        mock.assert_async().await;
        assert!(matches!(
            result,
            Err(TransportError::RetriesExhausted {
                last: LastFailure::Status(429),
                ..
            })
        ));
    }

    #[rstest]
    #[case(400)]
    #[case(401)]
    #[case(403)]
    #[case(404)]
    #[tokio::test]
    async fn send_does_not_retry_client_errors(#[case] status: usize) {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/missing")
            .with_status(status)
            .expect(1)
            .create_async()
            .await;

        let client = instant_client(HttpClientConfig::default());
        let response = client
            .get(&CancellationToken::new(), &format!("{}/missing", server.url()), &no_headers())
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(response.status().as_u16() as usize, status);
        assert!(client.recorded_delays().is_empty());
    }

    #[tokio::test]
    async fn send_with_cancelled_token_makes_no_request() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/version")
            .with_status(200)
            .expect(0)
            .create_async()
            .await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let client = instant_client(HttpClientConfig::default());
        let result = client
            .get(&cancel, &format!("{}/version", server.url()), &no_headers())
            .await;

        mock.assert_async().await;
        assert!(matches!(result, Err(TransportError::Cancelled)));
    }

    #[tokio::test]
    async fn send_reports_transport_error_when_unreachable() {
        let config = HttpClientConfig {
            retry: RetryConfig {
                max_retries: 1,
                ..RetryConfig::default()
            },
            ..HttpClientConfig::default()
        };
        let client = instant_client(config);

        let result = client
            .get(&CancellationToken::new(), "http://127.0.0.1:1/version", &no_headers())
            .await;

        assert!(matches!(
            result,
            Err(TransportError::RetriesExhausted {
                attempts: 2,
                last: LastFailure::Transport(_)
            })
        ));
    }

    #[tokio::test]
    async fn send_merges_default_and_request_headers() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/h")
            .match_header("accept", "application/json")
            .match_header("x-default", "yes")
            .with_status(200)
            .create_async()
            .await;

        let config = HttpClientConfig {
            default_headers: HashMap::from([
                ("Accept".to_string(), "text/html".to_string()),
                ("X-Default".to_string(), "yes".to_string()),
            ]),
            ..HttpClientConfig::default()
        };
        let client = instant_client(config);
        let headers = HashMap::from([("Accept".to_string(), "application/json".to_string())]);

        client
            .get(&CancellationToken::new(), &format!("{}/h", server.url()), &headers)
            .await
            .unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn send_injects_bearer_token_for_api_host() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/repos/o/r/releases/latest")
            .match_header("authorization", "Bearer gh-token")
            .with_status(200)
            .create_async()
            .await;

        let config = HttpClientConfig {
            github_token: Some("gh-token".to_string()),
            github_api_host: "127.0.0.1".to_string(),
            ..HttpClientConfig::default()
        };
        let client = instant_client(config);

        client
            .get(
                &CancellationToken::new(),
                &format!("{}/repos/o/r/releases/latest", server.url()),
                &no_headers(),
            )
            .await
            .unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn fetch_bytes_rejects_non_success_status() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/gone")
            .with_status(404)
            .create_async()
            .await;

        let client = instant_client(HttpClientConfig::default());
        let result = client
            .fetch_bytes(&CancellationToken::new(), &format!("{}/gone", server.url()), &no_headers())
            .await;

        assert!(matches!(result, Err(TransportError::Status(404))));
    }

    #[tokio::test]
    async fn send_rejects_invalid_url() {
        let client = instant_client(HttpClientConfig::default());

        let result = client
            .get(&CancellationToken::new(), "not a url", &no_headers())
            .await;

        assert!(matches!(result, Err(TransportError::InvalidUrl(_))));
    }
}
