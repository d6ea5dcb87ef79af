//! C1: a retrying HTTP fetcher with exponential backoff, jitter, and pooled
//! keep-alive connections. Used by every component that needs to reach the
//! content server, the engine, or the profile lambda.

use std::time::Duration;

use rand::Rng;
use reqwest::{Method, StatusCode};
use tracing::{debug, warn};

use crate::error::FetchError;

/// Tuning knobs for [`Fetcher`]. Mirrors `FETCH_*` environment variables.
#[derive(Debug, Clone, Copy)]
pub struct FetchConfig {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub request_timeout: Duration,
    pub backoff_multiplier: u32,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            request_timeout: Duration::from_millis(60_000),
            backoff_multiplier: 2,
        }
    }
}

impl FetchConfig {
    /// Delay before attempt `n` (0-indexed retry count), including up to 25%
    /// uniform jitter.
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_millis() as u64;
        let factor = self.backoff_multiplier.pow(attempt) as u64;
        let capped = base.saturating_mul(factor).min(self.max_delay.as_millis() as u64);
        let jitter_max = capped / 4;
        let jitter = if jitter_max > 0 {
            rand::thread_rng().gen_range(0..=jitter_max)
        } else {
            0
        };
        Duration::from_millis(capped + jitter)
    }
}

/// Per-call override of method/headers/body/deadline. `None` fields inherit
/// the fetcher's defaults.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    pub method: Option<Method>,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
    pub timeout: Option<Duration>,
}

/// An HTTP client with exponential backoff, jitter, and connection pooling.
#[derive(Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    config: FetchConfig,
}

fn is_retryable_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::REQUEST_TIMEOUT
            | StatusCode::TOO_MANY_REQUESTS
            | StatusCode::INTERNAL_SERVER_ERROR
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

/// Network-layer errors we consider transient and worth retrying: DNS
/// failures, connection resets/refusals, broken pipes, and unreachable
/// hosts/networks. `reqwest` folds most of these into `is_connect()` and
/// `is_timeout()`, so we lean on those first and fall back to a string
/// match against the underlying error chain for the rest.
fn is_retryable_network_error(error: &reqwest::Error) -> bool {
    if error.is_timeout() || error.is_connect() {
        return true;
    }
    let text = format!("{error:?}").to_ascii_lowercase();
    [
        "name resolution",
        "connection reset",
        "connection refused",
        "broken pipe",
        "network is unreachable",
        "no route to host",
        "temporary failure in name resolution",
    ]
    .iter()
    .any(|needle| text.contains(needle))
}

impl Fetcher {
    pub fn new(config: FetchConfig) -> Self {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(5)
            .pool_idle_timeout(Duration::from_secs(60))
            .timeout(config.request_timeout)
            .build()
            .expect("failed to construct reqwest client for fetcher");

        Self { client, config }
    }

    /// Fetch `url`, retrying transient failures with exponential backoff.
    /// Returns the response of the first attempt that is either a 2xx or a
    /// non-retryable status; callers are responsible for inspecting the
    /// status themselves.
    pub async fn fetch(
        &self,
        url: &str,
        options: FetchOptions,
    ) -> Result<reqwest::Response, FetchError> {
        let method = options.method.clone().unwrap_or(Method::GET);
        let timeout = options.timeout.unwrap_or(self.config.request_timeout);

        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            let mut request = self.client.request(method.clone(), url).timeout(timeout);
            for (key, value) in &options.headers {
                request = request.header(key, value);
            }
            if let Some(body) = &options.body {
                request = request.body(body.clone());
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() || !is_retryable_status(status) {
                        return Ok(response);
                    }

                    // Drain the body so the connection is returned to the pool.
                    let _ = response.bytes().await;
                    warn!(
                        "retryable status {} from {} on attempt {}/{}",
                        status,
                        url,
                        attempt + 1,
                        self.config.max_retries + 1
                    );
                    last_error = Some(FetchError::Status {
                        url: url.to_owned(),
                        status: status.as_u16(),
                    });
                }
                Err(error) if is_retryable_network_error(&error) => {
                    debug!("retryable network error calling {}: {}", url, error);
                    last_error = Some(if error.is_timeout() {
                        FetchError::Timeout { url: url.to_owned() }
                    } else {
                        FetchError::Network {
                            url: url.to_owned(),
                            source: error,
                        }
                    });
                }
                Err(error) => {
                    return Err(FetchError::Build {
                        url: url.to_owned(),
                        source: error,
                    });
                }
            }

            if attempt < self.config.max_retries {
                tokio::time::sleep(self.config.delay_for_attempt(attempt)).await;
            }
        }

        Err(last_error.expect("at least one attempt was made"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn retries_transient_status_then_succeeds() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = Fetcher::new(FetchConfig {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            ..Default::default()
        });

        let response = fetcher
            .fetch(&server.uri(), FetchOptions::default())
            .await
            .expect("fetch should eventually succeed");

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn does_not_retry_non_retryable_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = Fetcher::new(FetchConfig::default());
        let response = fetcher
            .fetch(&server.uri(), FetchOptions::default())
            .await
            .expect("a non-retryable status is still returned to the caller");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn delay_grows_exponentially_and_caps() {
        let config = FetchConfig {
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            backoff_multiplier: 2,
            ..Default::default()
        };

        for attempt in 0..5 {
            let delay = config.delay_for_attempt(attempt);
            let base = 1000u64 * 2u64.pow(attempt);
            let expected_floor = base.min(30_000);
            let expected_ceil = (expected_floor as f64 * 1.25) as u64;
            assert!(delay.as_millis() as u64 >= expected_floor);
            assert!(delay.as_millis() as u64 <= expected_ceil);
        }
    }
}
