//! Retrying HTTP fetcher with outcome classification.
//!
//! Classification: transport errors, timeouts, HTTP 5xx and 429 are
//! retryable; any other non-2xx status is a permanent client error; 2xx is
//! success. Retries follow exponential backoff (`backoff_base * 2^(n-1)`)
//! up to `max_attempts` tries, and termination is a total function of the
//! explicit attempt state: every task ends in success, a permanent failure,
//! or `exhausted_retries`.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, warn};

use sluice_core::{ErrorCategory, FetchFailure, RetryPolicy};

use crate::template::ResolvedRequest;
use crate::transport::{HttpTransport, TransportError};

/// How one HTTP exchange terminated, before retry policy is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StatusClass {
    Success,
    Retryable,
    Permanent,
}

pub(crate) fn classify_status(status: u16) -> StatusClass {
    match status {
        200..=299 => StatusClass::Success,
        429 => StatusClass::Retryable,
        500..=599 => StatusClass::Retryable,
        // Remaining 4xx plus anything else that reaches us (1xx, stray 3xx)
        // indicates a defective request; retrying cannot help.
        _ => StatusClass::Permanent,
    }
}

/// Delay before attempt `attempt + 1`, given that `attempt` (1-based) failed.
pub fn backoff_delay(retry: &RetryPolicy, attempt: u32) -> Duration {
    let multiplier = 2u64.saturating_pow(attempt.saturating_sub(1));
    Duration::from_millis(retry.backoff_base_ms.saturating_mul(multiplier))
}

/// Executes one request under a retry policy.
pub struct HttpFetcher {
    transport: Arc<dyn HttpTransport>,
}

impl HttpFetcher {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }

    /// Fetch with retries. Returns the payload and the number of attempts
    /// used, or the terminal [`FetchFailure`].
    pub async fn fetch(
        &self,
        request: &ResolvedRequest,
        headers: &BTreeMap<String, String>,
        timeout: Duration,
        retry: &RetryPolicy,
    ) -> Result<(Bytes, u32), FetchFailure> {
        let max_attempts = retry.max_attempts.max(1);
        let mut attempt = 1u32;

        loop {
            let retryable_message = match self.transport.execute(request, headers, timeout).await {
                Ok(response) => match classify_status(response.status) {
                    StatusClass::Success => return Ok((response.body, attempt)),
                    StatusClass::Permanent => {
                        return Err(FetchFailure {
                            category: ErrorCategory::ClientRequest,
                            message: format!("http status {}", response.status),
                            attempts_used: attempt,
                        });
                    }
                    StatusClass::Retryable => format!("http status {}", response.status),
                },
                Err(TransportError::Timeout) => format!("request timed out after {timeout:?}"),
                Err(TransportError::Network(message)) => message,
            };

            if attempt >= max_attempts {
                return Err(FetchFailure {
                    category: ErrorCategory::ExhaustedRetries,
                    message: format!(
                        "gave up after {attempt} attempts, last error: {retryable_message}"
                    ),
                    attempts_used: attempt,
                });
            }

            let delay = backoff_delay(retry, attempt);
            warn!(
                url = %request.url,
                attempt = attempt,
                max_attempts = max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %retryable_message,
                "retryable fetch failure, backing off"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
            debug!(url = %request.url, attempt = attempt, "retrying fetch");
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::transport::HttpResponse;

    /// Transport that replays a scripted sequence of results and counts calls.
    struct ScriptedTransport {
        script: Mutex<VecDeque<Result<HttpResponse, TransportError>>>,
        calls: AtomicU32,
    }

    impl ScriptedTransport {
        fn new(script: Vec<Result<HttpResponse, TransportError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                calls: AtomicU32::new(0),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl HttpTransport for ScriptedTransport {
        async fn execute(
            &self,
            _request: &ResolvedRequest,
            _headers: &BTreeMap<String, String>,
            _timeout: Duration,
        ) -> Result<HttpResponse, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(TransportError::Network("script exhausted".to_string())))
        }
    }

    fn status(code: u16) -> Result<HttpResponse, TransportError> {
        Ok(HttpResponse {
            status: code,
            body: Bytes::from_static(b"body"),
        })
    }

    fn request() -> ResolvedRequest {
        ResolvedRequest {
            url: "https://api.example.com/weather".to_string(),
            query_params: Default::default(),
        }
    }

    fn fast_retry(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            backoff_base_ms: 1,
        }
    }

    async fn run(
        transport: Arc<ScriptedTransport>,
        retry: RetryPolicy,
    ) -> Result<(Bytes, u32), FetchFailure> {
        HttpFetcher::new(transport)
            .fetch(&request(), &BTreeMap::new(), Duration::from_secs(1), &retry)
            .await
    }

    #[test]
    fn test_status_classification() {
        assert_eq!(classify_status(200), StatusClass::Success);
        assert_eq!(classify_status(204), StatusClass::Success);
        assert_eq!(classify_status(301), StatusClass::Permanent);
        assert_eq!(classify_status(400), StatusClass::Permanent);
        assert_eq!(classify_status(404), StatusClass::Permanent);
        assert_eq!(classify_status(429), StatusClass::Retryable);
        assert_eq!(classify_status(500), StatusClass::Retryable);
        assert_eq!(classify_status(503), StatusClass::Retryable);
    }

    #[test]
    fn test_backoff_strictly_increases() {
        let retry = RetryPolicy {
            max_attempts: 5,
            backoff_base_ms: 500,
        };
        assert_eq!(backoff_delay(&retry, 1), Duration::from_millis(500));
        assert_eq!(backoff_delay(&retry, 2), Duration::from_millis(1000));
        assert_eq!(backoff_delay(&retry, 3), Duration::from_millis(2000));
        assert_eq!(backoff_delay(&retry, 4), Duration::from_millis(4000));
    }

    #[tokio::test]
    async fn test_success_first_try() {
        let transport = ScriptedTransport::new(vec![status(200)]);
        let (body, attempts) = run(transport.clone(), fast_retry(3)).await.unwrap();
        assert_eq!(body, Bytes::from_static(b"body"));
        assert_eq!(attempts, 1);
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_persistent_500_exhausts_retries() {
        let transport = ScriptedTransport::new(vec![status(500), status(500), status(500)]);
        let failure = run(transport.clone(), fast_retry(3)).await.unwrap_err();
        assert_eq!(failure.category, ErrorCategory::ExhaustedRetries);
        assert_eq!(failure.attempts_used, 3);
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test]
    async fn test_404_is_permanent_without_retry() {
        let transport = ScriptedTransport::new(vec![status(404)]);
        let failure = run(transport.clone(), fast_retry(3)).await.unwrap_err();
        assert_eq!(failure.category, ErrorCategory::ClientRequest);
        assert_eq!(failure.attempts_used, 1);
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_429_retries_then_succeeds() {
        let transport = ScriptedTransport::new(vec![status(429), status(200)]);
        let (_, attempts) = run(transport.clone(), fast_retry(3)).await.unwrap();
        assert_eq!(attempts, 2);
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_network_error_retries_then_succeeds() {
        let transport = ScriptedTransport::new(vec![
            Err(TransportError::Network("connection reset".to_string())),
            Err(TransportError::Timeout),
            status(200),
        ]);
        let (_, attempts) = run(transport.clone(), fast_retry(5)).await.unwrap();
        assert_eq!(attempts, 3);
    }

    #[tokio::test]
    async fn test_zero_max_attempts_still_tries_once() {
        let transport = ScriptedTransport::new(vec![status(200)]);
        let (_, attempts) = run(transport.clone(), fast_retry(0)).await.unwrap();
        assert_eq!(attempts, 1);
    }
}
