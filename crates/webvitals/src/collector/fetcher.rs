//! Rate-limited request execution with bounded retry on throttling
//!
//! Only HTTP 429 is retried. Any other non-200 status, a timeout or a transport
//! error ends the URL immediately as an absent payload.

use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::collector::{
    api::MeasurementApi,
    batch::BatchMetrics,
    config::ThrottleRetryConfig,
    core::{CollectorError, Failure, ProgressCallback, ProgressEvent, Result},
    rate_limit::RateLimiter,
};

/// Why a fetch produced no payload
#[derive(Debug, Clone, PartialEq)]
pub enum AbsentReason {
    /// Non-200, non-429 status
    Status(u16),
    Timeout,
    Transport(String),
}

impl From<AbsentReason> for Failure {
    fn from(reason: AbsentReason) -> Self {
        match reason {
            AbsentReason::Status(status) => Failure::Http { status },
            AbsentReason::Timeout => Failure::Timeout,
            AbsentReason::Transport(msg) => Failure::Transport(msg),
        }
    }
}

/// Result of one fetch that did not hit a terminal error
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// Decoded body of a 200 response
    Payload(Value),
    Absent(AbsentReason),
}

/// Issues measurement requests through a shared rate limiter
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
    limiter: Arc<RateLimiter>,
    retry: ThrottleRetryConfig,
    timeout: Option<Duration>,
}

impl Fetcher {
    pub fn new(client: Client, limiter: Arc<RateLimiter>, retry: ThrottleRetryConfig) -> Self {
        Self {
            client,
            limiter,
            retry,
            timeout: None,
        }
    }

    /// Override the API's default per-request timeout
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Fetch the payload for `url`
    ///
    /// Every attempt, retries included, passes through the rate limiter first.
    /// Errors are `ThrottleRetriesExhausted`, `Cancelled` or `MalformedPayload`.
    pub async fn fetch(
        &self,
        api: &dyn MeasurementApi,
        url: &str,
        cancel: &CancellationToken,
        metrics: &BatchMetrics,
        progress_callback: Option<&ProgressCallback>,
    ) -> Result<FetchOutcome> {
        let max_attempts = self.retry.max_attempts.max(1);
        let timeout = self.timeout.unwrap_or_else(|| api.timeout());

        for attempt in 1..=max_attempts {
            self.limiter
                .admit_or_cancel(cancel)
                .await
                .map_err(|_| cancelled(url, "cancelled before request was admitted"))?;

            debug!("{} request for {} (attempt {}/{})", api.name(), url, attempt, max_attempts);
            let response = match api.request(&self.client, url).timeout(timeout).send().await {
                Ok(response) => response,
                Err(e) if e.is_timeout() => {
                    debug!("{} request for {} timed out after {:?}", api.name(), url, timeout);
                    return Ok(FetchOutcome::Absent(AbsentReason::Timeout));
                }
                Err(e) => {
                    debug!("{} request for {} failed: {}", api.name(), url, e);
                    return Ok(FetchOutcome::Absent(AbsentReason::Transport(e.to_string())));
                }
            };

            let status = response.status();
            debug!("{} response for {}: {}", api.name(), url, status);

            if status == StatusCode::OK {
                let body = match response.bytes().await {
                    Ok(body) => body,
                    Err(e) if e.is_timeout() => return Ok(FetchOutcome::Absent(AbsentReason::Timeout)),
                    Err(e) => return Ok(FetchOutcome::Absent(AbsentReason::Transport(e.to_string()))),
                };
                return serde_json::from_slice::<Value>(&body)
                    .map(FetchOutcome::Payload)
                    .map_err(|e| CollectorError::MalformedPayload {
                        url: url.to_string(),
                        reason: format!("response is not valid JSON: {}", e),
                    });
            }

            if status != StatusCode::TOO_MANY_REQUESTS {
                return Ok(FetchOutcome::Absent(AbsentReason::Status(status.as_u16())));
            }

            if attempt == max_attempts {
                break;
            }

            metrics.record_throttle_retry();
            warn!(
                "Throttled by {} for {}, retrying in {:?} ({}/{})",
                api.name(),
                url,
                self.retry.backoff,
                attempt + 1,
                max_attempts
            );
            if let Some(callback) = progress_callback {
                callback(ProgressEvent::ThrottleRetry {
                    url: url.to_string(),
                    attempt: attempt + 1,
                    max_attempts,
                });
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(cancelled(url, "cancelled during throttle backoff"));
                }
                _ = tokio::time::sleep(self.retry.backoff) => {}
            }
        }

        Err(CollectorError::ThrottleRetriesExhausted {
            url: url.to_string(),
            attempts: max_attempts,
        })
    }
}

fn cancelled(url: &str, reason: &str) -> CollectorError {
    CollectorError::Cancelled {
        reason: reason.to_string(),
        url: Some(url.to_string()),
    }
}
