//! Shared HTTP execution
//!
//! Sends an already-signed `RequestBuilder`, logs the exchange and turns
//! connection-level failures into [`ProviderError`]. Business error bodies are
//! returned untouched; interpreting them is the classifier's job.
//!
//! Retries happen here only for replayable requests (see
//! [`Method::is_replayable`](crate::Method::is_replayable)). Mutating calls are
//! sent once so a timed-out create is never duplicated.

use reqwest::RequestBuilder;
use std::time::Duration;

use crate::error::ProviderError;
use crate::utils::log_sanitizer::sanitize_body;

/// Longest honoured `Retry-After`.
const MAX_RETRY_AFTER_SECS: u64 = 30;
/// Ceiling for exponential backoff between transport retries.
const MAX_BACKOFF_MS: u64 = 10_000;

/// HTTP helpers shared by the signed client.
pub struct HttpUtils;

impl HttpUtils {
    /// Send one request and return `(status, body)`.
    ///
    /// 429 becomes [`ProviderError::RateLimited`] and 502/503/504 become
    /// [`ProviderError::NetworkError`]; every other status is returned as-is.
    pub async fn execute_request(
        request_builder: RequestBuilder,
        service: &str,
        describe: &str,
    ) -> Result<(u16, String), ProviderError> {
        log::debug!("[{service}] {describe}");

        let response = request_builder.send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout {
                    service: service.to_string(),
                    detail: e.to_string(),
                }
            } else {
                ProviderError::NetworkError {
                    service: service.to_string(),
                    detail: e.to_string(),
                }
            }
        })?;

        let status_code = response.status().as_u16();
        log::debug!("[{service}] Response Status: {status_code}");

        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());

        if status_code == 429 {
            let body = response.text().await.unwrap_or_default();
            log::warn!("[{service}] Rate limited (HTTP 429), retry_after={retry_after:?}");
            return Err(ProviderError::RateLimited {
                service: service.to_string(),
                retry_after,
                raw_message: Some(body),
            });
        }

        if matches!(status_code, 502..=504) {
            let body = response.text().await.unwrap_or_default();
            log::warn!("[{service}] Gateway error (HTTP {status_code})");
            return Err(ProviderError::NetworkError {
                service: service.to_string(),
                detail: format!("HTTP {status_code}: {}", sanitize_body(&body)),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::NetworkError {
                service: service.to_string(),
                detail: format!("Failed to read response body: {e}"),
            })?;

        log::debug!("[{service}] Response Body: {}", sanitize_body(&body));

        Ok((status_code, body))
    }

    /// Like [`execute_request`](Self::execute_request) but retries transient
    /// failures up to `max_retries` times.
    ///
    /// Backoff is 100ms doubling per attempt, capped at 10s. A 429 carrying
    /// `Retry-After` waits that long instead (capped at 30s).
    pub async fn execute_request_with_retry(
        request_builder: RequestBuilder,
        service: &str,
        describe: &str,
        max_retries: u32,
    ) -> Result<(u16, String), ProviderError> {
        if max_retries == 0 {
            return Self::execute_request(request_builder, service, describe).await;
        }

        let mut last_error = None;

        for attempt in 0..=max_retries {
            let Some(req) = request_builder.try_clone() else {
                log::warn!("[{service}] Cannot clone request, sending without retry");
                return Self::execute_request(request_builder, service, describe).await;
            };

            match Self::execute_request(req, service, describe).await {
                Ok(resp) => return Ok(resp),
                Err(e) if attempt < max_retries && e.is_retryable() => {
                    let delay = retry_delay(&e, attempt);
                    log::warn!(
                        "[{}] {} failed (attempt {}/{}), retrying in {:.1}s: {}",
                        service,
                        describe,
                        attempt + 1,
                        max_retries,
                        delay.as_secs_f32(),
                        e
                    );
                    tokio::time::sleep(delay).await;
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| ProviderError::NetworkError {
            service: service.to_string(),
            detail: "All retries exhausted with no error captured".to_string(),
        }))
    }
}

fn retry_delay(error: &ProviderError, attempt: u32) -> Duration {
    if let ProviderError::RateLimited {
        retry_after: Some(secs),
        ..
    } = error
    {
        Duration::from_secs((*secs).min(MAX_RETRY_AFTER_SECS))
    } else {
        backoff_delay(attempt)
    }
}

fn backoff_delay(attempt: u32) -> Duration {
    let capped_attempt = attempt.min(20);
    let delay_ms = 100_u64.saturating_mul(1_u64 << capped_attempt);
    Duration::from_millis(delay_ms.min(MAX_BACKOFF_MS))
}
