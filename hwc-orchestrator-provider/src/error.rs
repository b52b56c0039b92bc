use serde::{Deserialize, Serialize};

/// Transport-level failure reported by a [`Transport`](crate::Transport).
///
/// Each variant names the `service` (endpoint family such as `cdn` or `oms`)
/// that produced it. These errors are raw: they are never interpreted here.
/// The [`ErrorClassifier`](crate::ErrorClassifier) is the only place that turns
/// them into not-found / retryable / fatal decisions.
///
/// # Transient variants
///
/// - [`NetworkError`](Self::NetworkError): connectivity issues and 502/503/504
/// - [`Timeout`](Self::Timeout): the HTTP request itself timed out
/// - [`RateLimited`](Self::RateLimited): HTTP 429
///
/// The built-in client retries these for idempotent requests only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "code")]
pub enum ProviderError {
    /// A network-level error occurred (DNS resolution failure, connection refused, etc.).
    NetworkError {
        /// Service that produced the error.
        service: String,
        /// Error details.
        detail: String,
    },

    /// The HTTP request timed out.
    Timeout {
        /// Service that produced the error.
        service: String,
        /// Error details.
        detail: String,
    },

    /// The API rate limit has been exceeded (HTTP 429).
    RateLimited {
        /// Service that produced the error.
        service: String,
        /// Suggested wait time in seconds before retrying, if provided by the API.
        retry_after: Option<u64>,
        /// Original response body, if any.
        raw_message: Option<String>,
    },

    /// Failed to parse a response body.
    ParseError {
        /// Service that produced the error.
        service: String,
        /// Details about the parse failure.
        detail: String,
    },

    /// Failed to serialize a request body.
    SerializationError {
        /// Service that produced the error.
        service: String,
        /// Details about the serialization failure.
        detail: String,
    },

    /// The client is misconfigured (missing project id, unknown service, bad header value).
    InvalidConfig {
        /// Name of the offending setting.
        field: String,
        /// Description of what's wrong.
        detail: String,
    },
}

impl ProviderError {
    /// Whether the failure is transient and the same request may succeed later.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NetworkError { .. } | Self::Timeout { .. } | Self::RateLimited { .. }
        )
    }
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NetworkError { service, detail } => {
                write!(f, "[{service}] Network error: {detail}")
            }
            Self::Timeout { service, detail } => {
                write!(f, "[{service}] Request timeout: {detail}")
            }
            Self::RateLimited {
                service,
                retry_after,
                ..
            } => {
                if let Some(secs) = retry_after {
                    write!(f, "[{service}] Rate limited (retry after {secs}s)")
                } else {
                    write!(f, "[{service}] Rate limited")
                }
            }
            Self::ParseError { service, detail } => {
                write!(f, "[{service}] Parse error: {detail}")
            }
            Self::SerializationError { service, detail } => {
                write!(f, "[{service}] Serialization error: {detail}")
            }
            Self::InvalidConfig { field, detail } => {
                write!(f, "Invalid configuration '{field}': {detail}")
            }
        }
    }
}

impl std::error::Error for ProviderError {}

/// Convenience type alias for `Result<T, ProviderError>`.
pub type Result<T> = std::result::Result<T, ProviderError>;
