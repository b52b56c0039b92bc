//! Unified error type definition

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

// Re-export library error types
pub use hwc_orchestrator_provider::{MappingError, ProviderError};

/// Reconciliation phase an error happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Create,
    Read,
    Update,
    Delete,
    List,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::List => "list",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What went wrong, independent of where.
#[derive(Debug, Error)]
pub enum ErrorCause {
    /// The resource does not exist.
    #[error("resource not found")]
    NotFound,

    /// Transient failure; the same call may succeed later.
    #[error("retryable failure: {0}")]
    Retryable(String),

    /// Permanent failure reported by the service.
    #[error("{0}")]
    Fatal(String),

    /// A create call succeeded without returning an identifier.
    #[error("create response did not contain a resource id")]
    MissingId,

    /// The desired state or a response could not be mapped.
    #[error(transparent)]
    Mapping(#[from] MappingError),

    /// A status wait reached one of its failure statuses.
    #[error("reached failure status '{status}'{}", detail_suffix(.detail.as_ref()))]
    FailureStatus {
        status: String,
        detail: Option<String>,
    },

    /// The operation budget ran out before the target status was reached.
    #[error("timed out after {elapsed:?} (last status: {})", .last_status.as_deref().unwrap_or("none"))]
    Timeout {
        last_status: Option<String>,
        elapsed: Duration,
    },

    /// The caller cancelled the operation.
    #[error("cancelled")]
    Cancelled,

    /// Misconfiguration, e.g. an unsupported kind.
    #[error(transparent)]
    Config(#[from] ProviderError),
}

fn detail_suffix(detail: Option<&String>) -> String {
    detail.map(|d| format!(": {d}")).unwrap_or_default()
}

impl ErrorCause {
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable(_))
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}

/// A reconciliation failure with the context it happened in.
#[derive(Debug, Error)]
#[error(
    "{phase} {kind}{}{}: {cause}",
    remote_id_suffix(.remote_id.as_deref()),
    step_suffix(.step.as_deref())
)]
pub struct ReconcileError {
    pub kind: String,
    pub phase: Phase,
    /// Transition label (`disable`, `stop`, `wait_online`...) when inside one.
    pub step: Option<&'static str>,
    /// Known remote id. Set for a create that obtained one and failed later.
    pub remote_id: Option<String>,
    #[source]
    pub cause: ErrorCause,
}

fn remote_id_suffix(remote_id: Option<&str>) -> String {
    remote_id.map(|id| format!(" ({id})")).unwrap_or_default()
}

fn step_suffix(step: Option<&str>) -> String {
    step.map(|s| format!(" [{s}]")).unwrap_or_default()
}

impl ReconcileError {
    pub fn new(kind: impl Into<String>, phase: Phase, cause: ErrorCause) -> Self {
        Self {
            kind: kind.into(),
            phase,
            step: None,
            remote_id: None,
            cause,
        }
    }

    #[must_use]
    pub fn at_step(mut self, step: &'static str) -> Self {
        self.step = Some(step);
        self
    }

    #[must_use]
    pub fn with_remote_id(mut self, remote_id: impl Into<String>) -> Self {
        self.remote_id = Some(remote_id.into());
        self
    }

    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.cause.is_retryable()
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.cause.is_not_found()
    }

    /// Whether it is expected behaviour (bad input, missing resource), used for
    /// choosing the log level at the binary boundary.
    #[must_use]
    pub fn is_expected(&self) -> bool {
        matches!(
            self.cause,
            ErrorCause::NotFound | ErrorCause::Mapping(_) | ErrorCause::Cancelled
        )
    }
}

/// Core layer Result type alias
pub type CoreResult<T> = std::result::Result<T, ReconcileError>;
