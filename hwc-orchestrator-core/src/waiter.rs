//! Bounded status polling
//!
//! An [`OperationHandle`] describes one in-flight remote operation: how to probe
//! its status and which statuses mean done, failed or still going. Waiting
//! consumes the handle, and exactly one of target reached, failure status
//! reached, deadline exceeded, probe error or cancellation ends it.

use std::future::Future;
use std::time::Duration;

use futures::future::BoxFuture;
use thiserror::Error;
use tokio::time::{Instant, sleep_until, timeout_at};
use tokio_util::sync::CancellationToken;

use hwc_orchestrator_provider::{StatusClass, StatusSets, StatusWait, WaitTiming};

/// One status observation returned by a probe.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeResult<T> {
    pub status: String,
    /// Whatever the probe read alongside the status.
    pub value: T,
    /// Explanation the remote attached, reported with failure statuses.
    pub detail: Option<String>,
}

impl<T> ProbeResult<T> {
    pub fn new(status: impl Into<String>, value: T) -> Self {
        Self {
            status: status.into(),
            value,
            detail: None,
        }
    }

    #[must_use]
    pub fn with_detail(mut self, detail: Option<String>) -> Self {
        self.detail = detail;
        self
    }
}

/// Successful end of a wait.
#[derive(Debug, Clone, PartialEq)]
pub struct WaitOutcome<T> {
    pub status: String,
    pub value: T,
    pub probes: u32,
    pub elapsed: Duration,
}

#[derive(Debug, Error)]
pub enum WaitError<E> {
    #[error("reached failure status '{status}'")]
    FailureStatus {
        status: String,
        detail: Option<String>,
    },

    #[error("timed out after {elapsed:?} (last status: {last_status:?})")]
    Timeout {
        last_status: Option<String>,
        elapsed: Duration,
    },

    #[error("status probe failed: {0}")]
    Probe(E),

    #[error("cancelled")]
    Cancelled,
}

type Probe<'a, T, E> = Box<dyn FnMut() -> BoxFuture<'a, Result<ProbeResult<T>, E>> + Send + 'a>;

/// An in-flight asynchronous remote operation.
pub struct OperationHandle<'a, T, E> {
    operation_id: Option<String>,
    sets: StatusSets,
    timing: WaitTiming,
    timeout: Duration,
    probe: Probe<'a, T, E>,
}

impl<'a, T, E> OperationHandle<'a, T, E>
where
    T: Send + 'a,
    E: Send + 'a,
{
    /// Handle polling `probe` until a status in `sets` settles it.
    ///
    /// `sets` are validated disjoint when built; timing defaults to no initial
    /// delay and a one-second interval.
    pub fn new<F, Fut>(sets: StatusSets, timeout: Duration, mut probe: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'a,
        Fut: Future<Output = Result<ProbeResult<T>, E>> + Send + 'a,
    {
        Self {
            operation_id: None,
            sets,
            timing: WaitTiming::secs(0, 1),
            timeout,
            probe: Box::new(move || Box::pin(probe())),
        }
    }

    /// Handle for a mapper-declared wait.
    pub fn for_wait<F, Fut>(wait: &StatusWait, timeout: Duration, probe: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'a,
        Fut: Future<Output = Result<ProbeResult<T>, E>> + Send + 'a,
    {
        Self::new(wait.sets.clone(), timeout, probe).with_timing(wait.timing)
    }

    #[must_use]
    pub fn with_timing(mut self, timing: WaitTiming) -> Self {
        self.timing = timing;
        self
    }

    #[must_use]
    pub fn with_operation_id(mut self, operation_id: impl Into<String>) -> Self {
        self.operation_id = Some(operation_id.into());
        self
    }

    pub fn operation_id(&self) -> Option<&str> {
        self.operation_id.as_deref()
    }

    /// Poll until the operation settles.
    ///
    /// Sleeps are cut short at the deadline and a probe still running at the
    /// deadline is abandoned, so this returns within `timeout` of the call
    /// (plus scheduling slack).
    pub async fn wait(mut self, cancel: &CancellationToken) -> Result<WaitOutcome<T>, WaitError<E>> {
        let start = Instant::now();
        let deadline = start + self.timeout;
        let op = self.operation_id.take().unwrap_or_default();
        let mut last_status: Option<String> = None;
        let mut probes = 0u32;

        let timed_out = |last_status: Option<String>| WaitError::Timeout {
            last_status,
            elapsed: start.elapsed(),
        };

        log::debug!(
            "waiting {op} for {:?} (timeout {:?})",
            self.sets.target(),
            self.timeout
        );

        let first = (start + self.timing.initial_delay).min(deadline);
        tokio::select! {
            () = cancel.cancelled() => return Err(WaitError::Cancelled),
            () = sleep_until(first) => {}
        }

        loop {
            let result = tokio::select! {
                () = cancel.cancelled() => return Err(WaitError::Cancelled),
                r = timeout_at(deadline, (self.probe)()) => r,
            };
            let Ok(result) = result else {
                return Err(timed_out(last_status));
            };
            probes += 1;
            let observation = result.map_err(WaitError::Probe)?;

            match self.sets.classify(&observation.status) {
                StatusClass::Target => {
                    log::debug!("{op} reached '{}' after {probes} probe(s)", observation.status);
                    return Ok(WaitOutcome {
                        status: observation.status,
                        value: observation.value,
                        probes,
                        elapsed: start.elapsed(),
                    });
                }
                StatusClass::Failure => {
                    return Err(WaitError::FailureStatus {
                        status: observation.status,
                        detail: observation.detail,
                    });
                }
                StatusClass::Pending => {
                    if !self.sets.is_known(&observation.status) {
                        log::warn!("{op} reported unexpected status '{}', still waiting", observation.status);
                    }
                    last_status = Some(observation.status);
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(timed_out(last_status));
            }
            let next = (now + self.timing.poll_interval).min(deadline);
            tokio::select! {
                () = cancel.cancelled() => return Err(WaitError::Cancelled),
                () = sleep_until(next) => {}
            }
        }
    }
}
