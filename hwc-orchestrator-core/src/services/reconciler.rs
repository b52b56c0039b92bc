//! Resource reconciliation service

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::time::{Instant, sleep_until, timeout_at};
use tokio_util::sync::CancellationToken;

use hwc_orchestrator_provider::utils::json_path;
use hwc_orchestrator_provider::utils::log_sanitizer::sanitize_body;
use hwc_orchestrator_provider::{
    ABSENT_STATUS, ApiFault, ApiRequest, Classification, MappingError, ObservedState, Page,
    ProviderError, ResourceMapper, ResourceSpec, StatusWait, Timeouts, Transition,
};

use crate::diff::{check_immutable, compute_changes};
use crate::error::{CoreResult, ErrorCause, Phase, ReconcileError};
use crate::pager;
use crate::services::ServiceContext;
use crate::waiter::{OperationHandle, ProbeResult, WaitError};

/// First pause before retrying a delete the service reported as busy.
const DELETE_RETRY_INITIAL: Duration = Duration::from_secs(3);
const DELETE_RETRY_MAX: Duration = Duration::from_secs(30);
/// Budget of the read that follows a successful create or update.
const FINAL_READ_TIMEOUT: Duration = Duration::from_secs(30);
/// Upper bound on pre-delete planning passes.
const MAX_PRE_DELETE_PLANS: usize = 4;

/// Per-operation budgets replacing the kind's defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeoutOverrides {
    pub create: Option<Duration>,
    pub update: Option<Duration>,
    pub delete: Option<Duration>,
}

impl TimeoutOverrides {
    fn resolve(&self, defaults: Timeouts) -> Timeouts {
        Timeouts {
            create: self.create.unwrap_or(defaults.create),
            update: self.update.unwrap_or(defaults.update),
            delete: self.delete.unwrap_or(defaults.delete),
        }
    }
}

/// A call the service did not accept.
struct Rejection {
    cause: ErrorCause,
    /// Envelope code, for matching tolerated codes.
    code: Option<String>,
}

impl From<ErrorCause> for Rejection {
    fn from(cause: ErrorCause) -> Self {
        Self { cause, code: None }
    }
}

fn cause_of(class: Classification) -> ErrorCause {
    match class {
        Classification::NotFound => ErrorCause::NotFound,
        Classification::Retryable(reason) => ErrorCause::Retryable(reason),
        Classification::Fatal(reason) => ErrorCause::Fatal(reason),
        Classification::Success => ErrorCause::Fatal("unexpected success classification".into()),
    }
}

/// One running operation: its kind, phase and shared deadline.
struct Scope<'a> {
    mapper: &'a dyn ResourceMapper,
    phase: Phase,
    started: Instant,
    deadline: Instant,
    cancel: &'a CancellationToken,
    remote_id: Option<String>,
}

impl<'a> Scope<'a> {
    fn new(
        mapper: &'a dyn ResourceMapper,
        phase: Phase,
        budget: Duration,
        cancel: &'a CancellationToken,
    ) -> Self {
        let started = Instant::now();
        Self {
            mapper,
            phase,
            started,
            deadline: started + budget,
            cancel,
            remote_id: None,
        }
    }

    fn kind(&self) -> &'static str {
        self.mapper.kind()
    }

    fn fail(&self, cause: ErrorCause) -> ReconcileError {
        let err = ReconcileError::new(self.kind(), self.phase, cause);
        match &self.remote_id {
            Some(id) => err.with_remote_id(id.clone()),
            None => err,
        }
    }

    /// Same operation, with a new deadline `budget` from now.
    fn rebudgeted(&self, budget: Duration) -> Scope<'a> {
        Scope {
            mapper: self.mapper,
            phase: self.phase,
            started: self.started,
            deadline: Instant::now() + budget,
            cancel: self.cancel,
            remote_id: self.remote_id.clone(),
        }
    }

    fn timed_out(&self, last_status: Option<String>) -> ErrorCause {
        ErrorCause::Timeout {
            last_status,
            elapsed: self.started.elapsed(),
        }
    }
}

/// Drives remote resources toward their desired state.
///
/// Stateless apart from the shared context; one instance serves any number of
/// concurrent operations.
pub struct ResourceReconciler {
    ctx: Arc<ServiceContext>,
    timeouts: TimeoutOverrides,
}

impl ResourceReconciler {
    #[must_use]
    pub fn new(ctx: Arc<ServiceContext>) -> Self {
        Self {
            ctx,
            timeouts: TimeoutOverrides::default(),
        }
    }

    #[must_use]
    pub fn with_timeouts(mut self, timeouts: TimeoutOverrides) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Create or update `spec`, whichever its recorded id calls for.
    ///
    /// A recorded id whose resource vanished out-of-band is recreated.
    pub async fn apply(
        &self,
        spec: &ResourceSpec,
        cancel: &CancellationToken,
    ) -> CoreResult<ObservedState> {
        let Some(remote_id) = spec.remote_id.as_deref() else {
            return self.create(spec, cancel).await;
        };
        match self.read(&spec.kind, remote_id, cancel).await? {
            Some(observed) => self.update(spec, &observed, cancel).await,
            None => {
                log::warn!("{} {remote_id} no longer exists, recreating", spec.kind);
                self.create(spec, cancel).await
            }
        }
    }

    /// Create the resource and wait until it is usable.
    ///
    /// Once the service assigned an id, every later failure carries it.
    pub async fn create(
        &self,
        spec: &ResourceSpec,
        cancel: &CancellationToken,
    ) -> CoreResult<ObservedState> {
        let mapper = self.mapper(&spec.kind, Phase::Create).await?;
        let budget = self.budgets(mapper.as_ref()).create;
        let mut scope = Scope::new(mapper.as_ref(), Phase::Create, budget, cancel);

        let request = mapper
            .build_create(spec)
            .map_err(|e| scope.fail(e.into()))?;
        let body = self
            .send(&scope, &request, false)
            .await
            .map_err(|r| scope.fail(r.cause))?;
        let remote_id = mapper
            .extract_id(&body)
            .ok_or_else(|| scope.fail(ErrorCause::MissingId))?;
        log::info!("Created {} {remote_id}", spec.kind);
        scope.remote_id = Some(remote_id.clone());

        if let Some(wait) = mapper.create_wait() {
            self.wait_for(&scope, &remote_id, &wait, "wait_active")
                .await?;
        }
        let transitions = mapper
            .after_create(&remote_id, spec)
            .map_err(|e| scope.fail(e.into()))?;
        for transition in &transitions {
            self.run_transition(&scope, &remote_id, transition).await?;
        }

        self.require_observed(&scope, &remote_id).await
    }

    /// Fresh snapshot of the resource, `None` when it does not exist.
    ///
    /// Reads share the kind's update budget.
    pub async fn read(
        &self,
        kind: &str,
        remote_id: &str,
        cancel: &CancellationToken,
    ) -> CoreResult<Option<ObservedState>> {
        let mapper = self.mapper(kind, Phase::Read).await?;
        let budget = self.budgets(mapper.as_ref()).update;
        let mut scope = Scope::new(mapper.as_ref(), Phase::Read, budget, cancel);
        scope.remote_id = Some(remote_id.to_string());
        self.observe(&scope, remote_id, false)
            .await
            .map_err(|c| scope.fail(c))
    }

    /// Bring an existing resource in line with `spec`.
    ///
    /// Makes no remote call when nothing differs. Changes to immutable fields
    /// fail before any call.
    pub async fn update(
        &self,
        spec: &ResourceSpec,
        observed: &ObservedState,
        cancel: &CancellationToken,
    ) -> CoreResult<ObservedState> {
        let mapper = self.mapper(&spec.kind, Phase::Update).await?;
        let budget = self.budgets(mapper.as_ref()).update;
        let mut scope = Scope::new(mapper.as_ref(), Phase::Update, budget, cancel);
        let remote_id = observed.remote_id.as_str();
        scope.remote_id = Some(remote_id.to_string());

        let changes = compute_changes(mapper.as_ref(), spec, observed);
        if changes.is_empty() {
            log::debug!("{} {remote_id} is up to date", spec.kind);
            return Ok(observed.clone());
        }
        check_immutable(mapper.as_ref(), &changes).map_err(|e| scope.fail(e.into()))?;
        log::info!(
            "Updating {} {remote_id}: {}",
            spec.kind,
            changes.paths().collect::<Vec<_>>().join(", ")
        );

        let steps = mapper
            .build_update(remote_id, spec, &changes)
            .map_err(|e| scope.fail(e.into()))?;
        for step in &steps {
            self.run_transition(&scope, remote_id, step).await?;
        }

        self.require_observed(&scope, remote_id).await
    }

    /// Delete the resource, first moving it into a deletable state.
    ///
    /// A resource that is already gone counts as deleted. Kinds without a
    /// delete call are only forgotten locally.
    pub async fn delete(
        &self,
        kind: &str,
        remote_id: &str,
        cancel: &CancellationToken,
    ) -> CoreResult<()> {
        let mapper = self.mapper(kind, Phase::Delete).await?;
        let Some(request) = mapper.build_delete(remote_id) else {
            log::info!("{kind} {remote_id} has no remote deletion, forgetting it");
            return Ok(());
        };
        let budget = self.budgets(mapper.as_ref()).delete;
        let mut scope = Scope::new(mapper.as_ref(), Phase::Delete, budget, cancel);
        scope.remote_id = Some(remote_id.to_string());

        let Some(observed) = self
            .observe(&scope, remote_id, false)
            .await
            .map_err(|c| scope.fail(c))?
        else {
            log::info!("{kind} {remote_id} is already gone");
            return Ok(());
        };

        let mut plan = mapper.pre_delete(&observed);
        for _ in 0..MAX_PRE_DELETE_PLANS {
            let mut settled = None;
            for transition in &plan {
                settled = self.run_transition(&scope, remote_id, transition).await?;
            }
            let replan = plan.last().is_some_and(|t| t.request.is_none());
            match settled {
                Some(state) if replan => plan = mapper.pre_delete(&state),
                _ => break,
            }
        }

        if !self.send_delete(&scope, &request).await? {
            log::info!("{kind} {remote_id} disappeared before the delete call");
            return Ok(());
        }

        if let Some(wait) = mapper.deletion_wait() {
            self.wait_for(&scope, remote_id, &wait, "wait_deleted")
                .await?;
        }
        log::info!("Deleted {kind} {remote_id}");
        Ok(())
    }

    /// Every resource of `kind` visible to the account.
    pub async fn list(
        &self,
        kind: &str,
        cancel: &CancellationToken,
    ) -> CoreResult<Vec<ObservedState>> {
        let mapper = self.mapper(kind, Phase::List).await?;
        let budget = self.budgets(mapper.as_ref()).update;
        let scope = Scope::new(mapper.as_ref(), Phase::List, budget, cancel);

        let endpoint = mapper.list_endpoint().ok_or_else(|| {
            scope.fail(ErrorCause::Config(ProviderError::InvalidConfig {
                field: "kind".to_string(),
                detail: format!("{kind} cannot be listed"),
            }))
        })?;

        let scope_ref = &scope;
        let items_path = endpoint.items_path;
        let base = &endpoint.request;
        let items = pager::fetch_all(endpoint.pager, |cursor| {
            let request = cursor.apply(base.clone());
            async move {
                let body = self
                    .send(scope_ref, &request, false)
                    .await
                    .map_err(|r| r.cause)?;
                let items = match json_path::search(&body, items_path) {
                    Some(Value::Array(items)) => items.clone(),
                    Some(Value::Null) | None => Vec::new(),
                    Some(_) => {
                        return Err(ErrorCause::Mapping(MappingError::UnexpectedResponse {
                            detail: format!("'{items_path}' is not a list"),
                        }));
                    }
                };
                Ok(Page::new(items))
            }
        })
        .await
        .map_err(|c| scope.fail(c))?;

        let mut observed = Vec::with_capacity(items.len());
        for item in &items {
            let Some(remote_id) = mapper.item_id(item) else {
                log::warn!("skipping {kind} listing item without an id");
                continue;
            };
            let fields = mapper.flatten(item).map_err(|e| scope.fail(e.into()))?;
            observed.push(ObservedState {
                kind: kind.to_string(),
                status: mapper.status_of(&fields),
                remote_id,
                fields,
            });
        }
        log::debug!("Listed {} {kind} resource(s)", observed.len());
        Ok(observed)
    }

    // ===== internals =====

    async fn mapper(&self, kind: &str, phase: Phase) -> CoreResult<Arc<dyn ResourceMapper>> {
        self.ctx
            .mapper(kind)
            .await
            .map_err(|cause| ReconcileError::new(kind, phase, cause))
    }

    fn budgets(&self, mapper: &dyn ResourceMapper) -> Timeouts {
        self.timeouts.resolve(mapper.default_timeouts())
    }

    /// Issue one call and classify the outcome, envelope first.
    async fn send(
        &self,
        scope: &Scope<'_>,
        request: &ApiRequest,
        after_delete: bool,
    ) -> Result<Value, Rejection> {
        let kind = scope.kind();
        log::debug!("{kind}: {}", request.describe());

        let result = tokio::select! {
            () = scope.cancel.cancelled() => return Err(ErrorCause::Cancelled.into()),
            r = timeout_at(scope.deadline, self.ctx.transport.request(request)) => r,
        };
        let response = match result {
            Err(_) => return Err(scope.timed_out(None).into()),
            Ok(Err(e)) => return Err(cause_of(self.ctx.classifier.classify_transport(&e)).into()),
            Ok(Ok(response)) => response,
        };

        let class = if after_delete {
            self.ctx
                .classifier
                .classify_after_delete(kind, response.status, &response.body)
        } else {
            self.ctx
                .classifier
                .classify(kind, response.status, &response.body)
        };
        if class.is_success() {
            return response
                .json(request.service)
                .map_err(|e| ErrorCause::Fatal(e.to_string()).into());
        }

        log::debug!(
            "{kind}: {} rejected with HTTP {}: {}",
            request.describe(),
            response.status,
            sanitize_body(&response.body)
        );
        Err(Rejection {
            cause: cause_of(class),
            code: ApiFault::extract(response.status, &response.body).and_then(|f| f.code),
        })
    }

    /// Read plus optional detail read, flattened.
    async fn observe(
        &self,
        scope: &Scope<'_>,
        remote_id: &str,
        after_delete: bool,
    ) -> Result<Option<ObservedState>, ErrorCause> {
        let mapper = scope.mapper;
        let body = match self
            .send(scope, &mapper.build_read(remote_id), after_delete)
            .await
        {
            Ok(body) => body,
            Err(r) if r.cause.is_not_found() => return Ok(None),
            Err(r) => return Err(r.cause),
        };
        let mut fields = mapper.flatten(&body)?;

        if let Some(request) = mapper.detail_read(remote_id, &fields) {
            let detail = match self.send(scope, &request, after_delete).await {
                Ok(detail) => detail,
                Err(r) if r.cause.is_not_found() => return Ok(None),
                Err(r) => return Err(r.cause),
            };
            mapper.merge_detail(&mut fields, &detail)?;
        }

        Ok(Some(ObservedState {
            kind: scope.kind().to_string(),
            remote_id: remote_id.to_string(),
            status: mapper.status_of(&fields),
            fields,
        }))
    }

    /// Read after a write, on its own [`FINAL_READ_TIMEOUT`] budget.
    async fn require_observed(
        &self,
        scope: &Scope<'_>,
        remote_id: &str,
    ) -> CoreResult<ObservedState> {
        let scope = scope.rebudgeted(FINAL_READ_TIMEOUT);
        self.observe(&scope, remote_id, false)
            .await
            .and_then(|o| o.ok_or(ErrorCause::NotFound))
            .map_err(|c| scope.fail(c))
    }

    /// One status probe for a wait.
    async fn probe(
        &self,
        scope: &Scope<'_>,
        remote_id: &str,
        until_absent: bool,
    ) -> Result<ProbeResult<Option<ObservedState>>, ErrorCause> {
        match self.observe(scope, remote_id, until_absent).await? {
            Some(observed) => {
                let status = observed.status.clone().unwrap_or_default();
                let detail = scope.mapper.failure_detail(&observed.fields);
                Ok(ProbeResult::new(status, Some(observed)).with_detail(detail))
            }
            None if until_absent => Ok(ProbeResult::new(ABSENT_STATUS, None)),
            None => Err(ErrorCause::NotFound),
        }
    }

    /// Wait until `wait` settles; returns the last observed state, `None` once
    /// the resource is gone.
    async fn wait_for(
        &self,
        scope: &Scope<'_>,
        remote_id: &str,
        wait: &StatusWait,
        label: &'static str,
    ) -> CoreResult<Option<ObservedState>> {
        let until_absent = wait.waits_for_absence();
        let budget = scope.deadline.saturating_duration_since(Instant::now());
        log::info!("{} {remote_id}: {label}", scope.kind());

        let outcome = OperationHandle::for_wait(wait, budget, || {
            self.probe(scope, remote_id, until_absent)
        })
        .with_operation_id(format!("{} {remote_id}", scope.kind()))
        .wait(scope.cancel)
        .await;

        match outcome {
            Ok(done) => {
                log::debug!(
                    "{} {remote_id}: {label} done at '{}' after {} probe(s)",
                    scope.kind(),
                    done.status,
                    done.probes
                );
                Ok(done.value)
            }
            Err(e) => {
                let cause = match e {
                    WaitError::FailureStatus { status, detail } => {
                        ErrorCause::FailureStatus { status, detail }
                    }
                    WaitError::Timeout { last_status, .. } => scope.timed_out(last_status),
                    WaitError::Probe(cause) => cause,
                    WaitError::Cancelled => ErrorCause::Cancelled,
                };
                Err(scope.fail(cause).at_step(label))
            }
        }
    }

    /// Run one mapper-declared call and its wait; returns the state the wait
    /// settled on.
    async fn run_transition(
        &self,
        scope: &Scope<'_>,
        remote_id: &str,
        transition: &Transition,
    ) -> CoreResult<Option<ObservedState>> {
        if let Some(request) = &transition.request {
            log::info!("{} {remote_id}: {}", scope.kind(), transition.label);
            match self.send(scope, request, false).await {
                Ok(_) => {}
                Err(Rejection {
                    code: Some(code), ..
                }) if transition.tolerates(&code) => {
                    log::info!(
                        "{} {remote_id}: {} already satisfied ({code})",
                        scope.kind(),
                        transition.label
                    );
                    return Ok(None);
                }
                Err(r) => return Err(scope.fail(r.cause).at_step(transition.label)),
            }
        }
        match &transition.wait {
            Some(wait) => self.wait_for(scope, remote_id, wait, transition.label).await,
            None => Ok(None),
        }
    }

    /// Issue the delete call, reissuing it only while the service answers with
    /// one of the kind's busy codes.
    ///
    /// Returns `false` when the resource was already gone.
    async fn send_delete(&self, scope: &Scope<'_>, request: &ApiRequest) -> CoreResult<bool> {
        let busy_codes = scope.mapper.delete_busy_codes();
        let mut pause = DELETE_RETRY_INITIAL;
        loop {
            let rejection = match self.send(scope, request, false).await {
                Ok(_) => return Ok(true),
                Err(r) => r,
            };
            match rejection {
                Rejection {
                    cause: ErrorCause::NotFound,
                    ..
                } => return Ok(false),
                Rejection {
                    code: Some(code), ..
                } if busy_codes.contains(&code.as_str()) => {
                    let next = Instant::now() + pause;
                    if next >= scope.deadline {
                        return Err(scope
                            .fail(scope.timed_out(None))
                            .at_step("delete"));
                    }
                    log::warn!(
                        "{} delete is busy ({code}), retrying in {pause:?}",
                        scope.kind()
                    );
                    tokio::select! {
                        () = scope.cancel.cancelled() => {
                            return Err(scope.fail(ErrorCause::Cancelled).at_step("delete"));
                        }
                        () = sleep_until(next) => {}
                    }
                    pause = (pause * 2).min(DELETE_RETRY_MAX);
                }
                Rejection { cause, .. } => return Err(scope.fail(cause).at_step("delete")),
            }
        }
    }
}
