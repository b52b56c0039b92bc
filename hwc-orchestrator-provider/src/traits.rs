use serde::Serialize;
use serde_json::Value;

use crate::transport::{ApiRequest, Service};
use crate::types::{
    ChangeSet, Fields, MappingError, ObservedState, PagerConfig, ResourceSpec, StatusWait,
    Timeouts,
};
use crate::utils::json_path;

/// Error codes a kind wants classified specially.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ErrorCodes {
    /// Envelope codes meaning "this resource does not exist".
    pub not_found: &'static [&'static str],
    /// Extra codes meaning "gone", only honoured while waiting for a deletion.
    pub gone_after_delete: &'static [&'static str],
    /// Envelope codes worth retrying (in addition to the global table).
    pub retryable: &'static [&'static str],
}

/// One mapper-declared remote call plus the status wait that follows it.
///
/// A transition without a request only waits (e.g. a task already stopping).
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// Short step name for logs and errors (`disable`, `stop`, `update_configs`).
    pub label: &'static str,
    pub request: Option<ApiRequest>,
    pub wait: Option<StatusWait>,
    /// Error codes meaning "already in the requested state": the call counts as
    /// done and its wait is skipped.
    pub tolerated_codes: &'static [&'static str],
}

impl Transition {
    pub fn call(label: &'static str, request: ApiRequest) -> Self {
        Self {
            label,
            request: Some(request),
            wait: None,
            tolerated_codes: &[],
        }
    }

    pub fn wait_only(label: &'static str, wait: StatusWait) -> Self {
        Self {
            label,
            request: None,
            wait: Some(wait),
            tolerated_codes: &[],
        }
    }

    #[must_use]
    pub fn then_wait(mut self, wait: StatusWait) -> Self {
        self.wait = Some(wait);
        self
    }

    #[must_use]
    pub fn tolerating(mut self, codes: &'static [&'static str]) -> Self {
        self.tolerated_codes = codes;
        self
    }

    pub fn tolerates(&self, code: &str) -> bool {
        self.tolerated_codes.contains(&code)
    }
}

/// How to drain a kind's listing endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct ListEndpoint {
    /// Base request; the pager adds its cursor parameters.
    pub request: ApiRequest,
    /// Dotted path of the item array in each page body.
    pub items_path: &'static str,
    pub pager: PagerConfig,
}

/// Static description of a resource kind, for listings and help output.
#[derive(Debug, Clone, Serialize)]
pub struct KindMetadata {
    pub kind: &'static str,
    pub service: Service,
    pub description: &'static str,
    /// Whether create starts an asynchronous operation the reconciler waits on.
    pub asynchronous: bool,
    pub listable: bool,
    /// Whether the kind needs a project id in its paths.
    pub project_scoped: bool,
}

/// Stateless field mapper for one resource kind.
///
/// Mappers only build requests and decode bodies. They never perform I/O and
/// never interpret error envelopes.
pub trait ResourceMapper: Send + Sync {
    fn kind(&self) -> &'static str;

    fn metadata(&self) -> KindMetadata;

    fn error_codes(&self) -> ErrorCodes {
        ErrorCodes::default()
    }

    fn default_timeouts(&self) -> Timeouts {
        Timeouts::default()
    }

    // ---- create ----

    fn build_create(&self, spec: &ResourceSpec) -> Result<ApiRequest, MappingError>;

    /// Dotted path of the new identifier in the create response.
    fn created_id_path(&self) -> &'static str {
        "id"
    }

    /// Pull the remote id out of a create response.
    fn extract_id(&self, body: &Value) -> Option<String> {
        json_path::search_string(body, self.created_id_path())
    }

    /// Wait to run after the create call returned an id.
    fn create_wait(&self) -> Option<StatusWait> {
        None
    }

    /// Transitions to run once the created resource settled.
    fn after_create(
        &self,
        _remote_id: &str,
        _spec: &ResourceSpec,
    ) -> Result<Vec<Transition>, MappingError> {
        Ok(Vec::new())
    }

    // ---- read ----

    fn build_read(&self, remote_id: &str) -> ApiRequest;

    /// Decode a read response into observed fields.
    fn flatten(&self, body: &Value) -> Result<Fields, MappingError>;

    /// Second read issued after the first succeeded, for kinds whose state is
    /// split across endpoints.
    fn detail_read(&self, _remote_id: &str, _fields: &Fields) -> Option<ApiRequest> {
        None
    }

    /// Fold the body of [`detail_read`](Self::detail_read) into the observed fields.
    fn merge_detail(&self, _fields: &mut Fields, _body: &Value) -> Result<(), MappingError> {
        Ok(())
    }

    /// Lifecycle status of an observed resource.
    fn status_of(&self, fields: &Fields) -> Option<String> {
        fields.get("status").and_then(json_path::scalar_to_string)
    }

    /// Explanation the remote attached to a failure status, if any.
    fn failure_detail(&self, _fields: &Fields) -> Option<String> {
        None
    }

    // ---- update ----

    /// Fields that cannot change after creation.
    fn immutable_fields(&self) -> &'static [&'static str] {
        &[]
    }

    /// Decide whether a top-level desired field is already satisfied, for fields
    /// that are not echoed back verbatim (write-only secrets, action switches
    /// derived from the status). `None` means compare structurally.
    fn compare_field(&self, _field: &str, _desired: &Value, _observed: &ObservedState) -> Option<bool> {
        None
    }

    /// Ordered steps that apply a non-empty change set.
    fn build_update(
        &self,
        remote_id: &str,
        spec: &ResourceSpec,
        changes: &ChangeSet,
    ) -> Result<Vec<Transition>, MappingError>;

    // ---- delete ----

    /// Steps required before the resource can be deleted, given its current state.
    ///
    /// A plan ending in a wait-only step is planned again from the state that
    /// wait settled on.
    fn pre_delete(&self, _observed: &ObservedState) -> Vec<Transition> {
        Vec::new()
    }

    /// The delete call, or `None` when deletion is purely local.
    fn build_delete(&self, remote_id: &str) -> Option<ApiRequest>;

    /// Envelope codes meaning "busy, delete again later". The delete call is
    /// reissued only for these; every other rejection goes to the caller.
    fn delete_busy_codes(&self) -> &'static [&'static str] {
        &[]
    }

    /// Wait for the resource to disappear after the delete call.
    fn deletion_wait(&self) -> Option<StatusWait> {
        None
    }

    // ---- list ----

    fn list_endpoint(&self) -> Option<ListEndpoint> {
        None
    }

    /// Remote id of one listing item.
    fn item_id(&self, item: &Value) -> Option<String> {
        json_path::search_string(item, "id")
    }
}
