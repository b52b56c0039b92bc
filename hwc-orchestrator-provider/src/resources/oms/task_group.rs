//! `oms_migration_task_group`: a batch of migration tasks driven together.
//!
//! Status codes: 0 waiting, 1 creating, 2 monitoring, 3 paused, 4 failed,
//! 6 completed, 7 pausing, 8 deleting, 9 deleted.

use serde_json::{Map, Value, json};

use crate::resources::ProjectContext;
use crate::resources::codes::{
    OMS_DELETE_BUSY, OMS_NOT_FOUND_CODES, OMS_RETRYABLE_CODES, OMS_STOP_TOLERATED,
};
use crate::resources::common::{copy_observed, expect_object, object_field};
use crate::traits::{ErrorCodes, KindMetadata, ListEndpoint, ResourceMapper, Transition};
use crate::transport::{ApiRequest, Service};
use crate::types::{
    ABSENT_STATUS, ChangeSet, Fields, MappingError, ObservedState, PagerConfig, ResourceSpec, StatusSets,
    StatusWait,
};
use crate::utils::json_path;

use super::{
    OMS_TIMING, bandwidth_policy_body, common_create_options, copy_members, destination_credential,
    flatten_bandwidth_policy, flatten_source_cdn, format_migrate_since, insert_object_selection,
    source_cdn_matches, start_body,
};

pub const KIND: &str = "oms_migration_task_group";

const CREATING: &str = "1";
const MONITORING: &str = "2";
const PAUSED: &str = "3";
const FAILED: &str = "4";
const COMPLETED: &str = "6";
const PAUSING: &str = "7";

const WRITE_ONLY: &[&str] = &[
    "source_object",
    "destination_object",
    "enable_metadata_migration",
    "dst_storage_policy",
];

/// Requested run state of the group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Start,
    Stop,
    Retry,
}

impl Action {
    fn parse(value: &Value) -> Result<Self, MappingError> {
        match value.as_str() {
            Some("start") => Ok(Self::Start),
            Some("stop") => Ok(Self::Stop),
            Some("retry") => Ok(Self::Retry),
            _ => Err(MappingError::InvalidField {
                field: "action".to_string(),
                detail: format!("expected start, stop or retry, got {value}"),
            }),
        }
    }

    /// Whether a group in `status` already reflects this action.
    fn satisfied_by(self, status: Option<&str>) -> bool {
        match self {
            Self::Stop => status.is_some_and(|s| [PAUSED, COMPLETED, PAUSING].contains(&s)),
            Self::Start => !status.is_some_and(|s| [PAUSED, FAILED, PAUSING].contains(&s)),
            Self::Retry => status != Some(FAILED),
        }
    }
}

pub struct MigrationTaskGroupMapper {
    project_id: String,
    ctx: ProjectContext,
}

impl MigrationTaskGroupMapper {
    pub fn new(project_id: impl Into<String>, ctx: ProjectContext) -> Self {
        Self {
            project_id: project_id.into(),
            ctx,
        }
    }

    fn groups_path(&self) -> String {
        format!("/v2/{}/taskgroups", self.project_id)
    }

    fn group_path(&self, remote_id: &str) -> String {
        format!("/v2/{}/taskgroups/{remote_id}", self.project_id)
    }

    fn started_wait() -> StatusWait {
        StatusWait::new(
            StatusSets::fixed(&["0", CREATING], &[MONITORING, COMPLETED], &[FAILED]),
            OMS_TIMING,
        )
    }

    fn stopped_wait() -> StatusWait {
        StatusWait::new(
            StatusSets::fixed(&[PAUSING], &[PAUSED, COMPLETED], &[FAILED]),
            OMS_TIMING,
        )
    }

    fn stop(&self, remote_id: &str) -> Transition {
        Transition::call(
            "stop",
            ApiRequest::put(
                Service::Oms,
                format!("{}/stop", self.group_path(remote_id)),
                json!({}),
            ),
        )
        .then_wait(Self::stopped_wait())
    }

    fn action(&self, remote_id: &str, spec: &ResourceSpec, action: Action) -> Result<Transition, MappingError> {
        let verb = match action {
            Action::Stop => return Ok(self.stop(remote_id)),
            Action::Start => "start",
            Action::Retry => "retry",
        };
        Ok(Transition::call(
            verb,
            ApiRequest::put(
                Service::Oms,
                format!("{}/{verb}", self.group_path(remote_id)),
                start_body(spec, &self.ctx, false)?,
            ),
        )
        .then_wait(Self::started_wait()))
    }

    fn source_node(spec: &ResourceSpec) -> Result<Value, MappingError> {
        let src = object_field(spec, "source_object")?.ok_or_else(|| MappingError::MissingField {
            field: "source_object".to_string(),
        })?;
        let mut node = Map::new();
        copy_members(
            &mut node,
            src,
            &[
                ("cloud_type", "data_source"),
                ("region", "region"),
                ("ak", "access_key"),
                ("sk", "secret_key"),
                ("app_id", "app_id"),
                ("bucket", "bucket"),
            ],
        );
        insert_object_selection(&mut node, src, false);
        Ok(Value::Object(node))
    }

    fn destination_node(&self, spec: &ResourceSpec) -> Result<Value, MappingError> {
        let dst = object_field(spec, "destination_object")?.ok_or_else(|| {
            MappingError::MissingField {
                field: "destination_object".to_string(),
            }
        })?;
        let mut node = Map::new();
        copy_members(
            &mut node,
            dst,
            &[
                ("region", "region"),
                ("cloud_type", "data_source"),
                ("bucket", "bucket"),
                ("save_prefix", "save_prefix"),
            ],
        );
        node.insert(
            "ak".into(),
            json!(destination_credential(spec, &self.ctx, "access_key")?),
        );
        node.insert(
            "sk".into(),
            json!(destination_credential(spec, &self.ctx, "secret_key")?),
        );
        Ok(Value::Object(node))
    }
}

impl ResourceMapper for MigrationTaskGroupMapper {
    fn kind(&self) -> &'static str {
        KIND
    }

    fn metadata(&self) -> KindMetadata {
        KindMetadata {
            kind: KIND,
            service: Service::Oms,
            description: "OMS migration task group (prefix or list-file batch)",
            asynchronous: true,
            listable: true,
            project_scoped: true,
        }
    }

    fn error_codes(&self) -> ErrorCodes {
        ErrorCodes {
            not_found: OMS_NOT_FOUND_CODES,
            gone_after_delete: &[],
            retryable: OMS_RETRYABLE_CODES,
        }
    }

    fn build_create(&self, spec: &ResourceSpec) -> Result<ApiRequest, MappingError> {
        if let Some(action) = spec.get("action") {
            Action::parse(action)?;
        }
        let mut body = Map::new();
        common_create_options(&mut body, spec)?;
        body.insert("src_node".into(), Self::source_node(spec)?);
        body.insert("dst_node".into(), self.destination_node(spec)?);
        Ok(ApiRequest::post(
            Service::Oms,
            self.groups_path(),
            Value::Object(body),
        ))
    }

    fn created_id_path(&self) -> &'static str {
        "group_id"
    }

    fn create_wait(&self) -> Option<StatusWait> {
        Some(Self::started_wait())
    }

    fn after_create(
        &self,
        remote_id: &str,
        spec: &ResourceSpec,
    ) -> Result<Vec<Transition>, MappingError> {
        match spec.get("action").map(Action::parse).transpose()? {
            Some(Action::Stop) => Ok(vec![self.stop(remote_id)]),
            _ => Ok(Vec::new()),
        }
    }

    fn build_read(&self, remote_id: &str) -> ApiRequest {
        ApiRequest::get(Service::Oms, self.group_path(remote_id))
    }

    fn flatten(&self, body: &Value) -> Result<Fields, MappingError> {
        expect_object(body, "migration task group")?;
        let mut fields = Fields::new();
        copy_observed(&mut fields, "id", body, "group_id");
        copy_observed(&mut fields, "type", body, "task_type");
        for field in [
            "status",
            "description",
            "enable_kms",
            "object_overwrite_mode",
            "consistency_check",
            "enable_requester_pays",
            "enable_failed_object_recording",
            "total_time",
            "total_num",
            "success_num",
            "fail_num",
            "total_size",
            "complete_size",
            "error_reason",
        ] {
            copy_observed(&mut fields, field, body, field);
        }
        if let Some(policy) = flatten_bandwidth_policy(body) {
            fields.insert("bandwidth_policy".into(), policy);
        }
        if let Some(cdn) = flatten_source_cdn(body) {
            fields.insert("source_cdn".into(), cdn);
        }
        if let Some(since) = format_migrate_since(body) {
            fields.insert("migrate_since".into(), since);
        }
        Ok(fields)
    }

    fn failure_detail(&self, fields: &Fields) -> Option<String> {
        let reason = fields.get("error_reason")?;
        let code = json_path::search_string(reason, "error_code").unwrap_or_default();
        let msg = json_path::search_string(reason, "error_msg").unwrap_or_default();
        Some(format!("error_code is: {code}, error_msg is: {msg}"))
    }

    fn immutable_fields(&self) -> &'static [&'static str] {
        &[
            "type",
            "description",
            "enable_kms",
            "object_overwrite_mode",
            "consistency_check",
            "enable_requester_pays",
            "enable_failed_object_recording",
            "source_cdn",
            "migrate_since",
        ]
    }

    fn compare_field(&self, field: &str, desired: &Value, observed: &ObservedState) -> Option<bool> {
        match field {
            "action" => Some(
                Action::parse(desired)
                    .is_ok_and(|a| a.satisfied_by(observed.status.as_deref())),
            ),
            "source_cdn" => Some(source_cdn_matches(desired, observed.get("source_cdn"))),
            f if WRITE_ONLY.contains(&f) => Some(true),
            _ => None,
        }
    }

    fn build_update(
        &self,
        remote_id: &str,
        spec: &ResourceSpec,
        changes: &ChangeSet,
    ) -> Result<Vec<Transition>, MappingError> {
        let mut steps = Vec::new();
        if changes.touches("bandwidth_policy") {
            let policy = bandwidth_policy_body(spec)?.unwrap_or_else(|| json!([]));
            steps.push(Transition::call(
                "update_bandwidth_policy",
                ApiRequest::put(
                    Service::Oms,
                    format!("{}/update", self.group_path(remote_id)),
                    json!({ "bandwidth_policy": policy }),
                ),
            ));
        }
        if changes.touches("action") {
            let action = spec
                .get("action")
                .ok_or_else(|| MappingError::MissingField {
                    field: "action".to_string(),
                })
                .and_then(Action::parse)?;
            steps.push(self.action(remote_id, spec, action)?);
        }
        Ok(steps)
    }

    fn pre_delete(&self, observed: &ObservedState) -> Vec<Transition> {
        let stop = || self.stop(&observed.remote_id).tolerating(OMS_STOP_TOLERATED);
        match observed.status.as_deref() {
            // a group still creating can neither be stopped nor deleted; it may
            // also finish while creating, so the next step depends on where it lands
            Some(CREATING) => vec![Transition::wait_only("wait_started", Self::started_wait())],
            Some(MONITORING) => vec![stop()],
            Some(PAUSING) => vec![Transition::wait_only("wait_stopped", Self::stopped_wait())],
            _ => Vec::new(),
        }
    }

    fn build_delete(&self, remote_id: &str) -> Option<ApiRequest> {
        Some(ApiRequest::delete(Service::Oms, self.group_path(remote_id)))
    }

    fn delete_busy_codes(&self) -> &'static [&'static str] {
        OMS_DELETE_BUSY
    }

    fn deletion_wait(&self) -> Option<StatusWait> {
        Some(StatusWait::new(
            StatusSets::fixed(&["8", "9"], &[ABSENT_STATUS], &[]),
            OMS_TIMING,
        ))
    }

    fn list_endpoint(&self) -> Option<ListEndpoint> {
        Some(ListEndpoint {
            request: ApiRequest::get(Service::Oms, self.groups_path()),
            items_path: "taskgroups",
            pager: PagerConfig::OffsetLimit {
                start: 0,
                limit: 100,
            },
        })
    }

    fn item_id(&self, item: &Value) -> Option<String> {
        json_path::search_string(item, "group_id")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Method;
    use crate::types::{Change, StatusClass};

    fn mapper() -> MigrationTaskGroupMapper {
        MigrationTaskGroupMapper::new(
            "proj",
            ProjectContext {
                project_id: Some("proj".into()),
                destination_access_key: Some("dak".into()),
                destination_secret_key: Some("dsk".into()),
                ..ProjectContext::default()
            },
        )
    }

    fn spec() -> ResourceSpec {
        ResourceSpec::new(KIND)
            .with_field("type", json!("PREFIX"))
            .with_field(
                "source_object",
                json!({
                    "data_source": "Aliyun", "region": "cn-hangzhou", "bucket": "src",
                    "access_key": "sak", "secret_key": "ssk", "object": ["a/", "b/"]
                }),
            )
            .with_field(
                "destination_object",
                json!({"region": "cn-north-4", "bucket": "dst"}),
            )
    }

    fn observed(status: &str) -> ObservedState {
        ObservedState {
            kind: KIND.into(),
            remote_id: "g-1".into(),
            status: Some(status.into()),
            fields: Fields::new(),
        }
    }

    #[test]
    fn create_body_and_id() {
        let req = mapper().build_create(&spec()).unwrap();
        assert_eq!(req.path, "/v2/proj/taskgroups");
        let body = req.body.unwrap();
        assert_eq!(body["src_node"]["object_key"], json!(["a/", "b/"]));
        assert_eq!(
            body["dst_node"],
            json!({"region": "cn-north-4", "bucket": "dst", "ak": "dak", "sk": "dsk"})
        );
        assert!(body.get("smn_config").is_none());
        assert_eq!(
            mapper().extract_id(&json!({"group_id": "g-1"})),
            Some("g-1".into())
        );
    }

    #[test]
    fn invalid_action_rejected_before_create() {
        let spec = spec().with_field("action", json!("pause"));
        assert!(matches!(
            mapper().build_create(&spec),
            Err(MappingError::InvalidField { .. })
        ));
    }

    #[test]
    fn stop_action_after_create() {
        let spec = spec().with_field("action", json!("stop"));
        let steps = mapper().after_create("g-1", &spec).unwrap();
        assert_eq!(steps.len(), 1);
        let req = steps[0].request.as_ref().unwrap();
        assert_eq!(req.method, Method::Put);
        assert_eq!(req.path, "/v2/proj/taskgroups/g-1/stop");
        let wait = steps[0].wait.as_ref().unwrap();
        assert_eq!(wait.sets.classify("6"), StatusClass::Target);

        let start = spec.clone().with_field("action", json!("start"));
        assert!(mapper().after_create("g-1", &start).unwrap().is_empty());
    }

    #[test]
    fn failure_detail_from_error_reason() {
        let body = json!({
            "group_id": "g-1", "status": 4,
            "error_reason": {"error_code": "OMS.1201", "error_msg": "source unreachable"}
        });
        let fields = mapper().flatten(&body).unwrap();
        assert_eq!(mapper().status_of(&fields), Some("4".into()));
        assert_eq!(
            mapper().failure_detail(&fields),
            Some("error_code is: OMS.1201, error_msg is: source unreachable".into())
        );
    }

    #[test]
    fn action_compares_against_status() {
        let m = mapper();
        assert_eq!(m.compare_field("action", &json!("stop"), &observed("3")), Some(true));
        assert_eq!(m.compare_field("action", &json!("stop"), &observed("2")), Some(false));
        assert_eq!(m.compare_field("action", &json!("start"), &observed("2")), Some(true));
        assert_eq!(m.compare_field("action", &json!("start"), &observed("3")), Some(false));
        assert_eq!(m.compare_field("action", &json!("retry"), &observed("4")), Some(false));
        assert_eq!(m.compare_field("action", &json!("retry"), &observed("6")), Some(true));
    }

    #[test]
    fn retry_action_resends_keys() {
        let mut changes = ChangeSet::new();
        changes.insert("action", Change::Set(json!("retry")));
        let spec = spec().with_field("action", json!("retry"));
        let steps = mapper().build_update("g-1", &spec, &changes).unwrap();
        assert_eq!(steps.len(), 1);
        let req = steps[0].request.as_ref().unwrap();
        assert_eq!(req.path, "/v2/proj/taskgroups/g-1/retry");
        assert_eq!(
            req.body,
            Some(json!({"src_ak": "sak", "src_sk": "ssk", "dst_ak": "dak", "dst_sk": "dsk"}))
        );
    }

    #[test]
    fn bandwidth_update_path() {
        let mut changes = ChangeSet::new();
        changes.insert("bandwidth_policy", Change::Clear(json!([])));
        let steps = mapper().build_update("g-1", &spec(), &changes).unwrap();
        assert_eq!(
            steps[0].request.as_ref().map(|r| r.path.as_str()),
            Some("/v2/proj/taskgroups/g-1/update")
        );
    }

    #[test]
    fn pre_delete_by_status() {
        let m = mapper();
        let creating: Vec<_> = m.pre_delete(&observed("1")).iter().map(|t| t.label).collect();
        assert_eq!(creating, vec!["wait_started"]);
        let running = m.pre_delete(&observed("2"));
        assert!(running[0].tolerates("OMS.0066"));
        assert_eq!(m.pre_delete(&observed("7"))[0].label, "wait_stopped");
        assert!(m.pre_delete(&observed("6")).is_empty());
    }

    #[test]
    fn deletion_waits_for_absence() {
        let wait = mapper().deletion_wait().unwrap();
        assert!(wait.waits_for_absence());
        assert_eq!(wait.sets.classify("8"), StatusClass::Pending);
    }
}
