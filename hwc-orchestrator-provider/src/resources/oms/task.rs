//! `oms_migration_task`: a single object storage migration task.
//!
//! Status codes: 0 waiting, 1 executing, 2 monitoring, 3 paused, 4 failed,
//! 5 succeeded, 7 pausing.

use serde_json::{Map, Value, json};

use crate::resources::ProjectContext;
use crate::resources::codes::{
    OMS_DELETE_BUSY, OMS_NOT_FOUND_CODES, OMS_RETRYABLE_CODES, OMS_STOP_TOLERATED,
};
use crate::resources::common::{copy_observed, copy_present, expect_object, object_field};
use crate::traits::{ErrorCodes, KindMetadata, ListEndpoint, ResourceMapper, Transition};
use crate::transport::{ApiRequest, Service};
use crate::types::{
    ChangeSet, Fields, MappingError, ObservedState, PagerConfig, ResourceSpec, StatusSets,
    StatusWait,
};

use super::{
    OMS_TIMING, bandwidth_policy_body, common_create_options, copy_members, destination_credential,
    flatten_bandwidth_policy, flatten_source_cdn, format_migrate_since, insert_object_selection,
    smn_config_body, source_cdn_matches, start_body,
};

pub const KIND: &str = "oms_migration_task";

const MONITORING: &str = "2";
const PAUSED: &str = "3";
const PAUSING: &str = "7";

/// Statuses in which the task is not moving data.
const HALTED: &[&str] = &[PAUSED, PAUSING];

/// Submitted fields the task detail never returns.
const WRITE_ONLY: &[&str] = &[
    "source_object",
    "destination_object",
    "smn_config",
    "enable_metadata_migration",
    "enable_requester_pays",
    "task_priority",
    "consistency_check",
    "object_overwrite_mode",
    "dst_storage_policy",
];

pub struct MigrationTaskMapper {
    project_id: String,
    ctx: ProjectContext,
}

impl MigrationTaskMapper {
    pub fn new(project_id: impl Into<String>, ctx: ProjectContext) -> Self {
        Self {
            project_id: project_id.into(),
            ctx,
        }
    }

    fn tasks_path(&self) -> String {
        format!("/v2/{}/tasks", self.project_id)
    }

    fn task_path(&self, remote_id: &str) -> String {
        format!("/v2/{}/tasks/{remote_id}", self.project_id)
    }

    fn started_wait() -> StatusWait {
        StatusWait::new(
            StatusSets::fixed(&["0", "1"], &[MONITORING, "5"], &["4"]),
            OMS_TIMING,
        )
    }

    fn stopped_wait() -> StatusWait {
        StatusWait::new(StatusSets::fixed(&["0", PAUSING], &[PAUSED], &["4"]), OMS_TIMING)
    }

    fn stop(&self, remote_id: &str) -> Transition {
        Transition::call(
            "stop",
            ApiRequest::post(
                Service::Oms,
                format!("{}/stop", self.task_path(remote_id)),
                json!({}),
            ),
        )
        .then_wait(Self::stopped_wait())
    }

    fn start(&self, remote_id: &str, spec: &ResourceSpec) -> Result<Transition, MappingError> {
        Ok(Transition::call(
            "start",
            ApiRequest::post(
                Service::Oms,
                format!("{}/start", self.task_path(remote_id)),
                start_body(spec, &self.ctx, true)?,
            ),
        )
        .then_wait(Self::started_wait()))
    }

    fn source_node(spec: &ResourceSpec) -> Result<Option<Value>, MappingError> {
        let Some(src) = object_field(spec, "source_object")? else {
            return Ok(None);
        };
        let mut node = Map::new();
        copy_members(
            &mut node,
            src,
            &[
                ("cloud_type", "data_source"),
                ("region", "region"),
                ("ak", "access_key"),
                ("sk", "secret_key"),
                ("security_token", "security_token"),
                ("app_id", "app_id"),
                ("bucket", "bucket"),
                ("json_auth_file", "json_auth_file"),
            ],
        );
        insert_object_selection(&mut node, src, true);
        Ok(Some(Value::Object(node)))
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
                ("bucket", "bucket"),
                ("security_token", "security_token"),
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

impl ResourceMapper for MigrationTaskMapper {
    fn kind(&self) -> &'static str {
        KIND
    }

    fn metadata(&self) -> KindMetadata {
        KindMetadata {
            kind: KIND,
            service: Service::Oms,
            description: "OMS object storage migration task",
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
        let mut body = Map::new();
        common_create_options(&mut body, spec)?;
        for field in ["enable_restore", "task_priority"] {
            copy_present(&mut body, field, spec, field);
        }
        if let Some(src) = Self::source_node(spec)? {
            body.insert("src_node".into(), src);
        }
        body.insert("dst_node".into(), self.destination_node(spec)?);
        if let Some(smn) = smn_config_body(spec)? {
            body.insert("smn_config".into(), smn);
        }
        Ok(ApiRequest::post(
            Service::Oms,
            self.tasks_path(),
            Value::Object(body),
        ))
    }

    fn create_wait(&self) -> Option<StatusWait> {
        Some(Self::started_wait())
    }

    fn after_create(
        &self,
        remote_id: &str,
        spec: &ResourceSpec,
    ) -> Result<Vec<Transition>, MappingError> {
        if spec.bool_field("start_task") == Some(false) {
            return Ok(vec![self.stop(remote_id)]);
        }
        Ok(Vec::new())
    }

    fn build_read(&self, remote_id: &str) -> ApiRequest {
        ApiRequest::get(Service::Oms, self.task_path(remote_id))
    }

    fn flatten(&self, body: &Value) -> Result<Fields, MappingError> {
        expect_object(body, "migration task")?;
        let mut fields = Fields::new();
        copy_observed(&mut fields, "id", body, "id");
        copy_observed(&mut fields, "name", body, "name");
        copy_observed(&mut fields, "type", body, "task_type");
        copy_observed(&mut fields, "status", body, "status");
        for field in [
            "description",
            "enable_kms",
            "enable_restore",
            "enable_failed_object_recording",
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

    fn immutable_fields(&self) -> &'static [&'static str] {
        &[
            "type",
            "description",
            "enable_kms",
            "enable_restore",
            "enable_failed_object_recording",
            "source_cdn",
            "migrate_since",
        ]
    }

    fn compare_field(&self, field: &str, desired: &Value, observed: &ObservedState) -> Option<bool> {
        match field {
            "start_task" => {
                let halted = observed
                    .status
                    .as_deref()
                    .is_some_and(|s| HALTED.contains(&s));
                Some(desired.as_bool().unwrap_or(true) != halted)
            }
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
                    format!("{}/bandwidth-policy", self.task_path(remote_id)),
                    json!({ "bandwidth_policy": policy }),
                ),
            ));
        }
        if changes.touches("start_task") {
            if spec.bool_field("start_task").unwrap_or(true) {
                steps.push(self.start(remote_id, spec)?);
            } else {
                steps.push(self.stop(remote_id));
            }
        }
        Ok(steps)
    }

    fn pre_delete(&self, observed: &ObservedState) -> Vec<Transition> {
        match observed.status.as_deref() {
            Some(MONITORING) => vec![self.stop(&observed.remote_id).tolerating(OMS_STOP_TOLERATED)],
            Some(PAUSING) => vec![Transition::wait_only("wait_stopped", Self::stopped_wait())],
            _ => Vec::new(),
        }
    }

    fn build_delete(&self, remote_id: &str) -> Option<ApiRequest> {
        Some(ApiRequest::delete(Service::Oms, self.task_path(remote_id)))
    }

    fn delete_busy_codes(&self) -> &'static [&'static str] {
        OMS_DELETE_BUSY
    }

    fn list_endpoint(&self) -> Option<ListEndpoint> {
        Some(ListEndpoint {
            request: ApiRequest::get(Service::Oms, self.tasks_path()),
            items_path: "tasks",
            pager: PagerConfig::OffsetLimit {
                start: 0,
                limit: 100,
            },
        })
    }
}
