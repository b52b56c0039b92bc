//! `cdn_cache_refresh` / `cdn_cache_preheat`: one-shot cache tasks.
//!
//! A task cannot be changed or cancelled once submitted. Every field forces a
//! new task, and deleting one only forgets it locally.

use serde_json::{Map, Value, json};

use crate::resources::ProjectContext;
use crate::resources::common::{copy_observed, copy_present, expect_object, list_field};
use crate::traits::{KindMetadata, ListEndpoint, ResourceMapper, Transition};
use crate::transport::{ApiRequest, Service};
use crate::types::{
    ChangeSet, Fields, MappingError, ObservedState, PagerConfig, ResourceSpec, StatusSets,
    StatusWait, Timeouts,
};

use super::CACHE_TASK_TIMING;

pub const REFRESH_KIND: &str = "cdn_cache_refresh";
pub const PREHEAT_KIND: &str = "cdn_cache_preheat";

const TASK_DONE: &str = "task_done";
const TASK_IN_PROCESS: &str = "task_inprocess";

/// Submitted fields the history endpoint does not report back.
const WRITE_ONLY: &[&str] = &["mode", "zh_url_encode"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheTaskType {
    Refresh,
    Preheat,
}

impl CacheTaskType {
    fn kind(self) -> &'static str {
        match self {
            Self::Refresh => REFRESH_KIND,
            Self::Preheat => PREHEAT_KIND,
        }
    }

    /// Key of the request object and of the id in the create response.
    fn envelope(self) -> &'static str {
        match self {
            Self::Refresh => "refresh_task",
            Self::Preheat => "preheating_task",
        }
    }

    fn path(self) -> &'static str {
        match self {
            Self::Refresh => "/v1.0/cdn/content/refresh-tasks",
            Self::Preheat => "/v1.0/cdn/content/preheating-tasks",
        }
    }

    /// `task_type` filter value of the history listing.
    fn history_type(self) -> &'static str {
        match self {
            Self::Refresh => "refresh",
            Self::Preheat => "preheating",
        }
    }
}

pub struct CacheTaskMapper {
    task_type: CacheTaskType,
    ctx: ProjectContext,
}

impl CacheTaskMapper {
    pub fn new(task_type: CacheTaskType, ctx: ProjectContext) -> Self {
        Self { task_type, ctx }
    }

    fn eps(&self) -> Option<&str> {
        self.ctx.enterprise_project_id.as_deref()
    }

    fn forced_fields(&self) -> &'static [&'static str] {
        match self.task_type {
            CacheTaskType::Refresh => &["type", "mode", "zh_url_encode", "urls"],
            CacheTaskType::Preheat => &["zh_url_encode", "urls"],
        }
    }
}

impl ResourceMapper for CacheTaskMapper {
    fn kind(&self) -> &'static str {
        self.task_type.kind()
    }

    fn metadata(&self) -> KindMetadata {
        KindMetadata {
            kind: self.task_type.kind(),
            service: Service::Cdn,
            description: match self.task_type {
                CacheTaskType::Refresh => "CDN cache refresh task for URLs or directories",
                CacheTaskType::Preheat => "CDN cache preheat task for URLs",
            },
            asynchronous: true,
            listable: true,
            project_scoped: false,
        }
    }

    fn default_timeouts(&self) -> Timeouts {
        Timeouts::minutes(5, 5, 5)
    }

    fn build_create(&self, spec: &ResourceSpec) -> Result<ApiRequest, MappingError> {
        let urls = list_field(spec, "urls")?
            .filter(|u| !u.is_empty())
            .ok_or_else(|| MappingError::MissingField {
                field: "urls".to_string(),
            })?;
        let mut task = Map::new();
        task.insert("urls".into(), Value::Array(urls.clone()));
        if self.task_type == CacheTaskType::Refresh {
            task.insert(
                "type".into(),
                json!(spec.str_field("type").unwrap_or("file")),
            );
            copy_present(&mut task, "mode", spec, "mode");
        }
        copy_present(&mut task, "zh_url_encode", spec, "zh_url_encode");

        let mut body = Map::new();
        body.insert(self.task_type.envelope().to_string(), Value::Object(task));
        Ok(
            ApiRequest::post(Service::Cdn, self.task_type.path(), Value::Object(body))
                .with_optional_query("enterprise_project_id", self.eps()),
        )
    }

    fn created_id_path(&self) -> &'static str {
        self.task_type.envelope()
    }

    fn create_wait(&self) -> Option<StatusWait> {
        Some(StatusWait::new(
            StatusSets::fixed(&[TASK_IN_PROCESS], &[TASK_DONE], &[]),
            CACHE_TASK_TIMING,
        ))
    }

    fn build_read(&self, remote_id: &str) -> ApiRequest {
        ApiRequest::get(
            Service::Cdn,
            format!("/v1.0/cdn/historytasks/{remote_id}/detail"),
        )
        .with_optional_query("enterprise_project_id", self.eps())
    }

    fn flatten(&self, body: &Value) -> Result<Fields, MappingError> {
        expect_object(body, "history task")?;
        let mut fields = Fields::new();
        copy_observed(&mut fields, "id", body, "id");
        copy_observed(&mut fields, "status", body, "status");
        copy_observed(&mut fields, "task_type", body, "task_type");
        if self.task_type == CacheTaskType::Refresh {
            copy_observed(&mut fields, "type", body, "file_type");
        }
        for counter in ["processing", "succeed", "failed", "total"] {
            copy_observed(&mut fields, counter, body, counter);
        }
        copy_observed(&mut fields, "created_at", body, "create_time");
        if let Some(urls) = body.get("urls").and_then(Value::as_array) {
            let urls = urls
                .iter()
                .filter_map(|u| u.get("url").or(Some(u)).filter(|v| v.is_string()).cloned())
                .collect();
            fields.insert("urls".into(), Value::Array(urls));
        }
        Ok(fields)
    }

    fn compare_field(&self, field: &str, _desired: &Value, _observed: &ObservedState) -> Option<bool> {
        WRITE_ONLY.contains(&field).then_some(true)
    }

    fn immutable_fields(&self) -> &'static [&'static str] {
        self.forced_fields()
    }

    fn build_update(
        &self,
        _remote_id: &str,
        _spec: &ResourceSpec,
        changes: &ChangeSet,
    ) -> Result<Vec<Transition>, MappingError> {
        let field = changes
            .top_level_fields()
            .into_iter()
            .next()
            .unwrap_or("urls");
        Err(MappingError::Immutable {
            field: field.to_string(),
        })
    }

    fn build_delete(&self, _remote_id: &str) -> Option<ApiRequest> {
        None
    }

    fn list_endpoint(&self) -> Option<ListEndpoint> {
        Some(ListEndpoint {
            request: ApiRequest::get(Service::Cdn, "/v1.0/cdn/historytasks")
                .with_query("task_type", self.task_type.history_type())
                .with_optional_query("enterprise_project_id", self.eps()),
            items_path: "tasks",
            pager: PagerConfig::PageNumber {
                first_page: 1,
                page_size: 100,
            },
        })
    }
}
