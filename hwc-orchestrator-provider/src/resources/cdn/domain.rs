//! `cdn_domain`: an accelerated domain and its full configuration.

use serde_json::{Map, Value, json};

use crate::resources::ProjectContext;
use crate::resources::codes::{CDN_DOMAIN_GONE_CODES, CDN_DOMAIN_NOT_FOUND_CODES};
use crate::resources::common::{copy_observed, copy_present, expect_object, list_field, object_field};
use crate::traits::{ErrorCodes, KindMetadata, ListEndpoint, ResourceMapper, Transition};
use crate::transport::{ApiRequest, Service};
use crate::types::{
    ABSENT_STATUS, ChangeSet, Fields, MappingError, ObservedState, PagerConfig, ResourceSpec,
    StatusSets, StatusWait, Timeouts,
};

use super::CDN_TIMING;

pub const KIND: &str = "cdn_domain";

const ONLINE: &str = "online";
const OFFLINE: &str = "offline";

/// Fields the full-configuration endpoint can change in place.
const UPDATABLE: &[&str] = &["sources", "type", "service_area", "configs"];

/// Priority the configuration API uses for a primary / standby origin.
const PRIMARY_PRIORITY: i64 = 70;
const STANDBY_PRIORITY: i64 = 30;

pub struct CdnDomainMapper {
    ctx: ProjectContext,
}

impl CdnDomainMapper {
    pub fn new(ctx: ProjectContext) -> Self {
        Self { ctx }
    }

    fn eps(&self) -> Option<&str> {
        self.ctx.enterprise_project_id.as_deref()
    }

    fn online_wait() -> StatusWait {
        StatusWait::new(
            StatusSets::fixed(
                &["configuring", "checking"],
                &[ONLINE],
                &[OFFLINE, "configure_failed", "check_failed", "deleting"],
            ),
            CDN_TIMING,
        )
    }

    fn offline_wait() -> StatusWait {
        StatusWait::new(
            StatusSets::fixed(
                &[ONLINE, "configuring", "checking"],
                &[OFFLINE],
                &["configure_failed", "check_failed", "deleting"],
            ),
            CDN_TIMING,
        )
    }

    /// `PUT` of the full-configuration endpoint.
    ///
    /// The endpoint rejects an empty `configs`, so business type and service
    /// area are always sent.
    fn configs_request(&self, spec: &ResourceSpec, configs: Map<String, Value>) -> Result<ApiRequest, MappingError> {
        let name = spec.required_str("name")?;
        let mut body = configs;
        copy_present(&mut body, "business_type", spec, "type");
        copy_present(&mut body, "service_area", spec, "service_area");
        Ok(ApiRequest::put(
            Service::Cdn,
            format!(
                "/v1.1/cdn/configuration/domains/{}/configs",
                urlencoding::encode(name)
            ),
            json!({ "configs": body }),
        )
        .with_optional_query("enterprise_project_id", self.eps()))
    }
}

/// Convert create-style origins into the configuration API's shape.
fn config_sources(sources: &[Value]) -> Result<Vec<Value>, MappingError> {
    sources
        .iter()
        .enumerate()
        .map(|(i, source)| {
            let src = source.as_object().ok_or_else(|| MappingError::InvalidField {
                field: format!("sources.{i}"),
                detail: "expected an object".to_string(),
            })?;
            let addr = src
                .get("ip_or_domain")
                .and_then(Value::as_str)
                .ok_or_else(|| MappingError::MissingField {
                    field: format!("sources.{i}.ip_or_domain"),
                })?;
            let primary = src.get("active_standby").and_then(Value::as_i64).unwrap_or(1) == 1;
            let mut out = Map::new();
            out.insert("origin_addr".into(), json!(addr));
            if let Some(t) = src.get("origin_type") {
                out.insert("origin_type".into(), t.clone());
            }
            out.insert(
                "priority".into(),
                json!(if primary { PRIMARY_PRIORITY } else { STANDBY_PRIORITY }),
            );
            for extra in ["http_port", "https_port", "host_name", "obs_web_hosting_status"] {
                if let Some(v) = src.get(extra) {
                    out.insert(extra.into(), v.clone());
                }
            }
            Ok(Value::Object(out))
        })
        .collect()
}

impl ResourceMapper for CdnDomainMapper {
    fn kind(&self) -> &'static str {
        KIND
    }

    fn metadata(&self) -> KindMetadata {
        KindMetadata {
            kind: KIND,
            service: Service::Cdn,
            description: "CDN accelerated domain with origins and full configuration",
            asynchronous: true,
            listable: true,
            project_scoped: false,
        }
    }

    fn error_codes(&self) -> ErrorCodes {
        ErrorCodes {
            not_found: CDN_DOMAIN_NOT_FOUND_CODES,
            gone_after_delete: CDN_DOMAIN_GONE_CODES,
            retryable: &[],
        }
    }

    fn default_timeouts(&self) -> Timeouts {
        Timeouts::minutes(30, 30, 20)
    }

    fn build_create(&self, spec: &ResourceSpec) -> Result<ApiRequest, MappingError> {
        let mut domain = Map::new();
        domain.insert("domain_name".into(), json!(spec.required_str("name")?));
        domain.insert("business_type".into(), json!(spec.required_str("type")?));
        copy_present(&mut domain, "service_area", spec, "service_area");
        let sources = list_field(spec, "sources")?.ok_or_else(|| MappingError::MissingField {
            field: "sources".to_string(),
        })?;
        domain.insert("sources".into(), Value::Array(sources.clone()));
        if let Some(eps) = self.eps() {
            domain.insert("enterprise_project_id".into(), json!(eps));
        }
        Ok(ApiRequest::post(
            Service::Cdn,
            "/v1.0/cdn/domains",
            json!({ "domain": domain }),
        ))
    }

    fn created_id_path(&self) -> &'static str {
        "domain.id"
    }

    fn create_wait(&self) -> Option<StatusWait> {
        Some(Self::online_wait())
    }

    fn after_create(&self, _remote_id: &str, spec: &ResourceSpec) -> Result<Vec<Transition>, MappingError> {
        let Some(configs) = object_field(spec, "configs")? else {
            return Ok(Vec::new());
        };
        let request = self.configs_request(spec, configs.clone())?;
        Ok(vec![
            Transition::call("apply_configs", request).then_wait(Self::online_wait()),
        ])
    }

    fn build_read(&self, remote_id: &str) -> ApiRequest {
        ApiRequest::get(Service::Cdn, format!("/v1.0/cdn/domains/{remote_id}/detail"))
            .with_optional_query("enterprise_project_id", self.eps())
    }

    fn flatten(&self, body: &Value) -> Result<Fields, MappingError> {
        let domain = body.get("domain").unwrap_or(body);
        expect_object(domain, "domain")?;
        let mut fields = Fields::new();
        copy_observed(&mut fields, "id", domain, "id");
        copy_observed(&mut fields, "name", domain, "domain_name");
        copy_observed(&mut fields, "type", domain, "business_type");
        copy_observed(&mut fields, "service_area", domain, "service_area");
        copy_observed(&mut fields, "cname", domain, "cname");
        copy_observed(&mut fields, "status", domain, "domain_status");
        copy_observed(&mut fields, "sources", domain, "sources");
        Ok(fields)
    }

    fn detail_read(&self, _remote_id: &str, fields: &Fields) -> Option<ApiRequest> {
        let name = fields.get("name").and_then(Value::as_str)?;
        Some(
            ApiRequest::get(
                Service::Cdn,
                format!(
                    "/v1.1/cdn/configuration/domains/{}/configs",
                    urlencoding::encode(name)
                ),
            )
            .with_optional_query("enterprise_project_id", self.eps()),
        )
    }

    fn merge_detail(&self, fields: &mut Fields, body: &Value) -> Result<(), MappingError> {
        let configs = body
            .get("configs")
            .ok_or_else(|| MappingError::UnexpectedResponse {
                detail: "configs is not found in the response".to_string(),
            })?;
        fields.insert("configs".into(), configs.clone());
        Ok(())
    }

    fn immutable_fields(&self) -> &'static [&'static str] {
        &["name"]
    }

    fn build_update(
        &self,
        _remote_id: &str,
        spec: &ResourceSpec,
        changes: &ChangeSet,
    ) -> Result<Vec<Transition>, MappingError> {
        if let Some(field) = changes
            .top_level_fields()
            .into_iter()
            .find(|f| !UPDATABLE.contains(f))
        {
            return Err(MappingError::InvalidField {
                field: field.to_string(),
                detail: "cannot be updated in place".to_string(),
            });
        }

        let mut configs = Map::new();
        if changes.touches("sources") {
            let sources = list_field(spec, "sources")?.map_or_else(Vec::new, Clone::clone);
            configs.insert("sources".into(), Value::Array(config_sources(&sources)?));
        }
        if changes.touches("configs") {
            // each changed block is replaced as a whole
            let desired = object_field(spec, "configs")?;
            for key in changes.paths().filter_map(|p| p.strip_prefix("configs.")) {
                let block = key.split('.').next().unwrap_or(key);
                if configs.contains_key(block) {
                    continue;
                }
                if let Some(v) = desired.and_then(|d| d.get(block)) {
                    configs.insert(block.to_string(), v.clone());
                }
            }
            if let Some(change) = changes.get("configs") {
                if let Value::Object(whole) = change.value() {
                    for (k, v) in whole {
                        configs.entry(k.clone()).or_insert_with(|| v.clone());
                    }
                }
            }
        }

        let request = self.configs_request(spec, configs)?;
        Ok(vec![
            Transition::call("update_configs", request).then_wait(Self::online_wait()),
        ])
    }

    fn pre_delete(&self, observed: &ObservedState) -> Vec<Transition> {
        if !observed.status_is(ONLINE) {
            return Vec::new();
        }
        let disable = ApiRequest::put(
            Service::Cdn,
            format!("/v1.0/cdn/domains/{}/disable", observed.remote_id),
            json!({}),
        )
        .with_optional_query("enterprise_project_id", self.eps());
        vec![Transition::call("disable", disable).then_wait(Self::offline_wait())]
    }

    fn build_delete(&self, remote_id: &str) -> Option<ApiRequest> {
        Some(
            ApiRequest::delete(Service::Cdn, format!("/v1.0/cdn/domains/{remote_id}"))
                .with_optional_query("enterprise_project_id", self.eps()),
        )
    }

    fn deletion_wait(&self) -> Option<StatusWait> {
        Some(StatusWait::new(
            StatusSets::fixed(
                &["deleting", OFFLINE, "configuring", "checking"],
                &[ABSENT_STATUS],
                &[ONLINE, "configure_failed", "check_failed"],
            ),
            CDN_TIMING,
        ))
    }

    fn list_endpoint(&self) -> Option<ListEndpoint> {
        Some(ListEndpoint {
            request: ApiRequest::get(Service::Cdn, "/v1.0/cdn/domains")
                .with_optional_query("enterprise_project_id", self.eps()),
            items_path: "domains",
            pager: PagerConfig::PageNumber {
                first_page: 1,
                page_size: 100,
            },
        })
    }
}
