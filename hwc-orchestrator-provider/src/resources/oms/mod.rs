//! Huawei Cloud Object Storage Migration Service kinds
//!
//! Tasks and task groups share the request fragments below: bandwidth windows,
//! CDN source settings, notification config and the credentials a start or
//! retry call has to resend.

pub mod task;
pub mod task_group;

pub use task::MigrationTaskMapper;
pub use task_group::MigrationTaskGroupMapper;

use chrono::{DateTime, NaiveDateTime};
use serde_json::{Map, Value, json};

use crate::resources::ProjectContext;
use crate::resources::common::{copy_present, list_field, member_str, object_field};
use crate::types::{MappingError, ResourceSpec, WaitTiming};

/// Lifecycle waits of tasks and task groups.
pub const OMS_TIMING: WaitTiming = WaitTiming::secs(5, 3);

const MIB: u64 = 1024 * 1024;

/// `migrate_since` wire format (UTC).
const MIGRATE_SINCE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// `bandwidth_policy` list with `max_bandwidth` converted from MB/s to bytes/s.
/// An empty list clears every window.
pub(crate) fn bandwidth_policy_body(spec: &ResourceSpec) -> Result<Option<Value>, MappingError> {
    let Some(windows) = list_field(spec, "bandwidth_policy")? else {
        return Ok(None);
    };
    let mut out = Vec::with_capacity(windows.len());
    for window in windows {
        let invalid = |detail: &str| MappingError::InvalidField {
            field: "bandwidth_policy".to_string(),
            detail: detail.to_string(),
        };
        let window = window
            .as_object()
            .ok_or_else(|| invalid("each window must be an object"))?;
        let mbps = window
            .get("max_bandwidth")
            .and_then(Value::as_u64)
            .ok_or_else(|| invalid("max_bandwidth must be a positive integer (MB/s)"))?;
        let start = member_str(window, "start").ok_or_else(|| invalid("start is required"))?;
        let end = member_str(window, "end").ok_or_else(|| invalid("end is required"))?;
        out.push(json!({
            "max_bandwidth": mbps.saturating_mul(MIB),
            "start": start,
            "end": end,
        }));
    }
    Ok(Some(Value::Array(out)))
}

/// Bandwidth windows from a response, `max_bandwidth` back in MB/s.
pub(crate) fn flatten_bandwidth_policy(body: &Value) -> Option<Value> {
    let windows = body.get("bandwidth_policy")?.as_array()?;
    let windows = windows
        .iter()
        .map(|w| {
            let mbps = match w.get("max_bandwidth") {
                Some(v) => v
                    .as_u64()
                    .map_or_else(|| json!(v.as_f64().unwrap_or(0.0) / 1_048_576.0), |b| json!(b / MIB)),
                None => json!(0),
            };
            json!({
                "max_bandwidth": mbps,
                "start": w.get("start").cloned().unwrap_or(Value::Null),
                "end": w.get("end").cloned().unwrap_or(Value::Null),
            })
        })
        .collect();
    Some(Value::Array(windows))
}

pub(crate) fn source_cdn_body(spec: &ResourceSpec) -> Result<Option<Value>, MappingError> {
    let Some(cdn) = object_field(spec, "source_cdn")? else {
        return Ok(None);
    };
    let mut out = Map::new();
    for key in ["domain", "authentication_key", "protocol", "authentication_type"] {
        if let Some(v) = member_str(cdn, key) {
            out.insert(key.to_string(), json!(v));
        }
    }
    Ok(Some(Value::Object(out)))
}

/// Observable part of `source_cdn`; the authentication key is never returned.
pub(crate) fn flatten_source_cdn(body: &Value) -> Option<Value> {
    let cdn = body.get("source_cdn").filter(|v| v.is_object())?;
    let mut out = Map::new();
    for key in ["domain", "protocol", "authentication_type"] {
        if let Some(v) = cdn.get(key).filter(|v| !v.is_null()) {
            out.insert(key.to_string(), v.clone());
        }
    }
    Some(Value::Object(out))
}

/// `source_cdn` matches when every observable member agrees.
pub(crate) fn source_cdn_matches(desired: &Value, observed: Option<&Value>) -> bool {
    let (Some(desired), Some(observed)) = (desired.as_object(), observed) else {
        return desired.is_null() && observed.is_none();
    };
    ["domain", "protocol", "authentication_type"].iter().all(|key| {
        desired
            .get(*key)
            .is_none_or(|v| observed.get(*key) == Some(v))
    })
}

pub(crate) fn smn_config_body(spec: &ResourceSpec) -> Result<Option<Value>, MappingError> {
    let Some(smn) = object_field(spec, "smn_config")? else {
        return Ok(None);
    };
    let mut out = Map::new();
    if let Some(urn) = member_str(smn, "topic_urn") {
        out.insert("topic_urn".into(), json!(urn));
    }
    out.insert(
        "trigger_conditions".into(),
        smn.get("trigger_conditions").cloned().unwrap_or_else(|| json!([])),
    );
    if let Some(lang) = member_str(smn, "language") {
        out.insert("language".into(), json!(lang));
    }
    Ok(Some(Value::Object(out)))
}

/// `migrate_since` (`YYYY-MM-DD HH:MM:SS`, UTC) as epoch seconds.
pub(crate) fn migrate_since_body(spec: &ResourceSpec) -> Result<Option<i64>, MappingError> {
    let Some(raw) = spec.str_field("migrate_since") else {
        return Ok(None);
    };
    NaiveDateTime::parse_from_str(raw, MIGRATE_SINCE_FORMAT)
        .map(|t| Some(t.and_utc().timestamp()))
        .map_err(|e| MappingError::InvalidField {
            field: "migrate_since".to_string(),
            detail: format!("expected '{MIGRATE_SINCE_FORMAT}': {e}"),
        })
}

pub(crate) fn format_migrate_since(body: &Value) -> Option<Value> {
    let secs = body.get("migrate_since")?.as_i64().filter(|s| *s != 0)?;
    let t = DateTime::from_timestamp(secs, 0)?;
    Some(json!(t.format(MIGRATE_SINCE_FORMAT).to_string()))
}

/// Destination credential, falling back to the provider's own keys.
pub(crate) fn destination_credential(
    spec: &ResourceSpec,
    ctx: &ProjectContext,
    key: &str,
) -> Result<String, MappingError> {
    let fallback = match key {
        "access_key" => ctx.destination_access_key.as_deref(),
        "secret_key" => ctx.destination_secret_key.as_deref(),
        _ => None,
    };
    object_field(spec, "destination_object")?
        .and_then(|dst| member_str(dst, key))
        .or(fallback.filter(|s| !s.is_empty()))
        .map(str::to_string)
        .ok_or_else(|| MappingError::MissingField {
            field: format!("destination_object.{key}"),
        })
}

/// Body of a start or retry call: source keys, destination keys and the CDN
/// authentication key, resent because the service does not keep them.
pub(crate) fn start_body(
    spec: &ResourceSpec,
    ctx: &ProjectContext,
    with_security_tokens: bool,
) -> Result<Value, MappingError> {
    let mut body = Map::new();
    if let Some(src) = object_field(spec, "source_object")? {
        let mut copy = |wire: &str, key: &str| {
            if let Some(v) = member_str(src, key) {
                body.insert(wire.to_string(), json!(v));
            }
        };
        copy("src_ak", "access_key");
        copy("src_sk", "secret_key");
        if with_security_tokens {
            copy("src_security_token", "security_token");
        }
    }
    body.insert(
        "dst_ak".into(),
        json!(destination_credential(spec, ctx, "access_key")?),
    );
    body.insert(
        "dst_sk".into(),
        json!(destination_credential(spec, ctx, "secret_key")?),
    );
    if with_security_tokens {
        if let Some(token) = object_field(spec, "destination_object")?
            .and_then(|dst| member_str(dst, "security_token"))
        {
            body.insert("dst_security_token".into(), json!(token));
        }
    }
    if let Some(key) =
        object_field(spec, "source_cdn")?.and_then(|cdn| member_str(cdn, "authentication_key"))
    {
        body.insert("source_cdn_authentication_key".into(), json!(key));
    }
    Ok(Value::Object(body))
}

/// Options common to task and task group create bodies.
pub(crate) fn common_create_options(
    body: &mut Map<String, Value>,
    spec: &ResourceSpec,
) -> Result<(), MappingError> {
    body.insert("task_type".into(), json!(spec.required_str("type")?));
    body.insert(
        "enable_kms".into(),
        json!(spec.bool_field("enable_kms").unwrap_or(false)),
    );
    body.insert(
        "enable_metadata_migration".into(),
        json!(spec.bool_field("enable_metadata_migration").unwrap_or(false)),
    );
    for field in [
        "description",
        "enable_failed_object_recording",
        "enable_requester_pays",
        "object_overwrite_mode",
        "consistency_check",
        "dst_storage_policy",
    ] {
        copy_present(body, field, spec, field);
    }
    if let Some(policy) = bandwidth_policy_body(spec)?.filter(|p| p.as_array().is_some_and(|a| !a.is_empty())) {
        body.insert("bandwidth_policy".into(), policy);
    }
    if let Some(cdn) = source_cdn_body(spec)? {
        body.insert("source_cdn".into(), cdn);
    }
    if let Some(since) = migrate_since_body(spec)? {
        body.insert("migrate_since".into(), json!(since));
    }
    Ok(())
}

/// Objects to migrate: a list file in a bucket, or explicit key prefixes.
pub(crate) fn insert_object_selection(
    node: &mut Map<String, Value>,
    src: &Map<String, Value>,
    with_list_file_num: bool,
) {
    if let Some(bucket) = member_str(src, "list_file_bucket") {
        let mut list_file = Map::new();
        list_file.insert("obs_bucket".into(), json!(bucket));
        list_file.insert(
            "list_file_key".into(),
            src.get("list_file_key").cloned().unwrap_or(Value::Null),
        );
        if with_list_file_num {
            if let Some(num) = member_str(src, "list_file_num") {
                list_file.insert("list_file_num".into(), json!(num));
            }
        }
        node.insert("list_file".into(), Value::Object(list_file));
        return;
    }
    if let Some(objects) = src.get("object").and_then(Value::as_array) {
        let mut keys: Vec<Value> = objects.iter().filter(|v| v.is_string()).cloned().collect();
        // [""] selects the whole bucket
        if keys.is_empty() {
            keys.push(json!(""));
        }
        node.insert("object_key".into(), Value::Array(keys));
    }
}

/// Copy the listed members of a nested spec object, renaming as given.
pub(crate) fn copy_members(node: &mut Map<String, Value>, src: &Map<String, Value>, pairs: &[(&str, &str)]) {
    for (wire, key) in pairs {
        if let Some(v) = member_str(src, key) {
            node.insert((*wire).to_string(), json!(v));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bandwidth_converts_megabytes() {
        let spec = ResourceSpec::new("oms_migration_task").with_field(
            "bandwidth_policy",
            json!([{"max_bandwidth": 2, "start": "00:00", "end": "12:00"}]),
        );
        assert_eq!(
            bandwidth_policy_body(&spec).unwrap(),
            Some(json!([{"max_bandwidth": 2_097_152, "start": "00:00", "end": "12:00"}]))
        );
        let body = json!({"bandwidth_policy": [{"max_bandwidth": 2_097_152, "start": "00:00", "end": "12:00"}]});
        assert_eq!(
            flatten_bandwidth_policy(&body),
            Some(json!([{"max_bandwidth": 2, "start": "00:00", "end": "12:00"}]))
        );
    }

    #[test]
    fn bandwidth_window_needs_bounds() {
        let spec = ResourceSpec::new("oms_migration_task")
            .with_field("bandwidth_policy", json!([{"max_bandwidth": 2, "start": "00:00"}]));
        assert!(matches!(
            bandwidth_policy_body(&spec),
            Err(MappingError::InvalidField { .. })
        ));
    }

    #[test]
    fn migrate_since_is_utc_epoch() {
        let spec = ResourceSpec::new("oms_migration_task")
            .with_field("migrate_since", json!("2024-01-01 00:00:00"));
        assert_eq!(migrate_since_body(&spec).unwrap(), Some(1_704_067_200));
        assert_eq!(
            format_migrate_since(&json!({"migrate_since": 1_704_067_200})),
            Some(json!("2024-01-01 00:00:00"))
        );
        assert_eq!(format_migrate_since(&json!({"migrate_since": 0})), None);

        let bad = ResourceSpec::new("oms_migration_task").with_field("migrate_since", json!("yesterday"));
        assert!(migrate_since_body(&bad).is_err());
    }

    #[test]
    fn destination_keys_fall_back_to_context() {
        let ctx = ProjectContext {
            destination_access_key: Some("ctx-ak".into()),
            destination_secret_key: Some("ctx-sk".into()),
            ..ProjectContext::default()
        };
        let spec = ResourceSpec::new("oms_migration_task")
            .with_field("destination_object", json!({"access_key": "own-ak"}));
        assert_eq!(destination_credential(&spec, &ctx, "access_key").unwrap(), "own-ak");
        assert_eq!(destination_credential(&spec, &ctx, "secret_key").unwrap(), "ctx-sk");
        assert!(destination_credential(&spec, &ProjectContext::default(), "secret_key").is_err());
    }

    #[test]
    fn start_body_resends_credentials() {
        let ctx = ProjectContext {
            destination_access_key: Some("dak".into()),
            destination_secret_key: Some("dsk".into()),
            ..ProjectContext::default()
        };
        let spec = ResourceSpec::new("oms_migration_task")
            .with_field(
                "source_object",
                json!({"access_key": "sak", "secret_key": "ssk", "security_token": "tok"}),
            )
            .with_field("source_cdn", json!({"domain": "d", "authentication_key": "k"}));
        assert_eq!(
            start_body(&spec, &ctx, true).unwrap(),
            json!({
                "src_ak": "sak", "src_sk": "ssk", "src_security_token": "tok",
                "dst_ak": "dak", "dst_sk": "dsk",
                "source_cdn_authentication_key": "k"
            })
        );
        let without = start_body(&spec, &ctx, false).unwrap();
        assert!(without.get("src_security_token").is_none());
    }

    #[test]
    fn source_cdn_ignores_write_only_key() {
        let desired = json!({"domain": "d", "protocol": "https", "authentication_key": "secret"});
        let observed = json!({"domain": "d", "protocol": "https", "authentication_type": "NONE"});
        assert!(source_cdn_matches(&desired, Some(&observed)));
        assert!(!source_cdn_matches(&json!({"domain": "e"}), Some(&observed)));
        assert!(!source_cdn_matches(&desired, None));
    }

    #[test]
    fn object_selection_prefers_list_file() {
        let src = json!({"list_file_bucket": "lists", "list_file_key": "a.txt", "object": ["x/"]});
        let mut node = Map::new();
        insert_object_selection(&mut node, src.as_object().unwrap(), false);
        assert_eq!(
            Value::Object(node),
            json!({"list_file": {"obs_bucket": "lists", "list_file_key": "a.txt"}})
        );

        let src = json!({"object": []});
        let mut node = Map::new();
        insert_object_selection(&mut node, src.as_object().unwrap(), true);
        assert_eq!(Value::Object(node), json!({"object_key": [""]}));
    }
}
