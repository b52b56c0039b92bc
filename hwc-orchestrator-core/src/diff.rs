//! Desired vs observed comparison
//!
//! Only fields the desired state mentions take part: an absent or `null`
//! desired field means "leave alone". An explicit empty value (`[]`, `{}`,
//! `""`) means "clear" and only differs when the remote still has something.

use serde_json::Value;

use hwc_orchestrator_provider::{
    Change, ChangeSet, MappingError, ObservedState, ResourceMapper, ResourceSpec,
};

/// Fields of `spec` that differ from `observed`, keyed by dotted path.
///
/// Objects are compared member by member so a change set only carries the
/// leaves that moved. Lists are compared whole; object elements match when
/// every desired member matches (the remote echoes extra defaults).
pub fn compute_changes(
    mapper: &dyn ResourceMapper,
    spec: &ResourceSpec,
    observed: &ObservedState,
) -> ChangeSet {
    let mut changes = ChangeSet::new();
    for (field, desired) in &spec.fields {
        if desired.is_null() {
            continue;
        }
        match mapper.compare_field(field, desired, observed) {
            Some(true) => {}
            Some(false) => changes.insert(field.as_str(), Change::Set(desired.clone())),
            None => diff_value(field, desired, observed.fields.get(field), &mut changes),
        }
    }
    changes
}

/// First changed top-level field the mapper declares immutable.
pub fn check_immutable(
    mapper: &dyn ResourceMapper,
    changes: &ChangeSet,
) -> Result<(), MappingError> {
    let immutable = mapper.immutable_fields();
    match changes
        .top_level_fields()
        .into_iter()
        .find(|field| immutable.contains(field))
    {
        Some(field) => Err(MappingError::Immutable {
            field: field.to_string(),
        }),
        None => Ok(()),
    }
}

fn diff_value(path: &str, desired: &Value, observed: Option<&Value>, changes: &mut ChangeSet) {
    if desired.is_null() {
        return;
    }
    if is_empty(desired) {
        if observed.is_some_and(|o| !is_empty(o) && !o.is_null()) {
            changes.insert(path, Change::Clear(desired.clone()));
        }
        return;
    }
    match (desired, observed) {
        (Value::Object(wanted), Some(Value::Object(current))) => {
            for (key, value) in wanted {
                diff_value(&format!("{path}.{key}"), value, current.get(key), changes);
            }
        }
        (_, Some(current)) if values_match(desired, current) => {}
        _ => changes.insert(path, Change::Set(desired.clone())),
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

fn values_match(desired: &Value, observed: &Value) -> bool {
    match (desired, observed) {
        (Value::Null, _) => true,
        (Value::Object(wanted), Value::Object(current)) => wanted
            .iter()
            .all(|(k, v)| current.get(k).map_or(v.is_null(), |c| values_match(v, c))),
        (Value::Array(wanted), Value::Array(current)) => {
            wanted.len() == current.len()
                && wanted.iter().zip(current).all(|(w, c)| values_match(w, c))
        }
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        // Some endpoints echo numeric settings as strings and vice versa.
        (Value::Number(n), Value::String(s)) | (Value::String(s), Value::Number(n)) => {
            n.to_string() == *s
        }
        _ => desired == observed,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use hwc_orchestrator_provider::{
        ApiRequest, Fields, KindMetadata, Service, Transition,
    };

    use super::*;

    struct Widget;

    impl ResourceMapper for Widget {
        fn kind(&self) -> &'static str {
            "widget"
        }

        fn metadata(&self) -> KindMetadata {
            KindMetadata {
                kind: "widget",
                service: Service::Cdn,
                description: "test widget",
                asynchronous: false,
                listable: false,
                project_scoped: false,
            }
        }

        fn build_create(&self, _spec: &ResourceSpec) -> Result<ApiRequest, MappingError> {
            Ok(ApiRequest::post(Service::Cdn, "/widgets", json!({})))
        }

        fn build_read(&self, remote_id: &str) -> ApiRequest {
            ApiRequest::get(Service::Cdn, format!("/widgets/{remote_id}"))
        }

        fn flatten(&self, body: &Value) -> Result<Fields, MappingError> {
            Ok(body.as_object().cloned().unwrap_or_default())
        }

        fn immutable_fields(&self) -> &'static [&'static str] {
            &["name"]
        }

        fn compare_field(&self, field: &str, _desired: &Value, observed: &ObservedState) -> Option<bool> {
            match field {
                "secret" => Some(true),
                "running" => Some(observed.status_is("running")),
                _ => None,
            }
        }

        fn build_update(
            &self,
            _remote_id: &str,
            _spec: &ResourceSpec,
            _changes: &ChangeSet,
        ) -> Result<Vec<Transition>, MappingError> {
            Ok(Vec::new())
        }

        fn build_delete(&self, _remote_id: &str) -> Option<ApiRequest> {
            None
        }
    }

    fn observed(fields: Value, status: &str) -> ObservedState {
        ObservedState {
            kind: "widget".into(),
            remote_id: "w1".into(),
            status: Some(status.into()),
            fields: fields.as_object().cloned().unwrap(),
        }
    }

    fn spec(fields: Value) -> ResourceSpec {
        ResourceSpec {
            kind: "widget".into(),
            fields: fields.as_object().cloned().unwrap(),
            remote_id: Some("w1".into()),
        }
    }

    #[test]
    fn identical_state_has_no_changes() {
        let fields = json!({
            "name": "a",
            "port": 80,
            "sources": [{"ip": "1.1.1.1", "weight": 1}],
            "configs": {"https": {"http2": "on"}}
        });
        let changes = compute_changes(&Widget, &spec(fields.clone()), &observed(fields, "online"));
        assert!(changes.is_empty());
    }

    #[test]
    fn absent_and_null_fields_are_left_alone() {
        let changes = compute_changes(
            &Widget,
            &spec(json!({"remark": null})),
            &observed(json!({"remark": "x", "port": 80}), "online"),
        );
        assert!(changes.is_empty());
    }

    #[test]
    fn nested_objects_diff_by_leaf() {
        let changes = compute_changes(
            &Widget,
            &spec(json!({"configs": {"https": {"http2": "on"}, "ipv6": "off"}})),
            &observed(
                json!({"configs": {"https": {"http2": "off", "cert": "c"}, "ipv6": "off"}}),
                "online",
            ),
        );
        assert_eq!(changes.paths().collect::<Vec<_>>(), vec!["configs.https.http2"]);
        assert_eq!(changes.get("configs.https.http2"), Some(&Change::Set(json!("on"))));
    }

    #[test]
    fn empty_desired_clears_only_when_observed_has_content() {
        let changes = compute_changes(
            &Widget,
            &spec(json!({"tags": [], "remark": "", "extra": {}})),
            &observed(json!({"tags": ["a"], "remark": ""}), "online"),
        );
        assert_eq!(changes.paths().collect::<Vec<_>>(), vec!["tags"]);
        assert_eq!(changes.get("tags"), Some(&Change::Clear(json!([]))));
    }

    #[test]
    fn list_elements_use_subset_matching() {
        let desired = spec(json!({"sources": [{"ip": "1.1.1.1"}]}));
        let same = observed(
            json!({"sources": [{"ip": "1.1.1.1", "weight": 50, "active": 1}]}),
            "online",
        );
        assert!(compute_changes(&Widget, &desired, &same).is_empty());

        let longer = observed(
            json!({"sources": [{"ip": "1.1.1.1"}, {"ip": "2.2.2.2"}]}),
            "online",
        );
        let changes = compute_changes(&Widget, &desired, &longer);
        assert_eq!(
            changes.get("sources"),
            Some(&Change::Set(json!([{"ip": "1.1.1.1"}])))
        );
    }

    #[test]
    fn numbers_compare_by_value() {
        let changes = compute_changes(
            &Widget,
            &spec(json!({"ratio": 1.0, "port": 80, "ttl": "300"})),
            &observed(json!({"ratio": 1, "port": 80, "ttl": 300}), "online"),
        );
        assert!(changes.is_empty());
    }

    #[test]
    fn mapper_comparison_overrides_structure() {
        let changes = compute_changes(
            &Widget,
            &spec(json!({"secret": "s3cret", "running": true})),
            &observed(json!({}), "stopped"),
        );
        assert_eq!(changes.paths().collect::<Vec<_>>(), vec!["running"]);
    }

    #[test]
    fn missing_observed_field_is_set() {
        let changes = compute_changes(
            &Widget,
            &spec(json!({"configs": {"ipv6": "on"}})),
            &observed(json!({}), "online"),
        );
        assert_eq!(
            changes.get("configs"),
            Some(&Change::Set(json!({"ipv6": "on"})))
        );
    }

    #[test]
    fn immutable_change_is_rejected() {
        let changes = compute_changes(
            &Widget,
            &spec(json!({"name": "b", "port": 81})),
            &observed(json!({"name": "a", "port": 80}), "online"),
        );
        assert_eq!(
            check_immutable(&Widget, &changes),
            Err(MappingError::Immutable {
                field: "name".into()
            })
        );

        let ok = compute_changes(
            &Widget,
            &spec(json!({"port": 81})),
            &observed(json!({"name": "a", "port": 80}), "online"),
        );
        assert_eq!(check_immutable(&Widget, &ok), Ok(()));
    }
}
