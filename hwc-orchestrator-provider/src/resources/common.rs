//! Helpers shared by the resource mappers

use serde_json::{Map, Value};

use crate::types::{Fields, MappingError, ResourceSpec};

/// Copy `field` from the spec into `body` under `wire`, skipping absent, null
/// and empty-string values.
pub(crate) fn copy_present(body: &mut Map<String, Value>, wire: &str, spec: &ResourceSpec, field: &str) {
    match spec.get(field) {
        None | Some(Value::Null) => {}
        Some(Value::String(s)) if s.is_empty() => {}
        Some(v) => {
            body.insert(wire.to_string(), v.clone());
        }
    }
}

/// Copy `wire` from a response object into observed fields under `field`.
/// Absent and null values are left out.
pub(crate) fn copy_observed(fields: &mut Fields, field: &str, body: &Value, wire: &str) {
    if let Some(v) = body.get(wire).filter(|v| !v.is_null()) {
        fields.insert(field.to_string(), v.clone());
    }
}

/// The object a response must be, or a mapping error naming what was expected.
pub(crate) fn expect_object<'a>(body: &'a Value, what: &str) -> Result<&'a Map<String, Value>, MappingError> {
    body.as_object()
        .ok_or_else(|| MappingError::UnexpectedResponse {
            detail: format!("{what} is not a JSON object"),
        })
}

/// An optional object-valued field of the spec.
pub(crate) fn object_field<'a>(
    spec: &'a ResourceSpec,
    field: &str,
) -> Result<Option<&'a Map<String, Value>>, MappingError> {
    match spec.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(_) => Err(MappingError::InvalidField {
            field: field.to_string(),
            detail: "expected an object".to_string(),
        }),
    }
}

/// An optional list-valued field of the spec.
pub(crate) fn list_field<'a>(
    spec: &'a ResourceSpec,
    field: &str,
) -> Result<Option<&'a Vec<Value>>, MappingError> {
    match spec.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(items)) => Ok(Some(items)),
        Some(_) => Err(MappingError::InvalidField {
            field: field.to_string(),
            detail: "expected a list".to_string(),
        }),
    }
}

/// Non-empty string member of a nested object.
pub(crate) fn member_str<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    map.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn copy_present_skips_empty() {
        let spec = ResourceSpec::new("k")
            .with_field("a", json!("x"))
            .with_field("b", json!(""))
            .with_field("c", json!(null))
            .with_field("d", json!(false));
        let mut body = Map::new();
        for (wire, field) in [("wa", "a"), ("wb", "b"), ("wc", "c"), ("wd", "d"), ("we", "e")] {
            copy_present(&mut body, wire, &spec, field);
        }
        assert_eq!(Value::Object(body), json!({"wa": "x", "wd": false}));
    }

    #[test]
    fn copy_observed_skips_null() {
        let mut fields = Fields::new();
        let body = json!({"task_type": "object", "description": null});
        copy_observed(&mut fields, "type", &body, "task_type");
        copy_observed(&mut fields, "description", &body, "description");
        assert_eq!(Value::Object(fields), json!({"type": "object"}));
    }

    #[test]
    fn typed_field_accessors() {
        let spec = ResourceSpec::new("k")
            .with_field("obj", json!({"region": "cn-north-4"}))
            .with_field("list", json!([1]))
            .with_field("bad", json!(3));
        assert!(matches!(object_field(&spec, "obj"), Ok(Some(_))));
        assert!(matches!(object_field(&spec, "missing"), Ok(None)));
        assert!(object_field(&spec, "bad").is_err());
        assert!(matches!(list_field(&spec, "list"), Ok(Some(v)) if v.len() == 1));
        assert!(list_field(&spec, "obj").is_err());
        let obj = object_field(&spec, "obj").ok().flatten();
        assert_eq!(obj.and_then(|m| member_str(m, "region")), Some("cn-north-4"));
    }
}
