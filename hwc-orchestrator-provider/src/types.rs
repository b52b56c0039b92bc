use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::transport::ApiRequest;
use crate::utils::json_path;

/// Flattened field map shared by desired and observed state.
pub type Fields = Map<String, Value>;

/// Status reported by a deletion probe once the resource is gone.
///
/// Never produced by the remote API; deletion waits list it as their only target.
pub const ABSENT_STATUS: &str = "<absent>";

// ============ Desired / Observed State ============

/// Desired-state document for one resource instance.
///
/// The reconciler only ever borrows it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSpec {
    /// Resource kind, e.g. `cdn_domain`.
    pub kind: String,
    /// Field name → value, in the kind's field-name space.
    #[serde(default)]
    pub fields: Fields,
    /// Identifier assigned by the remote service on a previous create.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,
}

impl ResourceSpec {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            fields: Fields::new(),
            remote_id: None,
        }
    }

    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    #[must_use]
    pub fn with_remote_id(mut self, remote_id: impl Into<String>) -> Self {
        self.remote_id = Some(remote_id.into());
        self
    }

    /// Dotted-path lookup into the fields.
    pub fn get(&self, path: &str) -> Option<&Value> {
        json_path::search_map(&self.fields, path)
    }

    /// String field, `None` when absent or empty.
    pub fn str_field(&self, path: &str) -> Option<&str> {
        self.get(path)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// Like [`str_field`](Self::str_field) but reports a missing field.
    pub fn required_str(&self, path: &str) -> Result<&str, MappingError> {
        self.str_field(path).ok_or_else(|| MappingError::MissingField {
            field: path.to_string(),
        })
    }

    pub fn bool_field(&self, path: &str) -> Option<bool> {
        self.get(path).and_then(Value::as_bool)
    }
}

/// Last-fetched snapshot of a remote resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservedState {
    pub kind: String,
    pub remote_id: String,
    /// Remote lifecycle status, when the kind has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    pub fields: Fields,
}

impl ObservedState {
    pub fn get(&self, path: &str) -> Option<&Value> {
        json_path::search_map(&self.fields, path)
    }

    pub fn status_is(&self, status: &str) -> bool {
        self.status.as_deref() == Some(status)
    }
}

// ============ Change Set ============

/// One differing field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "value", rename_all = "lowercase")]
pub enum Change {
    /// Set the field to this value.
    Set(Value),
    /// Clear the field; carries the explicit empty value to send (`[]`, `{}`, `""` or `null`).
    Clear(Value),
}

impl Change {
    /// The value to put on the wire.
    pub fn value(&self) -> &Value {
        match self {
            Self::Set(v) | Self::Clear(v) => v,
        }
    }

    pub fn is_clear(&self) -> bool {
        matches!(self, Self::Clear(_))
    }
}

/// Field paths whose desired value differs from the observed one.
///
/// Keys are dotted paths (`configs.https`). Iteration order is lexicographic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet {
    changes: BTreeMap<String, Change>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, change: Change) {
        self.changes.insert(path.into(), change);
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn get(&self, path: &str) -> Option<&Change> {
        self.changes.get(path)
    }

    /// Whether `field` itself or anything beneath it changed.
    pub fn touches(&self, field: &str) -> bool {
        self.changes
            .keys()
            .any(|path| path == field || is_beneath(path, field))
    }

    /// Top-level field names that changed, deduplicated.
    pub fn top_level_fields(&self) -> BTreeSet<&str> {
        self.changes
            .keys()
            .map(|path| path.split('.').next().unwrap_or(path.as_str()))
            .collect()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.changes.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Change)> {
        self.changes.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Nested JSON object containing only the changed paths.
    pub fn to_patch(&self) -> Value {
        let mut root = Map::new();
        for (path, change) in &self.changes {
            json_path::insert(&mut root, path, change.value().clone());
        }
        Value::Object(root)
    }

    /// Changes beneath `prefix`, with the prefix stripped. `None` when nothing changed there.
    pub fn patch_under(&self, prefix: &str) -> Option<Map<String, Value>> {
        let mut root = Map::new();
        for (path, change) in &self.changes {
            if let Some(rest) = path
                .strip_prefix(prefix)
                .and_then(|r| r.strip_prefix('.'))
            {
                json_path::insert(&mut root, rest, change.value().clone());
            }
        }
        (!root.is_empty()).then_some(root)
    }
}

fn is_beneath(path: &str, field: &str) -> bool {
    path.strip_prefix(field)
        .is_some_and(|rest| rest.starts_with('.'))
}

// ============ Status Sets & Timing ============

/// Where a status token falls for one wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Pending,
    Target,
    Failure,
}

/// A status appeared in more than one set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("status '{status}' is listed in both the {first} and {second} sets")]
pub struct OverlappingStatus {
    pub status: String,
    pub first: &'static str,
    pub second: &'static str,
}

/// Pairwise-disjoint pending / target / failure status sets.
///
/// Statuses in none of the sets are treated as pending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSets {
    pending: BTreeSet<String>,
    target: BTreeSet<String>,
    failure: BTreeSet<String>,
}

impl StatusSets {
    pub fn new<P, T, F>(pending: P, target: T, failure: F) -> Result<Self, OverlappingStatus>
    where
        P: IntoIterator,
        P::Item: Into<String>,
        T: IntoIterator,
        T::Item: Into<String>,
        F: IntoIterator,
        F::Item: Into<String>,
    {
        let sets = Self {
            pending: pending.into_iter().map(Into::into).collect(),
            target: target.into_iter().map(Into::into).collect(),
            failure: failure.into_iter().map(Into::into).collect(),
        };
        sets.validate()?;
        Ok(sets)
    }

    /// Sets for a deletion wait: the only target is [`ABSENT_STATUS`].
    pub fn until_absent<P, F>(pending: P, failure: F) -> Result<Self, OverlappingStatus>
    where
        P: IntoIterator,
        P::Item: Into<String>,
        F: IntoIterator,
        F::Item: Into<String>,
    {
        Self::new(pending, [ABSENT_STATUS], failure)
    }

    /// Sets built from a mapper's constant status tables.
    pub fn fixed(pending: &[&str], target: &[&str], failure: &[&str]) -> Self {
        let to_set = |s: &[&str]| s.iter().map(|v| (*v).to_string()).collect();
        let sets = Self {
            pending: to_set(pending),
            target: to_set(target),
            failure: to_set(failure),
        };
        debug_assert!(sets.validate().is_ok(), "overlapping status tables");
        sets
    }

    pub fn validate(&self) -> Result<(), OverlappingStatus> {
        let pairs = [
            (&self.pending, "pending", &self.target, "target"),
            (&self.pending, "pending", &self.failure, "failure"),
            (&self.target, "target", &self.failure, "failure"),
        ];
        for (a, first, b, second) in pairs {
            if let Some(status) = a.intersection(b).next() {
                return Err(OverlappingStatus {
                    status: status.clone(),
                    first,
                    second,
                });
            }
        }
        Ok(())
    }

    pub fn classify(&self, status: &str) -> StatusClass {
        if self.target.contains(status) {
            StatusClass::Target
        } else if self.failure.contains(status) {
            StatusClass::Failure
        } else {
            StatusClass::Pending
        }
    }

    /// Whether `status` is listed explicitly (in any set).
    pub fn is_known(&self, status: &str) -> bool {
        self.pending.contains(status) || self.target.contains(status) || self.failure.contains(status)
    }

    pub fn pending(&self) -> &BTreeSet<String> {
        &self.pending
    }

    pub fn target(&self) -> &BTreeSet<String> {
        &self.target
    }

    pub fn failure(&self) -> &BTreeSet<String> {
        &self.failure
    }
}

/// Initial delay and interval between status probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitTiming {
    pub initial_delay: Duration,
    pub poll_interval: Duration,
}

impl WaitTiming {
    pub const fn new(initial_delay: Duration, poll_interval: Duration) -> Self {
        Self {
            initial_delay,
            poll_interval,
        }
    }

    pub const fn secs(initial_delay: u64, poll_interval: u64) -> Self {
        Self::new(
            Duration::from_secs(initial_delay),
            Duration::from_secs(poll_interval),
        )
    }
}

/// A status wait a mapper asks the reconciler to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusWait {
    pub sets: StatusSets,
    pub timing: WaitTiming,
}

impl StatusWait {
    pub fn new(sets: StatusSets, timing: WaitTiming) -> Self {
        Self { sets, timing }
    }

    /// Whether this wait ends when the resource disappears.
    pub fn waits_for_absence(&self) -> bool {
        self.sets.target.contains(ABSENT_STATUS)
    }
}

/// Per-operation time budgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeouts {
    pub create: Duration,
    pub update: Duration,
    pub delete: Duration,
}

impl Timeouts {
    pub const fn minutes(create: u64, update: u64, delete: u64) -> Self {
        Self {
            create: Duration::from_secs(create * 60),
            update: Duration::from_secs(update * 60),
            delete: Duration::from_secs(delete * 60),
        }
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self::minutes(10, 10, 10)
    }
}

// ============ Pagination ============

/// Listing idiom of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "style", rename_all = "snake_case")]
pub enum PagerConfig {
    /// `offset` / `limit` query parameters; offsets start at `start`.
    OffsetLimit { start: u32, limit: u32 },
    /// `page_number` / `page_size`; pages are numbered from `first_page`.
    PageNumber { first_page: u32, page_size: u32 },
}

impl PagerConfig {
    /// Cursor for the first request.
    pub fn first_cursor(self) -> PageCursor {
        match self {
            Self::OffsetLimit { start, limit } => PageCursor::Offset {
                offset: start,
                limit,
            },
            Self::PageNumber {
                first_page,
                page_size,
            } => PageCursor::Number {
                page: first_page,
                page_size,
            },
        }
    }

    /// Cursor following `cursor` after a page of `received` items,
    /// or `None` when the listing is exhausted.
    pub fn next_cursor(self, cursor: PageCursor, received: usize) -> Option<PageCursor> {
        if received == 0 {
            return None;
        }
        match cursor {
            PageCursor::Offset { offset, limit } => {
                let full = u32::try_from(received).is_ok_and(|n| n >= limit);
                full.then(|| PageCursor::Offset {
                    offset: offset.saturating_add(limit),
                    limit,
                })
            }
            PageCursor::Number { page, page_size } => Some(PageCursor::Number {
                page: page.saturating_add(1),
                page_size,
            }),
        }
    }
}

/// Position of one page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageCursor {
    Offset { offset: u32, limit: u32 },
    Number { page: u32, page_size: u32 },
}

impl PageCursor {
    /// Add this cursor's query parameters to a listing request.
    #[must_use]
    pub fn apply(self, request: ApiRequest) -> ApiRequest {
        match self {
            Self::Offset { offset, limit } => request
                .with_query("offset", offset)
                .with_query("limit", limit),
            Self::Number { page, page_size } => request
                .with_query("page_number", page)
                .with_query("page_size", page_size),
        }
    }
}

/// One fetched slice of a listing.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Set when the endpoint says there is nothing further.
    pub end: bool,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self { items, end: false }
    }

    pub fn last(items: Vec<T>) -> Self {
        Self { items, end: true }
    }
}

// ============ Mapping Errors ============

/// A desired-state document or response body could not be mapped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MappingError {
    #[error("missing required field '{field}'")]
    MissingField { field: String },

    #[error("field '{field}' is invalid: {detail}")]
    InvalidField { field: String, detail: String },

    #[error("changing '{field}' is not supported")]
    Immutable { field: String },

    #[error("unexpected response shape: {detail}")]
    UnexpectedResponse { detail: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn spec_field_access() {
        let spec = ResourceSpec::new("cdn_domain")
            .with_field("name", json!("a.example.com"))
            .with_field("configs", json!({"https": {"http2_status": "on"}}))
            .with_field("empty", json!(""));
        assert_eq!(spec.str_field("name"), Some("a.example.com"));
        assert_eq!(spec.get("configs.https.http2_status"), Some(&json!("on")));
        assert_eq!(spec.str_field("empty"), None);
        assert_eq!(
            spec.required_str("type"),
            Err(MappingError::MissingField {
                field: "type".into()
            })
        );
    }

    #[test]
    fn change_set_touches_nested_paths() {
        let mut cs = ChangeSet::new();
        cs.insert("configs.https", Change::Set(json!({"http2_status": "on"})));
        cs.insert("sources", Change::Clear(json!([])));
        assert!(cs.touches("configs"));
        assert!(cs.touches("configs.https"));
        assert!(!cs.touches("config"));
        assert!(cs.touches("sources"));
        assert!(!cs.touches("type"));
        assert_eq!(
            cs.top_level_fields().into_iter().collect::<Vec<_>>(),
            vec!["configs", "sources"]
        );
    }

    #[test]
    fn change_set_patch_is_nested() {
        let mut cs = ChangeSet::new();
        cs.insert("configs.https", Change::Set(json!({"http2_status": "on"})));
        cs.insert("configs.remark", Change::Clear(json!("")));
        cs.insert("type", Change::Set(json!("web")));
        assert_eq!(
            cs.to_patch(),
            json!({
                "configs": {"https": {"http2_status": "on"}, "remark": ""},
                "type": "web"
            })
        );
        let under = cs.patch_under("configs").map(Value::Object);
        assert_eq!(
            under,
            Some(json!({"https": {"http2_status": "on"}, "remark": ""}))
        );
        assert_eq!(cs.patch_under("sources"), None);
    }

    #[test]
    fn status_sets_reject_overlap() {
        let err = StatusSets::new(["1"], ["2", "1"], ["4"]);
        assert_eq!(
            err,
            Err(OverlappingStatus {
                status: "1".into(),
                first: "pending",
                second: "target",
            })
        );
        assert!(StatusSets::new(["0"], ["2"], ["2"]).is_err());
    }

    #[test]
    fn unknown_status_is_pending() {
        let sets = StatusSets::new(["0", "1"], ["2", "5"], ["4"]).unwrap();
        assert_eq!(sets.classify("1"), StatusClass::Pending);
        assert_eq!(sets.classify("5"), StatusClass::Target);
        assert_eq!(sets.classify("4"), StatusClass::Failure);
        assert_eq!(sets.classify("99"), StatusClass::Pending);
        assert!(!sets.is_known("99"));
    }

    #[test]
    fn deletion_wait_targets_absence() {
        let sets = StatusSets::until_absent(["deleting"], ["online"]).unwrap();
        let wait = StatusWait::new(sets, WaitTiming::secs(0, 1));
        assert!(wait.waits_for_absence());
        assert_eq!(wait.sets.classify(ABSENT_STATUS), StatusClass::Target);
    }

    #[test]
    fn offset_cursor_stops_on_short_page() {
        let cfg = PagerConfig::OffsetLimit { start: 0, limit: 2 };
        let first = cfg.first_cursor();
        let second = cfg.next_cursor(first, 2);
        assert_eq!(second, Some(PageCursor::Offset { offset: 2, limit: 2 }));
        assert_eq!(second.and_then(|c| cfg.next_cursor(c, 1)), None);
        assert_eq!(cfg.next_cursor(first, 0), None);
    }

    #[test]
    fn page_number_cursor_stops_only_on_empty_page() {
        let cfg = PagerConfig::PageNumber {
            first_page: 1,
            page_size: 10,
        };
        let first = cfg.first_cursor();
        assert_eq!(
            cfg.next_cursor(first, 3),
            Some(PageCursor::Number {
                page: 2,
                page_size: 10
            })
        );
        assert_eq!(cfg.next_cursor(first, 0), None);
    }

    #[test]
    fn cursor_query_parameters() {
        let req = PageCursor::Number {
            page: 3,
            page_size: 50,
        }
        .apply(ApiRequest::get(
            crate::transport::Service::Cdn,
            "/v1.0/cdn/domains",
        ));
        assert_eq!(req.query_string(), "page_number=3&page_size=50");
    }
}
