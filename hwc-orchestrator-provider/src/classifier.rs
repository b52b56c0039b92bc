//! Error classification
//!
//! The control plane reports business errors in three shapes, sometimes with
//! HTTP 200:
//!
//! ```json
//! {"error": {"error_code": "CDN.0170", "error_msg": "domain not exist!"}}
//! {"error_code": "OMS.1009", "error_msg": "task not found"}
//! {"code": "APIGW.0308", "message": "The throttling threshold has been reached"}
//! ```
//!
//! The envelope is inspected before the status code. Per-kind code tables turn
//! envelope codes into not-found or retryable results.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProviderError;
use crate::resources::codes::GLOBAL_RETRYABLE;
use crate::traits::ErrorCodes;
use crate::utils::log_sanitizer::sanitize_body;

/// Outcome of classifying one response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "class", content = "reason", rename_all = "snake_case")]
pub enum Classification {
    Success,
    NotFound,
    Retryable(String),
    Fatal(String),
}

impl Classification {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Business error extracted from a response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiFault {
    pub code: Option<String>,
    pub message: String,
}

impl ApiFault {
    /// Look for an error envelope in `body`.
    ///
    /// The `code`/`message` shape is only trusted on non-2xx responses, since
    /// successful bodies legitimately carry fields with those names.
    pub fn extract(status: u16, body: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(body).ok()?;
        let success = (200..300).contains(&status);

        if let Some(inner) = value.get("error").filter(|v| v.is_object()) {
            let code = non_empty(inner.get("error_code"));
            let message = non_empty(inner.get("error_msg"));
            if code.is_some() || message.is_some() {
                return Some(Self::new(code, message));
            }
        }

        if let Some(code) = non_empty(value.get("error_code")) {
            return Some(Self::new(Some(code), non_empty(value.get("error_msg"))));
        }

        if !success {
            let code = non_empty(value.get("code"));
            let message = non_empty(value.get("message")).or_else(|| non_empty(value.get("error_msg")));
            if code.is_some() || message.is_some() {
                return Some(Self::new(code, message));
            }
        }

        None
    }

    fn new(code: Option<String>, message: Option<String>) -> Self {
        Self {
            code,
            message: message.unwrap_or_default(),
        }
    }

    fn describe(&self, status: u16) -> String {
        match &self.code {
            Some(code) => format!("HTTP {status} {code}: {}", self.message),
            None => format!("HTTP {status}: {}", self.message),
        }
    }
}

fn non_empty(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[derive(Debug, Clone, Default)]
struct KindCodes {
    not_found: HashSet<String>,
    gone_after_delete: HashSet<String>,
    retryable: HashSet<String>,
}

/// Data-driven response classifier.
#[derive(Debug, Clone)]
pub struct ErrorClassifier {
    global_retryable: HashSet<String>,
    kinds: HashMap<String, KindCodes>,
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorClassifier {
    /// Classifier with the global retryable codes and no per-kind tables.
    pub fn new() -> Self {
        Self {
            global_retryable: GLOBAL_RETRYABLE.iter().map(|c| (*c).to_string()).collect(),
            kinds: HashMap::new(),
        }
    }

    /// Register a kind's code tables, merging with anything already registered.
    pub fn register(&mut self, kind: &str, codes: &ErrorCodes) {
        let entry = self.kinds.entry(kind.to_string()).or_default();
        entry
            .not_found
            .extend(codes.not_found.iter().map(|c| (*c).to_string()));
        entry
            .gone_after_delete
            .extend(codes.gone_after_delete.iter().map(|c| (*c).to_string()));
        entry
            .retryable
            .extend(codes.retryable.iter().map(|c| (*c).to_string()));
    }

    /// Register one not-found code for a kind.
    pub fn register_not_found(&mut self, kind: &str, code: &str) {
        self.kinds
            .entry(kind.to_string())
            .or_default()
            .not_found
            .insert(code.to_string());
    }

    /// Register one retryable code for a kind.
    pub fn register_retryable(&mut self, kind: &str, code: &str) {
        self.kinds
            .entry(kind.to_string())
            .or_default()
            .retryable
            .insert(code.to_string());
    }

    pub fn classify(&self, kind: &str, status: u16, body: &str) -> Classification {
        self.classify_with(kind, status, body, false)
    }

    /// Like [`classify`](Self::classify), additionally treating the kind's
    /// "gone after delete" codes as not-found.
    pub fn classify_after_delete(&self, kind: &str, status: u16, body: &str) -> Classification {
        self.classify_with(kind, status, body, true)
    }

    /// Classify a failure where no response was received.
    pub fn classify_transport(&self, error: &ProviderError) -> Classification {
        if error.is_retryable() {
            Classification::Retryable(error.to_string())
        } else {
            Classification::Fatal(error.to_string())
        }
    }

    fn classify_with(
        &self,
        kind: &str,
        status: u16,
        body: &str,
        after_delete: bool,
    ) -> Classification {
        let fault = ApiFault::extract(status, body);
        let codes = self.kinds.get(kind);
        let code = fault.as_ref().and_then(|f| f.code.as_deref());

        if let (Some(code), Some(codes)) = (code, codes) {
            if codes.not_found.contains(code)
                || (after_delete && codes.gone_after_delete.contains(code))
            {
                return Classification::NotFound;
            }
        }

        if status == 404 {
            return Classification::NotFound;
        }

        let retryable_code = code.is_some_and(|c| {
            self.global_retryable.contains(c) || codes.is_some_and(|k| k.retryable.contains(c))
        });
        if status == 429 || matches!(status, 502..=504) || retryable_code {
            let reason = fault.as_ref().map_or_else(
                || format!("HTTP {status}"),
                |f| f.describe(status),
            );
            return Classification::Retryable(reason);
        }

        if let Some(fault) = fault {
            return Classification::Fatal(fault.describe(status));
        }

        if !(200..300).contains(&status) {
            return Classification::Fatal(format!("HTTP {status}: {}", sanitize_body(body)));
        }

        Classification::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> ErrorClassifier {
        let mut c = ErrorClassifier::new();
        c.register(
            "cdn_domain",
            &ErrorCodes {
                not_found: &["CDN.0170"],
                gone_after_delete: &["CDN.00010182"],
                retryable: &[],
            },
        );
        c.register(
            "oms_migration_task",
            &ErrorCodes {
                not_found: &["OMS.1009"],
                gone_after_delete: &[],
                retryable: &["OMS.0063"],
            },
        );
        c
    }

    #[test]
    fn embedded_not_found_with_http_200() {
        let body = r#"{"error":{"error_code":"CDN.0170","error_msg":"domain not exist!"}}"#;
        let c = classifier();
        assert_eq!(c.classify("cdn_domain", 200, body), Classification::NotFound);
        assert_eq!(
            c.classify("oms_migration_task", 200, body),
            Classification::Fatal("HTTP 200 CDN.0170: domain not exist!".into())
        );
    }

    #[test]
    fn registered_code_only_applies_to_its_kind() {
        let mut c = ErrorClassifier::new();
        c.register_not_found("k", "X.0001");
        let body = r#"{"error":{"error_code":"X.0001","error_msg":"gone"}}"#;
        assert_eq!(c.classify("k", 200, body), Classification::NotFound);
        assert!(matches!(c.classify("other", 200, body), Classification::Fatal(_)));
    }

    #[test]
    fn top_level_envelope_on_400() {
        let body = r#"{"error_code":"OMS.1009","error_msg":"task not found"}"#;
        assert_eq!(
            classifier().classify("oms_migration_task", 400, body),
            Classification::NotFound
        );
    }

    #[test]
    fn empty_top_level_error_code_is_not_an_envelope() {
        let body = r#"{"error_code":"","id":1}"#;
        assert_eq!(
            classifier().classify("oms_migration_task", 200, body),
            Classification::Success
        );
    }

    #[test]
    fn plain_404_is_not_found() {
        assert_eq!(
            classifier().classify("anything", 404, ""),
            Classification::NotFound
        );
    }

    #[test]
    fn gone_after_delete_only_in_delete_context() {
        let body = r#"{"error":{"error_code":"CDN.00010182","error_msg":"The resource is not belong to the enterprise project."}}"#;
        let c = classifier();
        assert!(matches!(c.classify("cdn_domain", 400, body), Classification::Fatal(_)));
        assert_eq!(
            c.classify_after_delete("cdn_domain", 400, body),
            Classification::NotFound
        );
        assert_eq!(
            c.classify_after_delete(
                "cdn_domain",
                400,
                r#"{"error":{"error_code":"CDN.0170","error_msg":"x"}}"#
            ),
            Classification::NotFound
        );
    }

    #[test]
    fn throttling_and_gateway_errors_are_retryable() {
        let c = classifier();
        assert!(matches!(c.classify("k", 429, ""), Classification::Retryable(_)));
        assert!(matches!(c.classify("k", 503, "oops"), Classification::Retryable(_)));
        let body = r#"{"code":"APIGW.0308","message":"The throttling threshold has been reached"}"#;
        assert_eq!(
            c.classify("k", 400, body),
            Classification::Retryable(
                "HTTP 400 APIGW.0308: The throttling threshold has been reached".into()
            )
        );
    }

    #[test]
    fn per_kind_retryable_code() {
        let body = r#"{"error_code":"OMS.0063","error_msg":"task is being processed"}"#;
        let c = classifier();
        assert!(matches!(
            c.classify("oms_migration_task", 400, body),
            Classification::Retryable(_)
        ));
        assert!(matches!(c.classify("cdn_domain", 400, body), Classification::Fatal(_)));
    }

    #[test]
    fn code_message_on_success_is_ignored() {
        let body = r#"{"code":"ok","message":"done","id":"abc"}"#;
        assert_eq!(classifier().classify("k", 200, body), Classification::Success);
    }

    #[test]
    fn unparseable_error_body_is_fatal() {
        assert_eq!(
            classifier().classify("k", 500, "internal"),
            Classification::Fatal("HTTP 500: internal".into())
        );
    }

    #[test]
    fn success_without_envelope() {
        assert_eq!(
            classifier().classify("k", 200, r#"{"id":"abc"}"#),
            Classification::Success
        );
        assert_eq!(classifier().classify("k", 204, ""), Classification::Success);
    }

    #[test]
    fn transport_errors() {
        let c = classifier();
        let e = ProviderError::Timeout {
            service: "cdn".into(),
            detail: "30s".into(),
        };
        assert!(matches!(c.classify_transport(&e), Classification::Retryable(_)));
        let e = ProviderError::ParseError {
            service: "cdn".into(),
            detail: "eof".into(),
        };
        assert!(matches!(c.classify_transport(&e), Classification::Fatal(_)));
    }

    #[test]
    fn fault_extraction_shapes() {
        assert_eq!(
            ApiFault::extract(400, r#"{"code":"APIGW.0301","message":"bad sig"}"#),
            Some(ApiFault {
                code: Some("APIGW.0301".into()),
                message: "bad sig".into()
            })
        );
        assert_eq!(ApiFault::extract(200, r#"{"code":"APIGW.0301"}"#), None);
        assert_eq!(ApiFault::extract(500, "not json"), None);
    }
}
