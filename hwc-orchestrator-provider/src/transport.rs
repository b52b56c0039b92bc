//! Transport boundary
//!
//! The reconciliation core only ever talks to the control plane through
//! [`Transport::request`]. Implementations own signing, connection pooling and
//! TLS; they return the raw status and body and never interpret business errors.

use std::fmt::Write;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ProviderError, Result};

/// Endpoint family a request is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Service {
    /// Content Delivery Network (global endpoint).
    Cdn,
    /// Object Storage Migration Service (regional endpoint).
    Oms,
}

impl Service {
    /// Lowercase service identifier, used in logs and error messages.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cdn => "cdn",
            Self::Oms => "oms",
        }
    }
}

impl std::fmt::Display for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// HTTP method subset used by the control-plane APIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }

    /// Only reads may be replayed by the transport. Mutating calls are issued once.
    pub fn is_replayable(self) -> bool {
        matches!(self, Self::Get)
    }
}

/// One control-plane request.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub service: Service,
    pub method: Method,
    /// Absolute path starting with `/`.
    pub path: String,
    /// Query parameters, in insertion order (unencoded).
    pub query: Vec<(String, String)>,
    /// JSON body for POST/PUT.
    pub body: Option<Value>,
}

impl ApiRequest {
    fn new(service: Service, method: Method, path: impl Into<String>) -> Self {
        Self {
            service,
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn get(service: Service, path: impl Into<String>) -> Self {
        Self::new(service, Method::Get, path)
    }

    pub fn post(service: Service, path: impl Into<String>, body: Value) -> Self {
        Self::new(service, Method::Post, path).with_body(body)
    }

    pub fn put(service: Service, path: impl Into<String>, body: Value) -> Self {
        Self::new(service, Method::Put, path).with_body(body)
    }

    pub fn delete(service: Service, path: impl Into<String>) -> Self {
        Self::new(service, Method::Delete, path)
    }

    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Append a query parameter.
    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    /// Append a query parameter only when a value is present.
    #[must_use]
    pub fn with_optional_query(self, key: impl Into<String>, value: Option<&str>) -> Self {
        match value {
            Some(v) if !v.is_empty() => self.with_query(key, v),
            _ => self,
        }
    }

    /// URL-encoded query string, without the leading `?`.
    pub fn query_string(&self) -> String {
        self.query
            .iter()
            .enumerate()
            .fold(String::new(), |mut acc, (i, (k, v))| {
                if i > 0 {
                    acc.push('&');
                }
                let _ = write!(
                    acc,
                    "{}={}",
                    urlencoding::encode(k),
                    urlencoding::encode(v)
                );
                acc
            })
    }

    /// `METHOD path?query`, for logs.
    pub fn describe(&self) -> String {
        let query = self.query_string();
        if query.is_empty() {
            format!("{} {}", self.method.as_str(), self.path)
        } else {
            format!("{} {}?{query}", self.method.as_str(), self.path)
        }
    }
}

/// Raw control-plane response: status code plus untouched body text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decode the body as JSON. An empty body decodes to `null`.
    pub fn json(&self, service: Service) -> Result<Value> {
        if self.body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&self.body).map_err(|e| ProviderError::ParseError {
            service: service.to_string(),
            detail: e.to_string(),
        })
    }
}

/// Authenticated request executor.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Issue one request and return the raw response.
    ///
    /// Non-2xx statuses are returned as `Ok`. `Err` is reserved for failures where no
    /// usable response exists (network, timeout, rate limiting, serialization).
    async fn request(&self, request: &ApiRequest) -> Result<RawResponse>;
}
