//! Test helpers
//!
//! A scripted [`Transport`] and a factory for a [`ServiceContext`] wired to it.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use hwc_orchestrator_provider::{
    ApiRequest, Method, ProjectContext, ProviderError, RawResponse, Transport, create_all_mappers,
};

use crate::services::ServiceContext;

// ===== Reply =====

/// One scripted outcome of a request.
#[derive(Debug, Clone)]
pub enum Reply {
    Response(RawResponse),
    Error(ProviderError),
}

impl Reply {
    pub fn json(status: u16, body: &Value) -> Self {
        Self::Response(RawResponse::new(status, body.to_string()))
    }

    /// HTTP 200 with `body`.
    pub fn ok(body: &Value) -> Self {
        Self::json(200, body)
    }

    pub fn empty(status: u16) -> Self {
        Self::Response(RawResponse::new(status, ""))
    }

    pub fn network_error() -> Self {
        Self::Error(ProviderError::NetworkError {
            service: "scripted".to_string(),
            detail: "connection reset".to_string(),
        })
    }
}

// ===== ScriptedTransport =====

struct Route {
    method: Method,
    path: String,
    replies: VecDeque<Reply>,
}

/// Transport answering from per-route reply queues.
///
/// Each route replays its replies in order and repeats the last one forever.
/// Requests to unscripted routes fail with `InvalidConfig`. Every request is
/// recorded.
pub struct ScriptedTransport {
    routes: Mutex<Vec<Route>>,
    calls: Mutex<Vec<ApiRequest>>,
    latency: Duration,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            routes: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            latency: Duration::ZERO,
        }
    }

    /// Delay every reply by `latency`.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Script the replies for `method path` (query ignored).
    #[must_use]
    pub fn on(
        mut self,
        method: Method,
        path: impl Into<String>,
        replies: impl IntoIterator<Item = Reply>,
    ) -> Self {
        self.routes.get_mut().push(Route {
            method,
            path: path.into(),
            replies: replies.into_iter().collect(),
        });
        self
    }

    /// All requests so far, in order.
    pub async fn calls(&self) -> Vec<ApiRequest> {
        self.calls.lock().await.clone()
    }

    /// Number of requests made to `method path`.
    pub async fn count(&self, method: Method, path: &str) -> usize {
        self.calls
            .lock()
            .await
            .iter()
            .filter(|r| r.method == method && r.path == path)
            .count()
    }

    /// Number of requests other than reads.
    pub async fn mutating_calls(&self) -> usize {
        self.calls
            .lock()
            .await
            .iter()
            .filter(|r| r.method != Method::Get)
            .count()
    }
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn request(&self, request: &ApiRequest) -> hwc_orchestrator_provider::Result<RawResponse> {
        self.calls.lock().await.push(request.clone());
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let mut routes = self.routes.lock().await;
        let route = routes
            .iter_mut()
            .find(|r| r.method == request.method && r.path == request.path)
            .ok_or_else(|| ProviderError::InvalidConfig {
                field: "route".to_string(),
                detail: format!("unscripted request {}", request.describe()),
            })?;
        let reply = if route.replies.len() > 1 {
            route.replies.pop_front()
        } else {
            route.replies.front().cloned()
        };
        match reply {
            Some(Reply::Response(response)) => Ok(response),
            Some(Reply::Error(e)) => Err(e),
            None => Err(ProviderError::InvalidConfig {
                field: "route".to_string(),
                detail: format!("no replies scripted for {}", request.describe()),
            }),
        }
    }
}

/// Context serving every kind through `transport`.
pub fn scripted_context(transport: Arc<ScriptedTransport>, project: &ProjectContext) -> Arc<ServiceContext> {
    let mappers = create_all_mappers(project).unwrap_or_default();
    Arc::new(ServiceContext::with_mappers(transport, mappers))
}
