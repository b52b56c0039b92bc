//! Request execution for [`HuaweicloudClient`]

use async_trait::async_trait;
use chrono::Utc;

use crate::error::{ProviderError, Result};
use crate::http_client::HttpUtils;
use crate::transport::{ApiRequest, Method, RawResponse, Transport};
use crate::utils::log_sanitizer::{redact_authorization, sanitize_body};

use super::HuaweicloudClient;

impl HuaweicloudClient {
    async fn execute(&self, request: &ApiRequest) -> Result<RawResponse> {
        let service = request.service.as_str();
        let payload = match &request.body {
            Some(body) => {
                serde_json::to_string(body).map_err(|e| ProviderError::SerializationError {
                    service: service.to_string(),
                    detail: e.to_string(),
                })?
            }
            None => String::new(),
        };

        let host = self.host(request.service);
        let timestamp = Utc::now().format("%Y%m%dT%H%M%SZ").to_string();
        let query = request.query_string();

        let mut headers = vec![
            ("Host".to_string(), host.clone()),
            ("X-Sdk-Date".to_string(), timestamp.clone()),
        ];
        if request.body.is_some() {
            headers.push(("Content-Type".to_string(), "application/json".to_string()));
        }

        let authorization = self.sign(
            request.method.as_str(),
            &request.path,
            &query,
            &headers,
            &payload,
            &timestamp,
        );

        log::debug!(
            "[{service}] Authorization: {}",
            redact_authorization(&authorization)
        );
        if !payload.is_empty() {
            log::debug!("[{service}] Request Body: {}", sanitize_body(&payload));
        }

        let base = self.base_url(request.service);
        let url = if query.is_empty() {
            format!("{base}{}", request.path)
        } else {
            format!("{base}{}?{query}", request.path)
        };

        let builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
            Method::Put => self.client.put(&url),
            Method::Delete => self.client.delete(&url),
        };
        let mut builder = builder
            .header("Host", host)
            .header("X-Sdk-Date", &timestamp)
            .header("Authorization", authorization);
        if request.body.is_some() {
            builder = builder
                .header("Content-Type", "application/json")
                .body(payload);
        }

        let describe = request.describe();
        let (status, body) = if request.method.is_replayable() {
            HttpUtils::execute_request_with_retry(builder, service, &describe, self.max_retries)
                .await?
        } else {
            HttpUtils::execute_request(builder, service, &describe).await?
        };

        Ok(RawResponse::new(status, body))
    }
}

#[async_trait]
impl Transport for HuaweicloudClient {
    async fn request(&self, request: &ApiRequest) -> Result<RawResponse> {
        self.execute(request).await
    }
}
