//! Signed Huawei Cloud HTTP client

mod http;
mod sign;

use std::collections::HashMap;
use std::time::Duration;

use hmac::{Hmac, Mac};
use reqwest::Client;
use sha2::Sha256;

use crate::error::{ProviderError, Result};
use crate::transport::Service;

type HmacSha256 = Hmac<Sha256>;

/// Global CDN endpoint host.
pub const CDN_HOST: &str = "cdn.myhuaweicloud.com";

/// Default connection timeout (seconds)
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
/// Default request timeout (seconds)
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Transport that signs every request with AK/SK (`SDK-HMAC-SHA256`).
///
/// # Construction
///
/// ```rust,no_run
/// use hwc_orchestrator_provider::HuaweicloudClient;
///
/// let client = HuaweicloudClient::builder("your-access-key-id", "your-secret-access-key")
///     .region("cn-north-4")
///     .max_retries(3)
///     .build()?;
/// # Ok::<(), hwc_orchestrator_provider::ProviderError>(())
/// ```
pub struct HuaweicloudClient {
    pub(crate) client: Client,
    pub(crate) access_key_id: String,
    pub(crate) secret_access_key: String,
    pub(crate) max_retries: u32,
    region: String,
    endpoints: HashMap<Service, String>,
}

/// Builder for [`HuaweicloudClient`].
pub struct HuaweicloudClientBuilder {
    access_key_id: String,
    secret_access_key: String,
    region: String,
    max_retries: u32,
    endpoints: HashMap<Service, String>,
}

impl HuaweicloudClientBuilder {
    fn new(access_key_id: String, secret_access_key: String) -> Self {
        Self {
            access_key_id,
            secret_access_key,
            region: "cn-north-4".to_string(),
            max_retries: 2,
            endpoints: HashMap::new(),
        }
    }

    /// Region used for regional endpoints (default: `cn-north-4`).
    #[must_use]
    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    /// Maximum automatic retries for transient GET failures (default: 2).
    #[must_use]
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Override the base URL of one service, e.g. `https://oms.example.internal`.
    #[must_use]
    pub fn endpoint(mut self, service: Service, base_url: impl Into<String>) -> Self {
        self.endpoints
            .insert(service, base_url.into().trim_end_matches('/').to_string());
        self
    }

    pub fn build(self) -> Result<HuaweicloudClient> {
        if self.access_key_id.is_empty() || self.secret_access_key.is_empty() {
            return Err(ProviderError::InvalidConfig {
                field: "credentials".to_string(),
                detail: "access key id and secret access key must not be empty".to_string(),
            });
        }
        if self.region.is_empty() {
            return Err(ProviderError::InvalidConfig {
                field: "region".to_string(),
                detail: "must not be empty".to_string(),
            });
        }
        Ok(HuaweicloudClient {
            client: create_http_client()?,
            access_key_id: self.access_key_id,
            secret_access_key: self.secret_access_key,
            max_retries: self.max_retries,
            region: self.region,
            endpoints: self.endpoints,
        })
    }
}

impl HuaweicloudClient {
    /// Client with default settings (region `cn-north-4`, 2 retries).
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Result<Self> {
        Self::builder(access_key_id, secret_access_key).build()
    }

    pub fn builder(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
    ) -> HuaweicloudClientBuilder {
        HuaweicloudClientBuilder::new(access_key_id.into(), secret_access_key.into())
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Base URL (scheme + host) requests for `service` are sent to.
    pub fn base_url(&self, service: Service) -> String {
        if let Some(url) = self.endpoints.get(&service) {
            return url.clone();
        }
        match service {
            Service::Cdn => format!("https://{CDN_HOST}"),
            Service::Oms => format!("https://oms.{}.myhuaweicloud.com", self.region),
        }
    }

    /// Value of the signed `Host` header for `service`.
    pub fn host(&self, service: Service) -> String {
        let base = self.base_url(service);
        base.split_once("://")
            .map_or(base.as_str(), |(_, rest)| rest)
            .to_string()
    }
}

/// HTTP client with connect/request timeouts.
pub(crate) fn create_http_client() -> Result<Client> {
    Client::builder()
        .connect_timeout(Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS))
        .timeout(Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS))
        .build()
        .map_err(|e| ProviderError::InvalidConfig {
            field: "http_client".to_string(),
            detail: e.to_string(),
        })
}

pub(crate) fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    #[allow(clippy::expect_used)]
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_hosts_follow_region() {
        let client = HuaweicloudClient::builder("ak", "sk")
            .region("ap-southeast-1")
            .build()
            .unwrap();
        assert_eq!(client.host(Service::Cdn), "cdn.myhuaweicloud.com");
        assert_eq!(client.host(Service::Oms), "oms.ap-southeast-1.myhuaweicloud.com");
        assert_eq!(
            client.base_url(Service::Oms),
            "https://oms.ap-southeast-1.myhuaweicloud.com"
        );
    }

    #[test]
    fn endpoint_override() {
        let client = HuaweicloudClient::builder("ak", "sk")
            .endpoint(Service::Cdn, "http://127.0.0.1:8080/")
            .build()
            .unwrap();
        assert_eq!(client.base_url(Service::Cdn), "http://127.0.0.1:8080");
        assert_eq!(client.host(Service::Cdn), "127.0.0.1:8080");
    }

    #[test]
    fn empty_credentials_rejected() {
        assert!(matches!(
            HuaweicloudClient::new("", "sk"),
            Err(ProviderError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn hmac_known_vector() {
        // RFC 4231 test case 2
        let mac = hmac_sha256(b"Jefe", b"what do ya want for nothing?");
        assert_eq!(
            hex::encode(mac),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }
}
