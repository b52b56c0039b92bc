//! Huawei Cloud SDK-HMAC-SHA256 signature

use std::fmt::Write;

use sha2::{Digest, Sha256};

use crate::utils::log_sanitizer::truncate_for_log;

use super::{HuaweicloudClient, hmac_sha256};

impl HuaweicloudClient {
    /// Build the `Authorization` header value.
    ///
    /// `query` must already be URL-encoded. Reference:
    /// <https://support.huaweicloud.com/devg-apisign/api-sign-algorithm-005.html>
    pub(crate) fn sign(
        &self,
        method: &str,
        uri: &str,
        query: &str,
        headers: &[(String, String)],
        payload: &str,
        timestamp: &str,
    ) -> String {
        let canonical_uri = if uri.ends_with('/') {
            uri.to_string()
        } else {
            format!("{uri}/")
        };

        let canonical_query = if query.is_empty() {
            String::new()
        } else {
            let mut params: Vec<&str> = query.split('&').collect();
            params.sort_unstable();
            params.join("&")
        };

        let mut sorted_headers: Vec<_> = headers.iter().collect();
        sorted_headers.sort_by_key(|(k, _)| k.to_lowercase());

        let canonical_headers = sorted_headers
            .iter()
            .fold(String::new(), |mut acc, (k, v)| {
                let _ = writeln!(acc, "{}:{}", k.to_lowercase(), v.trim());
                acc
            });

        let signed_headers = sorted_headers
            .iter()
            .map(|(k, _)| k.to_lowercase())
            .collect::<Vec<_>>()
            .join(";");

        let hashed_payload = hex::encode(Sha256::digest(payload.as_bytes()));

        let canonical_request = format!(
            "{method}\n{canonical_uri}\n{canonical_query}\n{canonical_headers}\n{signed_headers}\n{hashed_payload}"
        );
        log::debug!("CanonicalRequest:\n{}", truncate_for_log(&canonical_request));

        let hashed_canonical_request = hex::encode(Sha256::digest(canonical_request.as_bytes()));
        let string_to_sign = format!("SDK-HMAC-SHA256\n{timestamp}\n{hashed_canonical_request}");

        let signature = hex::encode(hmac_sha256(
            self.secret_access_key.as_bytes(),
            string_to_sign.as_bytes(),
        ));

        format!(
            "SDK-HMAC-SHA256 Access={}, SignedHeaders={}, Signature={}",
            self.access_key_id, signed_headers, signature
        )
    }
}

#[cfg(test)]
mod tests {
    use super::super::HuaweicloudClient;

    const TS: &str = "20240101T000000Z";

    fn client(ak: &str, sk: &str) -> HuaweicloudClient {
        HuaweicloudClient::new(ak, sk).unwrap()
    }

    fn headers() -> Vec<(String, String)> {
        vec![
            ("Host".to_string(), "cdn.myhuaweicloud.com".to_string()),
            ("X-Sdk-Date".to_string(), TS.to_string()),
        ]
    }

    fn field<'a>(auth: &'a str, name: &str) -> &'a str {
        auth.split(&format!("{name}="))
            .nth(1)
            .and_then(|s| s.split(',').next())
            .unwrap_or_default()
    }

    #[test]
    fn header_layout() {
        let auth = client("MY-AK", "sk").sign("GET", "/v1.0/cdn/domains", "", &headers(), "", TS);
        assert!(auth.starts_with("SDK-HMAC-SHA256 "));
        assert_eq!(field(&auth, "Access"), "MY-AK");
        assert_eq!(field(&auth, "SignedHeaders"), "host;x-sdk-date");
        assert_eq!(field(&auth, "Signature").len(), 64);
    }

    #[test]
    fn deterministic() {
        let c = client("ak", "sk");
        let a = c.sign("POST", "/v2/p/tasks", "", &headers(), "{}", TS);
        let b = c.sign("POST", "/v2/p/tasks", "", &headers(), "{}", TS);
        assert_eq!(a, b);
    }

    #[test]
    fn trailing_slash_is_normalised() {
        let c = client("ak", "sk");
        assert_eq!(
            c.sign("GET", "/v2/p/tasks", "", &headers(), "", TS),
            c.sign("GET", "/v2/p/tasks/", "", &headers(), "", TS)
        );
    }

    #[test]
    fn query_order_does_not_matter() {
        let c = client("ak", "sk");
        assert_eq!(
            c.sign("GET", "/v2/p/tasks", "offset=0&limit=100", &headers(), "", TS),
            c.sign("GET", "/v2/p/tasks", "limit=100&offset=0", &headers(), "", TS)
        );
    }

    #[test]
    fn signed_headers_sorted_case_insensitively() {
        let hs = vec![
            ("X-Sdk-Date".to_string(), TS.to_string()),
            ("Content-Type".to_string(), "application/json".to_string()),
            ("host".to_string(), "oms.cn-north-4.myhuaweicloud.com".to_string()),
        ];
        let auth = client("ak", "sk").sign("PUT", "/x", "", &hs, "{}", TS);
        assert_eq!(field(&auth, "SignedHeaders"), "content-type;host;x-sdk-date");
    }

    #[test]
    fn inputs_change_signature() {
        let c = client("ak", "sk");
        let base = c.sign("GET", "/x", "", &headers(), "", TS);
        assert_ne!(base, c.sign("DELETE", "/x", "", &headers(), "", TS));
        assert_ne!(base, c.sign("GET", "/y", "", &headers(), "", TS));
        assert_ne!(base, c.sign("GET", "/x", "a=1", &headers(), "", TS));
        assert_ne!(base, c.sign("GET", "/x", "", &headers(), "body", TS));
        assert_ne!(
            field(&base, "Signature"),
            field(&client("ak", "other").sign("GET", "/x", "", &headers(), "", TS), "Signature")
        );
    }
}
