//! Log redaction
//!
//! OMS start/retry bodies carry source and destination key pairs, CDN source
//! settings carry URL-signing keys, and every request carries an SDK-HMAC
//! `Authorization` header. Nothing logged at any level may contain them, and
//! bodies are cut to a bounded prefix.

use serde_json::Value;

/// Characters of a body kept in log output.
const LOG_CHAR_LIMIT: usize = 256;

/// Visible prefix of an access key id in a redacted `Authorization` header.
const ACCESS_KEY_PREFIX: usize = 4;

const REDACTED: &str = "***";

/// JSON members whose values are credentials.
const SECRET_MEMBERS: &[&str] = &[
    "ak",
    "sk",
    "src_ak",
    "src_sk",
    "dst_ak",
    "dst_sk",
    "access_key",
    "secret_key",
    "security_token",
    "src_security_token",
    "dst_security_token",
    "json_auth_file",
    "authentication_key",
    "source_cdn_authentication_key",
];

fn is_secret(member: &str) -> bool {
    SECRET_MEMBERS.contains(&member)
}

fn redact_value(value: &mut Value) {
    match value {
        Value::Object(members) => {
            for (name, member) in members.iter_mut() {
                if is_secret(name) && !member.is_null() {
                    *member = Value::String(REDACTED.to_string());
                } else {
                    redact_value(member);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(redact_value),
        _ => {}
    }
}

/// Cut `s` to [`LOG_CHAR_LIMIT`] characters, noting the full byte length.
pub fn truncate_for_log(s: &str) -> String {
    match s.char_indices().nth(LOG_CHAR_LIMIT) {
        None => s.to_string(),
        Some((cut, _)) => format!("{}... [{} bytes total]", &s[..cut], s.len()),
    }
}

/// A request or response body fit for logging: credential members masked,
/// then truncated. Bodies that are not JSON are only truncated.
pub fn sanitize_body(body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(mut value) => {
            redact_value(&mut value);
            truncate_for_log(&value.to_string())
        }
        Err(_) => truncate_for_log(body),
    }
}

/// `SDK-HMAC-SHA256 Access=..., SignedHeaders=..., Signature=...` with the
/// signature removed and only a prefix of the access key id left.
pub fn redact_authorization(header: &str) -> String {
    let Some((algorithm, params)) = header.split_once(' ') else {
        return REDACTED.to_string();
    };
    let params = params
        .split(", ")
        .map(|param| match param.split_once('=') {
            Some(("Access", ak)) => {
                let shown: String = ak.chars().take(ACCESS_KEY_PREFIX).collect();
                format!("Access={shown}{REDACTED}")
            }
            Some(("Signature", _)) => format!("Signature={REDACTED}"),
            _ => param.to_string(),
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!("{algorithm} {params}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn short_body_kept() {
        assert_eq!(truncate_for_log("{\"domain\":{}}"), "{\"domain\":{}}");
        let s = "a".repeat(LOG_CHAR_LIMIT);
        assert_eq!(truncate_for_log(&s), s);
    }

    #[test]
    fn long_body_cut_on_char_boundary() {
        let s = "域".repeat(LOG_CHAR_LIMIT + 10);
        let out = truncate_for_log(&s);
        assert!(out.starts_with(&"域".repeat(LOG_CHAR_LIMIT)));
        assert!(out.ends_with(&format!("[{} bytes total]", s.len())));
    }

    #[test]
    fn oms_keys_masked_at_any_depth() {
        let body = json!({
            "src_node": {"region": "cn-hangzhou", "ak": "SRC-AK", "sk": "SRC-SK"},
            "dst_node": {"bucket": "dst", "ak": "DST-AK", "sk": "DST-SK", "security_token": null},
            "source_cdn": {"authentication_key": "cdn-key", "domain": "img.example.com"},
            "dst_ak": "D", "dst_sk": "S"
        })
        .to_string();
        let out = sanitize_body(&body);
        for secret in ["SRC-AK", "SRC-SK", "DST-AK", "DST-SK", "cdn-key", "\"D\"", "\"S\""] {
            assert!(!out.contains(secret), "{secret} leaked: {out}");
        }
        assert!(out.contains("cn-hangzhou"));
        assert!(out.contains("img.example.com"));
        assert!(out.contains("\"security_token\":null"));
    }

    #[test]
    fn non_json_body_only_truncated() {
        assert_eq!(sanitize_body("<html>bad gateway</html>"), "<html>bad gateway</html>");
    }

    #[test]
    fn authorization_header_redacted() {
        let header = "SDK-HMAC-SHA256 Access=HPUABCDEFGHIJ, SignedHeaders=host;x-sdk-date, Signature=0123abcd";
        let out = redact_authorization(header);
        assert_eq!(
            out,
            "SDK-HMAC-SHA256 Access=HPUA***, SignedHeaders=host;x-sdk-date, Signature=***"
        );
        assert_eq!(redact_authorization("garbage"), "***");
    }
}
