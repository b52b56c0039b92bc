//! Huawei Cloud error code tables
//!
//! Reference: <https://support.huaweicloud.com/api-cdn/ErrorCode.html>,
//! <https://support.huaweicloud.com/api-oms/oms_api_0030.html>

/// Gateway codes that are retryable for every kind.
pub const GLOBAL_RETRYABLE: &[&str] = &[
    "APIGW.0308", // throttling threshold reached
    "APIGW.0201", // backend unavailable
];

// ============ CDN ============

/// Domain does not exist.
pub const CDN_DOMAIN_NOT_FOUND: &str = "CDN.0170";
/// Domain is not in the caller's enterprise project; reported for a domain whose
/// deletion already went through.
pub const CDN_DOMAIN_LEFT_PROJECT: &str = "CDN.00010182";

pub const CDN_DOMAIN_NOT_FOUND_CODES: &[&str] = &[CDN_DOMAIN_NOT_FOUND];
pub const CDN_DOMAIN_GONE_CODES: &[&str] = &[CDN_DOMAIN_LEFT_PROJECT];

// ============ OMS ============

/// Task or task group does not exist.
pub const OMS_NOT_FOUND: &str = "OMS.1009";
/// Task is still being processed; the operation can be tried again.
pub const OMS_TASK_BUSY: &str = "OMS.0063";
/// Task is not running, so there is nothing to stop.
pub const OMS_TASK_NOT_RUNNING: &str = "OMS.0066";

pub const OMS_NOT_FOUND_CODES: &[&str] = &[OMS_NOT_FOUND];
pub const OMS_RETRYABLE_CODES: &[&str] = &[OMS_TASK_BUSY];
pub const OMS_STOP_TOLERATED: &[&str] = &[OMS_TASK_NOT_RUNNING];
pub const OMS_DELETE_BUSY: &[&str] = &[OMS_TASK_BUSY];
