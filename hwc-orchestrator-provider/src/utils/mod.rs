//! Utility modules.

/// Dotted-path lookups into JSON documents.
pub mod json_path;

/// Credential redaction and truncation for logged bodies and headers.
pub mod log_sanitizer;
