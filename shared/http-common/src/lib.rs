//! Shared HTTP utilities for the link registry workspace.
//!
//! Framework-agnostic response bodies, timestamp conversion and short URL
//! building used by the api-server.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use std::time::SystemTime;

// ============================================================================
// JSON Response Helpers (framework-agnostic)
// ============================================================================

/// Create a structured error JSON with a default message based on the code.
///
/// Returns: `{"error": {"code": "<code>", "message": "<default message>"}}`
pub fn json_err(code: &str) -> serde_json::Value {
    let message = match code {
        "not_found" => "Link not found",
        "expired" => "Link has expired",
        "alias_conflict" => "Custom alias already in use",
        "invalid_request" => "Bad request",
        "conflict" => "Resource already exists",
        "unavailable" => "No short code available, try again later",
        "error" | "internal" => "Internal server error",
        _ => code, // Fallback to code as message for unknown codes
    };
    serde_json::json!({"error": {"code": code, "message": message}})
}

/// Create a structured error JSON with a custom message.
///
/// Returns: `{"error": {"code": "<code>", "message": "<message>"}}`
pub fn json_error_with_message(code: &str, message: &str) -> serde_json::Value {
    serde_json::json!({"error": {"code": code, "message": message}})
}

/// Create a plain `{"message": "<message>"}` body.
pub fn json_message(message: &str) -> serde_json::Value {
    serde_json::json!({ "message": message })
}

// ============================================================================
// URL Building
// ============================================================================

/// Build a short URL for `code`.
///
/// A configured `base` (e.g. `https://sho.rt`) wins; otherwise uses
/// `https://{host}/{code}`, or `/{code}` when the host is unknown.
pub fn build_short_url(base: Option<&str>, host: &str, code: &str) -> String {
    if let Some(dom) = base.filter(|d| !d.is_empty()) {
        return format!("{}/{}", dom.trim_end_matches('/'), code);
    }
    if host.is_empty() {
        format!("/{}", code)
    } else {
        format!("https://{}/{}", host, code)
    }
}

// ============================================================================
// Time Utilities
// ============================================================================

/// Convert SystemTime to RFC3339 string (seconds precision, UTC).
pub fn system_time_to_rfc3339(t: SystemTime) -> String {
    let dt: DateTime<Utc> = t.into();
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parse a timestamp to SystemTime.
///
/// Accepts RFC3339 (`2024-05-01T12:00:00Z`, `...+02:00`) and naive ISO-8601
/// datetimes without an offset (`2024-05-01T12:00:00.123456`), the latter
/// read as UTC.
pub fn parse_timestamp(s: &str) -> Result<SystemTime, chrono::ParseError> {
    match DateTime::parse_from_rfc3339(s) {
        Ok(dt) => Ok(dt.with_timezone(&Utc).into()),
        Err(rfc_err) => NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| SystemTime::from(naive.and_utc()))
            .map_err(|_| rfc_err),
    }
}
