//! URL canonicalization and alias validation.
//!
//! The canonical string is what the registry stores and indexes, so two raw
//! inputs that parse to the same URL share one entry.

use url::Url;

use crate::{CoreError, ShortCode};

/// Upper bound on accepted URL length, in bytes.
pub const MAX_URL_LEN: usize = 2048;

/// Parse `raw` and return its canonical string form.
///
/// Only absolute `http`/`https` URLs with a host are accepted. The returned
/// form has a lowercased scheme and host, no default port, and `/` for an
/// empty path.
pub fn canonicalize(raw: &str) -> Result<String, CoreError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(CoreError::InvalidUrl("empty".into()));
    }
    if trimmed.len() > MAX_URL_LEN {
        return Err(CoreError::InvalidUrl("too long".into()));
    }
    let parsed = Url::parse(trimmed).map_err(|e| CoreError::InvalidUrl(e.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(CoreError::InvalidUrl(
            "must start with http:// or https://".into(),
        ));
    }
    match parsed.host_str() {
        Some(host) if !host.is_empty() => {}
        _ => return Err(CoreError::InvalidUrl("missing host".into())),
    }
    Ok(parsed.into())
}

/// Path segments the HTTP routes claim for themselves. An alias with one of
/// these names would be shadowed by a static route and never resolve.
pub const RESERVED_ALIASES: &[&str] = &["links", "search", "shorten"];

/// Validate a caller-chosen alias: 3-32 characters of ASCII alphanumerics,
/// hyphen or underscore, and not a reserved route segment.
pub fn validate_alias(raw: &str) -> Result<ShortCode, CoreError> {
    let len = raw.chars().count();
    if !(3..=32).contains(&len) {
        return Err(CoreError::InvalidCode(
            "alias must be 3-32 characters".into(),
        ));
    }
    if RESERVED_ALIASES.contains(&raw) {
        return Err(CoreError::InvalidCode(format!("alias '{}' is reserved", raw)));
    }
    ShortCode::new(raw)
}
