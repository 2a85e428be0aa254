//! Domain library for the link registry.
//!
//! Holds the link types, the ports (code generator, clock), the error type and
//! the in-memory [`registry::LinkRegistry`] that owns both indexes. Keep HTTP
//! and serialization concerns out of this crate.

use std::fmt::{Display, Formatter};
use std::time::SystemTime;

/// A URL-safe short code identifying a link.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ShortCode(String);

impl ShortCode {
    pub fn new<S: Into<String>>(s: S) -> Result<Self, CoreError> {
        let val = s.into();
        if val.is_empty() {
            return Err(CoreError::InvalidCode("empty".into()));
        }
        if !val
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(CoreError::InvalidCode("invalid characters".into()));
        }
        Ok(Self(val))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ShortCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Input data for creating (or fetching the existing) short link.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NewLink {
    /// Raw target URL; canonicalized by the registry before indexing.
    pub original_url: String,
    pub custom_alias: Option<String>,
    pub expires_at: Option<SystemTime>,
}

impl NewLink {
    pub fn new<S: Into<String>>(original_url: S) -> Self {
        Self {
            original_url: original_url.into(),
            ..Self::default()
        }
    }

    pub fn with_alias<S: Into<String>>(mut self, alias: S) -> Self {
        self.custom_alias = Some(alias.into());
        self
    }

    pub fn expiring_at(mut self, at: SystemTime) -> Self {
        self.expires_at = Some(at);
        self
    }
}

/// How an update treats the stored expiration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ExpiryUpdate {
    /// Leave the current expiration untouched.
    #[default]
    Keep,
    /// Replace the expiration with the given instant.
    Set(SystemTime),
    /// Remove the expiration; the link lives until deleted.
    Clear,
}

impl ExpiryUpdate {
    /// Apply this update to an existing expiration value.
    pub fn apply(self, current: Option<SystemTime>) -> Option<SystemTime> {
        match self {
            ExpiryUpdate::Keep => current,
            ExpiryUpdate::Set(at) => Some(at),
            ExpiryUpdate::Clear => None,
        }
    }
}

/// Changes applied to an existing link.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinkUpdate {
    pub original_url: String,
    pub expires_at: ExpiryUpdate,
}

/// Stored short link.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinkRecord {
    pub short_code: ShortCode,
    /// Canonical form of the target URL; doubles as the reverse-index key.
    pub original_url: String,
    pub created_at: SystemTime,
    /// Optional expiration time. Links are evicted on the first access after it.
    pub expires_at: Option<SystemTime>,
    /// Number of successful redirect resolutions.
    pub clicks: u64,
    /// Time of the most recent successful redirect resolution.
    pub last_accessed: Option<SystemTime>,
}

impl LinkRecord {
    /// Create a fresh record with no clicks.
    pub fn new(
        short_code: ShortCode,
        original_url: String,
        created_at: SystemTime,
        expires_at: Option<SystemTime>,
    ) -> Self {
        Self {
            short_code,
            original_url,
            created_at,
            expires_at,
            clicks: 0,
            last_accessed: None,
        }
    }

    /// True once `now` is strictly past the expiration time.
    pub fn is_expired(&self, now: SystemTime) -> bool {
        self.expires_at.is_some_and(|exp| now > exp)
    }

    /// Count one redirect at `now`.
    pub fn track_click(&mut self, now: SystemTime) {
        self.clicks = self.clicks.saturating_add(1);
        self.last_accessed = Some(now);
    }
}

/// Time source abstraction to make code testable.
pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;
}

impl<T: Clock + ?Sized> Clock for std::sync::Arc<T> {
    fn now(&self) -> SystemTime {
        (**self).now()
    }
}

/// Wall clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Short code generator interface.
pub trait CodeGenerator: Send + Sync {
    /// Draw one candidate code of exactly `len` symbols. Uniqueness is the
    /// caller's concern.
    fn generate(&self, len: usize) -> ShortCode;
}

/// Core domain errors.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("invalid short code: {0}")]
    InvalidCode(String),
    #[error("custom alias already in use: {0}")]
    AliasConflict(String),
    #[error("url already registered under code {0}")]
    UrlConflict(String),
    #[error("link not found")]
    NotFound,
    #[error("link has expired")]
    Expired,
    #[error("no free short code available")]
    CapacityExhausted,
    #[error("storage error: {0}")]
    Storage(String),
}

/// Return a short about/version line for the binary to print.
pub fn about() -> String {
    let pkg = env!("CARGO_PKG_NAME");
    let ver = env!("CARGO_PKG_VERSION");
    format!("{} v{} - link registry", pkg, ver)
}

pub mod canonical;
pub mod code;
pub mod registry;
