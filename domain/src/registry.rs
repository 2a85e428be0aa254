//! The link registry: one lock around both indexes.
//!
//! `by_code` maps a short code to its record and `by_url` maps the canonical
//! URL back to the code. Every mutation touches both under the same write
//! guard, so no caller can observe one index without the other. Expired
//! records are evicted lazily, on the first access that notices them.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::SystemTime;

use tracing::{debug, warn};

use crate::canonical::{canonicalize, validate_alias};
use crate::code::MAX_CODE_LEN;
use crate::{Clock, CodeGenerator, CoreError, LinkRecord, LinkUpdate, NewLink, ShortCode};

/// Code generation tuning.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Length of generated codes while the space is sparse.
    pub code_length: usize,
    /// Generated codes never grow beyond this length.
    pub max_code_length: usize,
    /// Collisions tolerated at one length before widening by one symbol.
    pub attempts_per_length: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            code_length: 6,
            max_code_length: 12,
            attempts_per_length: 8,
        }
    }
}

impl RegistryConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !(1..=MAX_CODE_LEN).contains(&self.code_length) {
            return Err(format!("code length must be 1-{}", MAX_CODE_LEN));
        }
        if self.max_code_length < self.code_length || self.max_code_length > MAX_CODE_LEN {
            return Err(format!(
                "max code length must be between code length and {}",
                MAX_CODE_LEN
            ));
        }
        if self.attempts_per_length == 0 {
            return Err("attempts per length must be at least 1".into());
        }
        Ok(())
    }
}

#[derive(Default)]
struct Indexes {
    by_code: HashMap<ShortCode, LinkRecord>,
    by_url: HashMap<String, ShortCode>,
}

impl Indexes {
    fn insert(&mut self, record: LinkRecord) {
        self.by_url
            .insert(record.original_url.clone(), record.short_code.clone());
        self.by_code.insert(record.short_code.clone(), record);
    }

    fn remove(&mut self, code: &ShortCode) -> Option<LinkRecord> {
        let record = self.by_code.remove(code)?;
        if self.by_url.get(&record.original_url) == Some(code) {
            self.by_url.remove(&record.original_url);
        }
        Some(record)
    }

    /// Exact key first, then the canonical form of `raw`. Unparseable input
    /// simply yields no match.
    fn code_for_url(&self, raw: &str) -> Option<ShortCode> {
        if let Some(code) = self.by_url.get(raw) {
            return Some(code.clone());
        }
        let canonical = canonicalize(raw).ok()?;
        self.by_url.get(&canonical).cloned()
    }

    /// Borrow a live record, evicting it first if it has expired.
    fn live_mut(
        &mut self,
        code: &ShortCode,
        now: SystemTime,
    ) -> Result<&mut LinkRecord, CoreError> {
        let expired = match self.by_code.get(code) {
            None => return Err(CoreError::NotFound),
            Some(record) => record.is_expired(now),
        };
        if expired {
            self.remove(code);
            debug!(code = %code, "evicted expired link");
            return Err(CoreError::Expired);
        }
        self.by_code.get_mut(code).ok_or(CoreError::NotFound)
    }

    /// True when `code` names a record nobody may take over.
    fn is_taken(&mut self, code: &ShortCode, now: SystemTime) -> Result<bool, CoreError> {
        match self.live_mut(code, now) {
            Ok(_) => Ok(true),
            Err(CoreError::NotFound | CoreError::Expired) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// In-memory registry of short links.
///
/// Generic over the code generator and clock so tests can force collisions
/// and expirations. Construct one and share it (for example behind an `Arc`)
/// with every caller.
pub struct LinkRegistry<G: CodeGenerator, C: Clock> {
    state: RwLock<Indexes>,
    generator: G,
    clock: C,
    config: RegistryConfig,
}

impl<G: CodeGenerator, C: Clock> LinkRegistry<G, C> {
    pub fn new(generator: G, clock: C) -> Self {
        Self::with_config(generator, clock, RegistryConfig::default())
    }

    pub fn with_config(generator: G, clock: C, config: RegistryConfig) -> Self {
        Self {
            state: RwLock::new(Indexes::default()),
            generator,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Indexes>, CoreError> {
        self.state
            .read()
            .map_err(|_| CoreError::Storage("registry lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Indexes>, CoreError> {
        self.state
            .write()
            .map_err(|_| CoreError::Storage("registry lock poisoned".into()))
    }

    /// Register `input.original_url`, or return the record that already
    /// holds it. An existing registration wins over any alias or expiration
    /// in the request.
    pub fn create_or_get(&self, input: NewLink) -> Result<LinkRecord, CoreError> {
        let url = canonicalize(&input.original_url)?;
        let now = self.clock.now();
        let mut guard = self.write()?;
        let state = &mut *guard;

        if let Some(code) = state.by_url.get(&url).cloned() {
            match state.live_mut(&code, now) {
                Ok(existing) => return Ok(existing.clone()),
                Err(CoreError::NotFound | CoreError::Expired) => {}
                Err(e) => return Err(e),
            }
        }

        // Only a new registration cares about the alias.
        let alias = input
            .custom_alias
            .as_deref()
            .map(validate_alias)
            .transpose()?;
        let code = match alias {
            Some(alias) => {
                if state.is_taken(&alias, now)? {
                    return Err(CoreError::AliasConflict(alias.to_string()));
                }
                alias
            }
            None => self.fresh_code(state)?,
        };

        let record = LinkRecord::new(code, url, now, input.expires_at);
        state.insert(record.clone());
        debug!(code = %record.short_code, url = %record.original_url, "registered link");
        Ok(record)
    }

    /// Draw codes until one is free, widening the length after
    /// `attempts_per_length` collisions in a row.
    fn fresh_code(&self, state: &Indexes) -> Result<ShortCode, CoreError> {
        let mut len = self.config.code_length;
        loop {
            for _ in 0..self.config.attempts_per_length {
                let candidate = self.generator.generate(len);
                if !state.by_code.contains_key(&candidate) {
                    return Ok(candidate);
                }
            }
            if len >= self.config.max_code_length {
                warn!(len, "short code space exhausted");
                return Err(CoreError::CapacityExhausted);
            }
            len += 1;
            debug!(len, "widening generated code length after collisions");
        }
    }

    /// Look a link up by its target URL, raw or canonical.
    pub fn find_by_url(&self, raw: &str) -> Result<LinkRecord, CoreError> {
        let now = self.clock.now();
        {
            let state = self.read()?;
            let code = state.code_for_url(raw).ok_or(CoreError::NotFound)?;
            match state.by_code.get(&code) {
                Some(record) if !record.is_expired(now) => return Ok(record.clone()),
                Some(_) => {}
                None => return Err(CoreError::NotFound),
            }
        }
        // Expired: re-check under the write guard and evict.
        let mut state = self.write()?;
        let code = state.code_for_url(raw).ok_or(CoreError::NotFound)?;
        match state.live_mut(&code, now) {
            Ok(record) => Ok(record.clone()),
            Err(CoreError::Expired) => Err(CoreError::NotFound),
            Err(e) => Err(e),
        }
    }

    /// Resolve a code for redirection, counting the click.
    pub fn resolve_and_track(&self, code: &ShortCode) -> Result<LinkRecord, CoreError> {
        let now = self.clock.now();
        let mut state = self.write()?;
        let record = state.live_mut(code, now)?;
        record.track_click(now);
        Ok(record.clone())
    }

    /// Read a link without touching its statistics.
    pub fn get_info(&self, code: &ShortCode) -> Result<LinkRecord, CoreError> {
        let now = self.clock.now();
        {
            let state = self.read()?;
            match state.by_code.get(code) {
                None => return Err(CoreError::NotFound),
                Some(record) if !record.is_expired(now) => return Ok(record.clone()),
                Some(_) => {}
            }
        }
        let mut state = self.write()?;
        state.live_mut(code, now).cloned()
    }

    /// Point an existing code at a new URL and optionally change its
    /// expiration. Fails with `UrlConflict` if another live code already
    /// owns the new URL.
    pub fn update(&self, code: &ShortCode, update: LinkUpdate) -> Result<LinkRecord, CoreError> {
        let url = canonicalize(&update.original_url)?;
        let now = self.clock.now();
        let mut guard = self.write()?;
        let state = &mut *guard;

        let old_url = state.live_mut(code, now)?.original_url.clone();
        if url != old_url {
            if let Some(owner) = state.by_url.get(&url).cloned() {
                if state.is_taken(&owner, now)? {
                    return Err(CoreError::UrlConflict(owner.to_string()));
                }
            }
        }

        state.by_url.remove(&old_url);
        let record = state.by_code.get_mut(code).ok_or(CoreError::NotFound)?;
        record.original_url = url.clone();
        record.expires_at = update.expires_at.apply(record.expires_at);
        let updated = record.clone();
        state.by_url.insert(url, code.clone());
        Ok(updated)
    }

    /// Remove a link from both indexes, returning the removed record.
    pub fn delete(&self, code: &ShortCode) -> Result<LinkRecord, CoreError> {
        let now = self.clock.now();
        let mut state = self.write()?;
        state.live_mut(code, now)?;
        state.remove(code).ok_or(CoreError::NotFound)
    }

    /// Live links, newest first, up to `limit`. Expired links found along
    /// the way are evicted.
    pub fn list(&self, limit: usize) -> Result<Vec<LinkRecord>, CoreError> {
        let now = self.clock.now();
        let mut items: Vec<LinkRecord> = {
            let state = self.read()?;
            state.by_code.values().cloned().collect()
        };

        if items.iter().any(|r| r.is_expired(now)) {
            let mut state = self.write()?;
            // Re-check under the write guard; another caller may have evicted.
            let expired: Vec<ShortCode> = state
                .by_code
                .values()
                .filter(|r| r.is_expired(now))
                .map(|r| r.short_code.clone())
                .collect();
            for code in &expired {
                state.remove(code);
            }
            debug!(count = expired.len(), "evicted expired links while listing");
            items = state.by_code.values().cloned().collect();
        }


        items.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.short_code.cmp(&b.short_code))
        });
        items.truncate(limit);
        Ok(items)
    }

    /// Number of stored records, including expired ones not yet evicted.
    pub fn len(&self) -> Result<usize, CoreError> {
        Ok(self.read()?.by_code.len())
    }

    pub fn is_empty(&self) -> Result<bool, CoreError> {
        Ok(self.len()? == 0)
    }

    #[cfg(test)]
    fn is_consistent(&self) -> bool {
        let Ok(state) = self.read() else {
            return false;
        };
        state.by_code.len() == state.by_url.len()
            && state
                .by_code
                .iter()
                .all(|(code, r)| {
                    &r.short_code == code && state.by_url.get(&r.original_url) == Some(code)
                })
    }
}
