//! In-process allowlist backed by a `moka` cache.
//!
//! Each entry expires after its own TTL. The cache is bounded; once full,
//! moka evicts entries by its admission policy, which makes the evicted
//! refresh tokens inactive early.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::Expiry;
use moka::future::Cache;

use super::{AllowlistBackend, AllowlistEntry};
use crate::AuthResult;
use crate::config::CacheBackendKind;
use crate::error::AuthError;

#[derive(Debug, Clone)]
struct StoredId {
    token_id: String,
    ttl: Duration,
    expires_at: Instant,
}

impl StoredId {
    fn remaining(&self, now: Instant) -> Option<Duration> {
        let left = self.expires_at.saturating_duration_since(now);
        (!left.is_zero()).then_some(left)
    }
}

struct PerEntryTtl;

impl Expiry<String, StoredId> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &StoredId,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &StoredId,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// Memory allowlist backend.
#[derive(Clone)]
pub struct MemoryAllowlist {
    cache: Cache<String, StoredId>,
}

impl MemoryAllowlist {
    /// Creates a backend holding at most `capacity` entries.
    #[must_use]
    pub fn new(capacity: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(capacity)
            .expire_after(PerEntryTtl)
            .build();

        Self { cache }
    }

    /// Returns the approximate number of stored entries.
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.cache
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.as_ref().clone())
            .collect()
    }
}

#[async_trait]
impl AllowlistBackend for MemoryAllowlist {
    fn kind(&self) -> CacheBackendKind {
        CacheBackendKind::Memory
    }

    async fn add(&self, key: &str, token_id: &str, ttl: Duration) -> AuthResult<()> {
        let now = Instant::now();
        let Some(expires_at) = now.checked_add(ttl) else {
            return Err(AuthError::configuration(format!(
                "allowlist TTL of {}s is out of range",
                ttl.as_secs()
            )));
        };

        let value = StoredId {
            token_id: token_id.to_string(),
            ttl,
            expires_at,
        };
        self.cache.insert(key.to_string(), value).await;
        Ok(())
    }

    async fn get(&self, key: &str) -> AuthResult<Option<String>> {
        let now = Instant::now();
        Ok(self
            .cache
            .get(key)
            .await
            .filter(|stored| stored.remaining(now).is_some())
            .map(|stored| stored.token_id))
    }

    async fn remove(&self, key: &str) -> AuthResult<()> {
        self.cache.invalidate(key).await;
        Ok(())
    }

    async fn list(&self, prefix: &str) -> AuthResult<Vec<AllowlistEntry>> {
        let now = Instant::now();
        let mut entries: Vec<AllowlistEntry> = self
            .cache
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .filter_map(|(key, stored)| {
                stored.remaining(now).map(|ttl| AllowlistEntry {
                    key: key.as_ref().clone(),
                    token_id: stored.token_id,
                    ttl: Some(ttl),
                })
            })
            .collect();

        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(entries)
    }

    async fn reset(&self, prefix: &str) -> AuthResult<()> {
        for key in self.keys_with_prefix(prefix) {
            self.cache.invalidate(&key).await;
        }
        self.cache.run_pending_tasks().await;
        Ok(())
    }

    async fn close(&self) -> AuthResult<()> {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
        Ok(())
    }
}
