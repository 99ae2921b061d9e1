//! Redis allowlist backend.
//!
//! Entries are plain string keys written with `SETEX`, so Redis expires them
//! together with the refresh token. Every pool or command failure surfaces as
//! [`AuthError::CacheUnavailable`]; callers treat that as "cannot decide" and
//! reject the request.

use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Config, Connection, Pool, PoolConfig, Runtime};
use ::redis::AsyncCommands;

use super::{AllowlistBackend, AllowlistEntry};
use crate::AuthResult;
use crate::config::{CacheBackendKind, CacheConfig};
use crate::error::AuthError;

/// Redis allowlist backend.
#[derive(Clone)]
pub struct RedisAllowlist {
    pool: Pool,
}

impl RedisAllowlist {
    /// Creates the connection pool and checks that a connection can be made.
    ///
    /// # Errors
    /// Returns `AuthError::Configuration` if `cache.url` is missing, and
    /// `AuthError::CacheUnavailable` if the pool cannot be built or the first
    /// connection fails.
    pub async fn connect(config: &CacheConfig) -> AuthResult<Self> {
        let url = config
            .url
            .as_deref()
            .ok_or_else(|| AuthError::configuration("cache.url is required for redis"))?;

        tracing::info!(pool_size = config.pool_size, "Connecting to Redis allowlist");

        let timeout = config.timeout();
        let mut pool_config = PoolConfig::new(config.pool_size);
        pool_config.timeouts.wait = Some(timeout);
        pool_config.timeouts.create = Some(timeout);
        pool_config.timeouts.recycle = Some(timeout);

        let mut redis_config = Config::from_url(url);
        redis_config.pool = Some(pool_config);

        let pool = redis_config
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| {
                tracing::warn!(error = %e, "Failed to create Redis pool");
                AuthError::cache_unavailable(e.to_string())
            })?;

        let backend = Self { pool };
        backend.connection().await?;

        tracing::info!("Connected to Redis allowlist");
        Ok(backend)
    }

    /// Wraps an existing pool without testing it.
    #[must_use]
    pub fn from_pool(pool: Pool) -> Self {
        Self { pool }
    }

    async fn connection(&self) -> AuthResult<Connection> {
        self.pool.get().await.map_err(|e| {
            tracing::warn!(error = %e, "Failed to get Redis connection");
            AuthError::cache_unavailable(e.to_string())
        })
    }

    /// Collects the keys under `prefix` with `SCAN`, sorted and deduplicated.
    async fn keys(&self, conn: &mut Connection, prefix: &str) -> AuthResult<Vec<String>> {
        let pattern = format!("{}*", escape_glob(prefix));
        let mut iter = conn
            .scan_match::<_, String>(&pattern)
            .await
            .map_err(|e| command_failed("SCAN", prefix, e))?;

        let mut keys = Vec::new();
        while let Some(key) = iter.next_item().await {
            keys.push(key);
        }

        keys.sort();
        keys.dedup();
        Ok(keys)
    }
}

/// Escapes glob metacharacters so `prefix` matches literally in `SCAN MATCH`.
fn escape_glob(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len());
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

impl std::fmt::Debug for RedisAllowlist {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = self.pool.status();
        f.debug_struct("RedisAllowlist")
            .field("max_size", &status.max_size)
            .field("size", &status.size)
            .finish()
    }
}

fn command_failed(command: &str, key: &str, err: ::redis::RedisError) -> AuthError {
    tracing::warn!(command, key = %key, error = %err, "Redis command failed");
    AuthError::cache_unavailable(format!("{command} failed: {err}"))
}

#[async_trait]
impl AllowlistBackend for RedisAllowlist {
    fn kind(&self) -> CacheBackendKind {
        CacheBackendKind::Redis
    }

    async fn add(&self, key: &str, token_id: &str, ttl: Duration) -> AuthResult<()> {
        let mut conn = self.connection().await?;
        conn.set_ex::<_, _, ()>(key, token_id, ttl.as_secs().max(1))
            .await
            .map_err(|e| command_failed("SETEX", key, e))
    }

    async fn get(&self, key: &str) -> AuthResult<Option<String>> {
        let mut conn = self.connection().await?;
        conn.get::<_, Option<String>>(key)
            .await
            .map_err(|e| command_failed("GET", key, e))
    }

    async fn remove(&self, key: &str) -> AuthResult<()> {
        let mut conn = self.connection().await?;
        conn.del::<_, ()>(key)
            .await
            .map_err(|e| command_failed("DEL", key, e))
    }

    async fn list(&self, prefix: &str) -> AuthResult<Vec<AllowlistEntry>> {
        let mut conn = self.connection().await?;
        let keys = self.keys(&mut conn, prefix).await?;

        let mut entries = Vec::with_capacity(keys.len());
        for key in keys {
            let token_id: Option<String> = conn
                .get(&key)
                .await
                .map_err(|e| command_failed("GET", &key, e))?;
            let ttl: i64 = conn
                .ttl(&key)
                .await
                .map_err(|e| command_failed("TTL", &key, e))?;

            // expired between SCAN and GET
            let Some(token_id) = token_id else {
                continue;
            };

            entries.push(AllowlistEntry {
                key,
                token_id,
                ttl: u64::try_from(ttl).ok().map(Duration::from_secs),
            });
        }

        Ok(entries)
    }

    async fn reset(&self, prefix: &str) -> AuthResult<()> {
        let mut conn = self.connection().await?;
        let keys = self.keys(&mut conn, prefix).await?;
        if keys.is_empty() {
            return Ok(());
        }

        conn.del::<_, ()>(&keys)
            .await
            .map_err(|e| command_failed("DEL", prefix, e))
    }

    async fn close(&self) -> AuthResult<()> {
        self.pool.close();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allowlist::Allowlist;

    #[tokio::test]
    async fn test_unreachable_server_is_cache_unavailable() {
        let config = CacheConfig {
            backend: CacheBackendKind::Redis,
            url: Some("redis://127.0.0.1:1".to_string()),
            timeout_ms: 500,
            ..CacheConfig::default()
        };

        let err = RedisAllowlist::connect(&config).await.unwrap_err();
        assert!(matches!(err, AuthError::CacheUnavailable { .. }));
        assert!(err.is_server_error());

        let err = Allowlist::from_config(&config).await.unwrap_err();
        assert!(matches!(err, AuthError::CacheUnavailable { .. }));
    }

    #[test]
    fn test_escape_glob() {
        assert_eq!(escape_glob("cred:token:"), "cred:token:");
        assert_eq!(escape_glob("a*b?[c]"), "a\\*b\\?\\[c\\]");
        assert_eq!(escape_glob("x\\y"), "x\\\\y");
    }

    #[tokio::test]
    async fn test_missing_url_is_configuration_error() {
        let config = CacheConfig {
            backend: CacheBackendKind::Redis,
            url: None,
            ..CacheConfig::default()
        };

        let err = RedisAllowlist::connect(&config).await.unwrap_err();
        assert!(matches!(err, AuthError::Configuration { .. }));
    }
}
