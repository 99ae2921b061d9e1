//! Refresh-token allowlist.
//!
//! A refresh token is considered active exactly when an entry keyed by its
//! `jti` exists in the allowlist. Entries expire together with the token and
//! are deleted on revocation. Only the `jti` is stored, never the token.
//!
//! Two interchangeable backends implement [`AllowlistBackend`]:
//!
//! - [`MemoryAllowlist`]: per-process `moka` cache, bounded capacity
//! - [`RedisAllowlist`]: shared Redis server through a `deadpool-redis` pool
//!
//! The backend is chosen once when the [`Allowlist`] is constructed.

pub mod memory;
pub mod redis;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::AuthResult;
use crate::config::{CacheBackendKind, CacheConfig};
use crate::error::{AuthError, InvalidTokenReason};
use crate::token::{Claims, decode_unverified};

pub use self::memory::MemoryAllowlist;
pub use self::redis::RedisAllowlist;

/// Longest lifetime an entry is stored for (100 years). Longer TTLs are
/// clamped to it.
pub const MAX_ENTRY_TTL: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// One live allowlist entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowlistEntry {
    /// Full storage key, `<namespace>:<jti>`.
    pub key: String,
    /// The stored token id.
    pub token_id: String,
    /// Remaining lifetime, if the backend reports one.
    pub ttl: Option<Duration>,
}

/// Storage for allowlist entries.
///
/// Backends receive fully-qualified keys and only ever see positive TTLs.
#[async_trait]
pub trait AllowlistBackend: Send + Sync {
    /// Which backend this is.
    fn kind(&self) -> CacheBackendKind;

    /// Stores `token_id` under `key` for `ttl`, replacing any existing entry.
    async fn add(&self, key: &str, token_id: &str, ttl: Duration) -> AuthResult<()>;

    /// Returns the stored token id, or `None` if absent or expired.
    async fn get(&self, key: &str) -> AuthResult<Option<String>>;

    /// Deletes an entry. Deleting a missing key is not an error.
    async fn remove(&self, key: &str) -> AuthResult<()>;

    /// Returns every live entry whose key starts with `prefix`.
    async fn list(&self, prefix: &str) -> AuthResult<Vec<AllowlistEntry>>;

    /// Deletes every entry whose key starts with `prefix`.
    async fn reset(&self, prefix: &str) -> AuthResult<()>;

    /// Releases backend resources.
    async fn close(&self) -> AuthResult<()>;
}

/// Namespaced allowlist over a backend.
#[derive(Clone)]
pub struct Allowlist {
    namespace: String,
    backend: Arc<dyn AllowlistBackend>,
}

impl std::fmt::Debug for Allowlist {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Allowlist")
            .field("namespace", &self.namespace)
            .field("backend", &self.backend.kind())
            .finish()
    }
}

impl Allowlist {
    /// Creates an allowlist over an existing backend.
    #[must_use]
    pub fn new(namespace: impl Into<String>, backend: Arc<dyn AllowlistBackend>) -> Self {
        Self {
            namespace: namespace.into(),
            backend,
        }
    }

    /// Creates an in-memory allowlist with the default namespace.
    #[must_use]
    pub fn in_memory(capacity: u64) -> Self {
        Self::new(
            crate::config::DEFAULT_NAMESPACE,
            Arc::new(MemoryAllowlist::new(capacity)),
        )
    }

    /// Builds the configured backend.
    ///
    /// An unreachable Redis server is an error; there is no fallback to the
    /// memory backend since that would silently split the allowlist.
    ///
    /// # Errors
    /// Returns `AuthError::CacheUnavailable` if the Redis pool cannot connect.
    pub async fn from_config(config: &CacheConfig) -> AuthResult<Self> {
        let backend: Arc<dyn AllowlistBackend> = match config.backend {
            CacheBackendKind::Memory => {
                tracing::info!(capacity = config.capacity, "Using in-memory allowlist");
                Arc::new(MemoryAllowlist::new(config.capacity))
            }
            CacheBackendKind::Redis => Arc::new(RedisAllowlist::connect(config).await?),
        };

        Ok(Self::new(config.namespace.clone(), backend))
    }

    /// Returns the key namespace.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Returns the backend kind.
    #[must_use]
    pub fn backend_kind(&self) -> CacheBackendKind {
        self.backend.kind()
    }

    /// Returns the storage key for a token id.
    #[must_use]
    pub fn key(&self, token_id: &str) -> String {
        format!("{}:{}", self.namespace, token_id)
    }

    fn prefix(&self) -> String {
        format!("{}:", self.namespace)
    }

    /// Marks a token id as active for `ttl_secs` seconds.
    ///
    /// A non-positive TTL leaves the token inactive and removes any entry
    /// already stored for it. TTLs above [`MAX_ENTRY_TTL`] are clamped.
    ///
    /// # Errors
    /// Returns `InvalidToken(MissingTokenId)` for an empty id, or
    /// `CacheUnavailable` on backend failure.
    pub async fn register(&self, token_id: &str, ttl_secs: i64) -> AuthResult<()> {
        let key = self.checked_key(token_id)?;

        let secs = u64::try_from(ttl_secs).unwrap_or(0);
        if secs == 0 {
            tracing::debug!(jti = %token_id, ttl_secs, "Token already expired, not registering");
            return self.backend.remove(&key).await;
        }

        let ttl = Duration::from_secs(secs).min(MAX_ENTRY_TTL);
        self.backend.add(&key, token_id, ttl).await?;
        tracing::debug!(jti = %token_id, ttl_secs, "Refresh token registered");
        Ok(())
    }

    /// Removes a token id. Revoking an unknown id succeeds.
    ///
    /// # Errors
    /// Returns `InvalidToken(MissingTokenId)` for an empty id, or
    /// `CacheUnavailable` on backend failure.
    pub async fn revoke(&self, token_id: &str) -> AuthResult<()> {
        let key = self.checked_key(token_id)?;
        self.backend.remove(&key).await?;
        tracing::debug!(jti = %token_id, "Refresh token revoked");
        Ok(())
    }

    /// Returns `true` if the token id is registered and not expired.
    ///
    /// # Errors
    /// Returns `InvalidToken(MissingTokenId)` for an empty id, or
    /// `CacheUnavailable` on backend failure.
    pub async fn is_active(&self, token_id: &str) -> AuthResult<bool> {
        let key = self.checked_key(token_id)?;
        let stored = self.backend.get(&key).await?;
        Ok(stored.as_deref() == Some(token_id))
    }

    /// Lists every live entry in this namespace.
    ///
    /// # Errors
    /// Returns `CacheUnavailable` on backend failure.
    pub async fn list(&self) -> AuthResult<Vec<AllowlistEntry>> {
        self.backend.list(&self.prefix()).await
    }

    /// Removes every entry in this namespace.
    ///
    /// # Errors
    /// Returns `CacheUnavailable` on backend failure.
    pub async fn reset(&self) -> AuthResult<()> {
        self.backend.reset(&self.prefix()).await?;
        tracing::info!(namespace = %self.namespace, "Allowlist reset");
        Ok(())
    }

    /// Closes the backend.
    ///
    /// # Errors
    /// Returns `CacheUnavailable` on backend failure.
    pub async fn close(&self) -> AuthResult<()> {
        self.backend.close().await
    }

    /// Registers a token by its own `jti` with TTL `exp - now`.
    ///
    /// The signature is not checked; only pass tokens this process issued or
    /// already verified.
    ///
    /// # Errors
    /// Returns `InvalidToken` if the token cannot be decoded or has no `jti`,
    /// or `CacheUnavailable` on backend failure.
    pub async fn register_token(&self, token: &str) -> AuthResult<Claims> {
        let claims = Self::identified_claims(token)?;
        let ttl = claims.exp - OffsetDateTime::now_utc().unix_timestamp();
        self.register(&claims.jti, ttl).await?;
        Ok(claims)
    }

    /// Revokes a token by its own `jti`.
    ///
    /// # Errors
    /// Returns `InvalidToken` if the token cannot be decoded or has no `jti`,
    /// or `CacheUnavailable` on backend failure.
    pub async fn revoke_token(&self, token: &str) -> AuthResult<Claims> {
        let claims = Self::identified_claims(token)?;
        self.revoke(&claims.jti).await?;
        Ok(claims)
    }

    /// Returns the token's claims if its `jti` is active.
    ///
    /// # Errors
    /// Returns `TokenRevoked` if the token is not in the allowlist,
    /// `InvalidToken` if it cannot be decoded, or `CacheUnavailable` on
    /// backend failure.
    pub async fn verify_active(&self, token: &str) -> AuthResult<Claims> {
        let claims = Self::identified_claims(token)?;
        if self.is_active(&claims.jti).await? {
            Ok(claims)
        } else {
            Err(AuthError::TokenRevoked)
        }
    }

    fn checked_key(&self, token_id: &str) -> AuthResult<String> {
        if token_id.is_empty() {
            return Err(missing_token_id());
        }
        Ok(self.key(token_id))
    }

    fn identified_claims(token: &str) -> AuthResult<Claims> {
        let claims = decode_unverified(token)?;
        if !claims.has_token_id() {
            return Err(missing_token_id());
        }
        Ok(claims)
    }
}

fn missing_token_id() -> AuthError {
    AuthError::invalid_token(InvalidTokenReason::MissingTokenId, "token has no jti claim")
}
