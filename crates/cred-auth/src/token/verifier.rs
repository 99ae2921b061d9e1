//! Token verification.
//!
//! Checks run in a fixed order and stop at the first failure:
//!
//! 1. signature, issuer, algorithm and expiry (delegated to the signer)
//! 2. presence of `jti`
//! 3. `sub` matches the kind of token the caller expects
//! 4. refresh tokens only: the `jti` is still in the allowlist

use std::sync::Arc;

use super::claims::{Claims, Subject};
use super::signer::TokenSigner;
use crate::AuthResult;
use crate::allowlist::Allowlist;
use crate::error::{AuthError, InvalidTokenReason};

/// Verifies access and refresh tokens for one issuer.
#[derive(Clone)]
pub struct Verifier {
    issuer: String,
    access: Arc<dyn TokenSigner>,
    refresh: Arc<dyn TokenSigner>,
    allowlist: Allowlist,
}

impl Verifier {
    /// Creates a new verifier.
    #[must_use]
    pub fn new(
        issuer: impl Into<String>,
        access: Arc<dyn TokenSigner>,
        refresh: Arc<dyn TokenSigner>,
        allowlist: Allowlist,
    ) -> Self {
        Self {
            issuer: issuer.into(),
            access,
            refresh,
            allowlist,
        }
    }

    /// Verifies a token of the expected kind and returns its claims.
    ///
    /// # Errors
    /// - `InvalidToken` with the rejection reason
    /// - `TokenRevoked` if a refresh token is no longer allowlisted
    /// - `CacheUnavailable` if the allowlist cannot be queried
    pub async fn verify(&self, token: &str, expected: Subject) -> AuthResult<Claims> {
        let signer = match expected {
            Subject::Access => &self.access,
            Subject::Refresh => &self.refresh,
        };

        let claims = signer.verify(token, &self.issuer).await.map_err(|e| {
            tracing::debug!(expected = %expected, error = %e, "Token rejected by signer");
            AuthError::from(e)
        })?;

        if !claims.has_token_id() {
            tracing::debug!(expected = %expected, "Token has no jti");
            return Err(AuthError::invalid_token(
                InvalidTokenReason::MissingTokenId,
                "token has no jti claim",
            ));
        }

        if claims.sub != expected {
            tracing::debug!(jti = %claims.jti, sub = %claims.sub, expected = %expected, "Token subject mismatch");
            return Err(AuthError::invalid_token(
                InvalidTokenReason::WrongSubject,
                format!("expected {expected} token, got {}", claims.sub),
            ));
        }

        if expected.is_refresh() && !self.allowlist.is_active(&claims.jti).await? {
            tracing::debug!(jti = %claims.jti, "Refresh token not in allowlist");
            return Err(AuthError::TokenRevoked);
        }

        Ok(claims)
    }

    /// Verifies an access token.
    ///
    /// # Errors
    /// See [`verify`](Self::verify).
    pub async fn verify_access(&self, token: &str) -> AuthResult<Claims> {
        self.verify(token, Subject::Access).await
    }

    /// Verifies a refresh token, including the allowlist check.
    ///
    /// # Errors
    /// See [`verify`](Self::verify).
    pub async fn verify_refresh(&self, token: &str) -> AuthResult<Claims> {
        self.verify(token, Subject::Refresh).await
    }
}
