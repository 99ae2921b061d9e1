//! The `Cred` service: one issuer configuration with its allowlist and
//! strategies.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use cred_auth::{Cred, CredConfig};
//!
//! let cred = Arc::new(Cred::from_config(CredConfig::with_secrets("a", "r")).await?);
//! cred.use_strategy("password", password_strategy)?;
//!
//! let ctx = cred.authenticate("password", &request).await?;
//! let pair = cred.refresh(&ctx.tokens.refresh_token).await?;
//! ```

use std::sync::Arc;

use crate::AuthResult;
use crate::allowlist::{Allowlist, AllowlistEntry};
use crate::config::CredConfig;
use crate::context::{AuthContext, VerifiedToken};
use crate::error::AuthError;
use crate::guard::AuthRequest;
use crate::strategy::{Strategy, StrategyRegistry};
use crate::token::{
    Claims, IssuedTokens, JwtSigner, Payload, Subject, TokenIssuer, TokenPair, TokenSettings,
    TokenSigner, Verifier, decode_unverified, sanitize,
};

/// Token issuer, verifier, allowlist and strategy registry for one issuer.
///
/// Shared as `Arc<Cred>`; every method takes `&self`.
pub struct Cred {
    key: String,
    issuer: TokenIssuer,
    verifier: Verifier,
    allowlist: Allowlist,
    strategies: StrategyRegistry,
}

impl std::fmt::Debug for Cred {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cred")
            .field("key", &self.key)
            .field("issuer", &self.issuer.issuer())
            .field("allowlist", &self.allowlist)
            .field("strategies", &self.strategies.names())
            .finish()
    }
}

// =============================================================================
// Construction
// =============================================================================

impl Cred {
    /// Creates a service from an issuer and an allowlist.
    ///
    /// The verifier uses the issuer's access and refresh signers.
    #[must_use]
    pub fn new(key: impl Into<String>, issuer: TokenIssuer, allowlist: Allowlist) -> Self {
        let verifier = Verifier::new(
            issuer.issuer(),
            Arc::clone(&issuer.settings(Subject::Access).signer),
            Arc::clone(&issuer.settings(Subject::Refresh).signer),
            allowlist.clone(),
        );

        Self {
            key: key.into(),
            issuer,
            verifier,
            allowlist,
            strategies: StrategyRegistry::new(),
        }
    }

    /// Validates the configuration, builds both signers and connects the
    /// allowlist backend.
    ///
    /// # Errors
    /// - `Configuration` if the configuration is invalid or a key cannot be
    ///   parsed
    /// - `CacheUnavailable` if the Redis backend cannot be reached
    pub async fn from_config(config: CredConfig) -> AuthResult<Self> {
        config.validate()?;

        let access = signer_from_config(&config, Subject::Access)?;
        let refresh = signer_from_config(&config, Subject::Refresh)?;
        let allowlist = Allowlist::from_config(&config.cache).await?;

        let issuer = TokenIssuer::new(
            config.issuer.clone(),
            TokenSettings::new(access, config.access_expires_in()),
            TokenSettings::new(refresh, config.refresh_expires_in()),
        );

        tracing::info!(
            key = %config.key,
            issuer = %config.issuer,
            access_algorithm = %config.access.algorithm,
            refresh_algorithm = %config.refresh.algorithm,
            backend = ?config.cache.backend,
            "Token service initialized"
        );

        Ok(Self::new(config.key, issuer, allowlist))
    }

    /// Returns the service name.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the `iss` value.
    #[must_use]
    pub fn issuer(&self) -> &str {
        self.issuer.issuer()
    }

    /// Returns the refresh-token allowlist.
    #[must_use]
    pub fn allowlist(&self) -> &Allowlist {
        &self.allowlist
    }

    /// Returns the token issuer.
    #[must_use]
    pub fn token_issuer(&self) -> &TokenIssuer {
        &self.issuer
    }

    /// Returns the verifier.
    #[must_use]
    pub fn verifier(&self) -> &Verifier {
        &self.verifier
    }
}

fn signer_from_config(config: &CredConfig, subject: Subject) -> AuthResult<Arc<dyn TokenSigner>> {
    let keys = match subject {
        Subject::Access => &config.access,
        Subject::Refresh => &config.refresh,
    };

    let signer = JwtSigner::from_config(keys)
        .map_err(|e| AuthError::configuration(format!("Invalid {subject} token key: {e}")))?;
    Ok(Arc::new(signer))
}

// =============================================================================
// Strategies
// =============================================================================

impl Cred {
    /// Registers a strategy under `name`, replacing any previous one.
    ///
    /// # Errors
    /// Returns `Configuration` if `name` is empty.
    pub fn use_strategy(&self, name: &str, strategy: impl Strategy + 'static) -> AuthResult<()> {
        self.strategies.insert(name, Arc::new(strategy))
    }

    /// Unregisters a strategy. Returns `true` if it existed.
    pub fn unuse_strategy(&self, name: &str) -> bool {
        let removed = self.strategies.remove(name);
        if removed {
            tracing::info!(strategy = %name, "Strategy removed");
        }
        removed
    }

    /// Returns the registered strategy names, sorted.
    #[must_use]
    pub fn strategies(&self) -> Vec<String> {
        self.strategies.names()
    }

    /// Runs the named strategy and issues tokens for the payload it returns.
    ///
    /// The refresh token is registered in the allowlist before returning.
    ///
    /// # Errors
    /// - `Configuration` if no strategy is registered under `name`
    /// - `Authentication` if the strategy rejects the request
    /// - `Signing` or `CacheUnavailable` if issuing or registering fails
    pub async fn authenticate(&self, name: &str, request: &AuthRequest) -> AuthResult<AuthContext> {
        let strategy = self
            .strategies
            .get(name)
            .ok_or_else(|| AuthError::configuration(format!("Strategy \"{name}\" not defined")))?;

        let payload = strategy.authenticate(request).await.map_err(|e| {
            tracing::debug!(strategy = %name, error = %e, "Strategy rejected request");
            AuthError::authentication(e.to_string())
        })?;

        let issued = self.issuer.create_tokens(payload).await?;
        let refresh = self
            .allowlist
            .register_token(&issued.tokens.refresh_token)
            .await?;

        tracing::info!(strategy = %name, jti = %refresh.jti, "Tokens issued");

        Ok(AuthContext {
            strategy: name.to_string(),
            payload: issued.payload,
            tokens: issued.tokens,
        })
    }
}

// =============================================================================
// Tokens
// =============================================================================

impl Cred {
    /// Creates an access token.
    ///
    /// # Errors
    /// Returns `Signing` on signer failure.
    pub async fn create_access_token(&self, payload: &Payload) -> AuthResult<String> {
        self.issuer.create_access_token(payload).await
    }

    /// Creates a refresh token without registering it.
    ///
    /// # Errors
    /// Returns `Signing` on signer failure.
    pub async fn create_refresh_token(&self, payload: &Payload) -> AuthResult<String> {
        self.issuer.create_refresh_token(payload).await
    }

    /// Creates an access/refresh pair without registering the refresh token.
    ///
    /// # Errors
    /// Returns `Signing` on signer failure.
    pub async fn create_tokens(&self, payload: Payload) -> AuthResult<IssuedTokens> {
        self.issuer.create_tokens(payload).await
    }

    /// Registers a refresh token in the allowlist until it expires.
    ///
    /// # Errors
    /// Returns `InvalidToken` if the token has no `jti`, or
    /// `CacheUnavailable` on backend failure.
    pub async fn register_token(&self, token: &str) -> AuthResult<Claims> {
        self.allowlist.register_token(token).await
    }

    /// Removes a refresh token from the allowlist.
    ///
    /// # Errors
    /// Returns `InvalidToken` if the token has no `jti`, or
    /// `CacheUnavailable` on backend failure.
    pub async fn revoke_token(&self, token: &str) -> AuthResult<Claims> {
        self.allowlist.revoke_token(token).await
    }

    /// Returns the claims of a refresh token that is still allowlisted.
    ///
    /// # Errors
    /// Returns `TokenRevoked` if it is not.
    pub async fn verify_active(&self, token: &str) -> AuthResult<Claims> {
        self.allowlist.verify_active(token).await
    }

    /// Verifies a token of the expected kind.
    ///
    /// # Errors
    /// See [`Verifier::verify`].
    pub async fn verify(&self, token: &str, expected: Subject) -> AuthResult<Claims> {
        self.verifier.verify(token, expected).await
    }

    /// Lists the live allowlist entries.
    ///
    /// # Errors
    /// Returns `CacheUnavailable` on backend failure.
    pub async fn list_allowlist(&self) -> AuthResult<Vec<AllowlistEntry>> {
        self.allowlist.list().await
    }

    /// Revokes every refresh token of this service.
    ///
    /// # Errors
    /// Returns `CacheUnavailable` on backend failure.
    pub async fn reset_allowlist(&self) -> AuthResult<()> {
        self.allowlist.reset().await
    }

    /// Releases the allowlist backend.
    ///
    /// # Errors
    /// Returns `CacheUnavailable` on backend failure.
    pub async fn close(&self) -> AuthResult<()> {
        self.allowlist.close().await?;
        tracing::info!(key = %self.key, "Token service closed");
        Ok(())
    }
}

// =============================================================================
// Refresh
// =============================================================================

impl Cred {
    /// Rotates a refresh token: issues a new pair from the old token's
    /// payload, revokes the old token and registers the new refresh token.
    ///
    /// The old token is decoded, not verified. Run
    /// [`require_refresh_token`](Self::require_refresh_token) first.
    ///
    /// The new access token carries the refresh token's payload, which has no
    /// `permissions`. Use [`refresh_with`](Self::refresh_with) to add them.
    ///
    /// # Errors
    /// Returns `Refresh` wrapping the failure that aborted the rotation.
    pub async fn refresh(&self, old_refresh_token: &str) -> AuthResult<TokenPair> {
        self.refresh_with(old_refresh_token, |payload| payload).await
    }

    /// Like [`refresh`](Self::refresh), passing the recovered payload through
    /// `enrich` before the new tokens are created.
    ///
    /// # Errors
    /// Returns `Refresh` wrapping the failure that aborted the rotation.
    pub async fn refresh_with<F>(&self, old_refresh_token: &str, enrich: F) -> AuthResult<TokenPair>
    where
        F: FnOnce(Payload) -> Payload + Send,
    {
        self.rotate(old_refresh_token, enrich).await.map_err(|e| {
            tracing::debug!(error = %e, "Refresh rotation failed");
            AuthError::refresh(e)
        })
    }

    async fn rotate<F>(&self, old_refresh_token: &str, enrich: F) -> AuthResult<TokenPair>
    where
        F: FnOnce(Payload) -> Payload + Send,
    {
        let old = decode_unverified(old_refresh_token)?;
        let old_jti = old.jti.clone();
        let payload = enrich(sanitize(&old.into_payload(), false));

        let issued = self.issuer.create_tokens(payload).await?;

        // the old token must be gone before the new one becomes usable
        self.allowlist.revoke(&old_jti).await?;
        let new = self
            .allowlist
            .register_token(&issued.tokens.refresh_token)
            .await?;

        tracing::info!(old_jti = %old_jti, new_jti = %new.jti, "Refresh token rotated");
        Ok(issued.tokens)
    }
}

// =============================================================================
// Guards
// =============================================================================

impl Cred {
    /// Extracts and verifies a token of the given kind from a request.
    ///
    /// # Errors
    /// - `NoToken` if the request carries no token
    /// - `Unauthorized` wrapping any client-side verification failure
    /// - `CacheUnavailable` unwrapped if the allowlist cannot be queried
    pub async fn require_valid_token(
        &self,
        expected: Subject,
        request: &AuthRequest,
    ) -> AuthResult<VerifiedToken> {
        let token = request.token().ok_or(AuthError::NoToken)?;

        let claims = self
            .verifier
            .verify(token, expected)
            .await
            .map_err(|e| {
                if e.is_server_error() {
                    e
                } else {
                    AuthError::unauthorized(e)
                }
            })?;

        Ok(VerifiedToken::new(claims, token))
    }

    /// Requires a valid access token.
    ///
    /// # Errors
    /// See [`require_valid_token`](Self::require_valid_token).
    pub async fn require_access_token(&self, request: &AuthRequest) -> AuthResult<VerifiedToken> {
        self.require_valid_token(Subject::Access, request).await
    }

    /// Requires a valid, allowlisted refresh token.
    ///
    /// # Errors
    /// See [`require_valid_token`](Self::require_valid_token).
    pub async fn require_refresh_token(&self, request: &AuthRequest) -> AuthResult<VerifiedToken> {
        self.require_valid_token(Subject::Refresh, request).await
    }
}
