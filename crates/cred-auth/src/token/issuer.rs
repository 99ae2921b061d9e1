//! Access and refresh token issuance.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::claims::{Claims, Payload, Subject, sanitize};
use super::signer::TokenSigner;
use crate::AuthResult;
use crate::error::AuthError;

/// A freshly issued access/refresh pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    /// Short-lived token carrying permissions.
    pub access_token: String,
    /// Long-lived token used to obtain a new pair.
    pub refresh_token: String,
}

/// Result of [`TokenIssuer::create_tokens`].
#[derive(Debug, Clone)]
pub struct IssuedTokens {
    /// The payload the tokens were created from, before sanitization.
    pub payload: Payload,
    /// The signed tokens.
    pub tokens: TokenPair,
}

/// Everything needed to create a single token.
pub struct TokenSpec<'a> {
    /// Caller-supplied claims; reserved names are stripped.
    pub payload: &'a Payload,
    /// Value of `iss`.
    pub issuer: &'a str,
    /// Which kind of token to create.
    pub subject: Subject,
    /// Signer for this token kind.
    pub signer: &'a dyn TokenSigner,
    /// Lifetime; `exp = iat + expires_in`.
    pub expires_in: Duration,
}

/// Signs a single token.
///
/// Generates a fresh `jti`, strips reserved claims (and `permissions` for
/// refresh tokens) and signs `iss`/`sub`/`jti`/`iat`/`exp` together with the
/// remaining payload.
///
/// # Errors
/// Returns `AuthError::Signing` if the signer fails or returns an empty token.
pub async fn create_token(spec: TokenSpec<'_>) -> AuthResult<String> {
    let iat = OffsetDateTime::now_utc().unix_timestamp();
    let lifetime = i64::try_from(spec.expires_in.as_secs()).unwrap_or(i64::MAX);

    let claims = Claims {
        iss: spec.issuer.to_string(),
        sub: spec.subject,
        jti: uuid::Uuid::new_v4().to_string(),
        iat,
        exp: iat.saturating_add(lifetime),
        extra: sanitize(spec.payload, spec.subject.is_refresh()),
    };

    let token = spec
        .signer
        .sign(&claims)
        .await
        .map_err(|e| AuthError::signing(e.to_string()))?;

    if token.is_empty() {
        return Err(AuthError::signing("signer returned an empty token"));
    }

    tracing::debug!(
        jti = %claims.jti,
        sub = %claims.sub,
        exp = claims.exp,
        "Token signed"
    );

    Ok(token)
}

/// Signer and lifetime of one token kind.
#[derive(Clone)]
pub struct TokenSettings {
    /// Signer for this kind.
    pub signer: Arc<dyn TokenSigner>,
    /// Token lifetime.
    pub expires_in: Duration,
}

impl TokenSettings {
    /// Creates new settings.
    #[must_use]
    pub fn new(signer: Arc<dyn TokenSigner>, expires_in: Duration) -> Self {
        Self { signer, expires_in }
    }
}

/// Creates access and refresh tokens for one issuer.
#[derive(Clone)]
pub struct TokenIssuer {
    issuer: String,
    access: TokenSettings,
    refresh: TokenSettings,
}

impl TokenIssuer {
    /// Creates a new issuer.
    #[must_use]
    pub fn new(issuer: impl Into<String>, access: TokenSettings, refresh: TokenSettings) -> Self {
        Self {
            issuer: issuer.into(),
            access,
            refresh,
        }
    }

    /// Returns the `iss` value.
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Returns the settings for a token kind.
    #[must_use]
    pub fn settings(&self, subject: Subject) -> &TokenSettings {
        match subject {
            Subject::Access => &self.access,
            Subject::Refresh => &self.refresh,
        }
    }

    async fn create(&self, payload: &Payload, subject: Subject) -> AuthResult<String> {
        let settings = self.settings(subject);
        create_token(TokenSpec {
            payload,
            issuer: &self.issuer,
            subject,
            signer: settings.signer.as_ref(),
            expires_in: settings.expires_in,
        })
        .await
    }

    /// Creates an access token.
    ///
    /// # Errors
    /// Returns `AuthError::Signing` on signer failure.
    pub async fn create_access_token(&self, payload: &Payload) -> AuthResult<String> {
        self.create(payload, Subject::Access).await
    }

    /// Creates a refresh token. `permissions` is never included.
    ///
    /// # Errors
    /// Returns `AuthError::Signing` on signer failure.
    pub async fn create_refresh_token(&self, payload: &Payload) -> AuthResult<String> {
        self.create(payload, Subject::Refresh).await
    }

    /// Creates an access/refresh pair concurrently.
    ///
    /// The refresh token is not registered; callers decide when it becomes
    /// active.
    ///
    /// # Errors
    /// Returns `AuthError::Signing` if either token fails.
    pub async fn create_tokens(&self, payload: Payload) -> AuthResult<IssuedTokens> {
        let (access_token, refresh_token) = tokio::try_join!(
            self.create_access_token(&payload),
            self.create_refresh_token(&payload)
        )?;

        Ok(IssuedTokens {
            payload,
            tokens: TokenPair {
                access_token,
                refresh_token,
            },
        })
    }
}
