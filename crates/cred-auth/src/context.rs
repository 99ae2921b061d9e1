//! Values handed back to the host after authentication or verification.

use serde_json::{Map, Value};

use crate::token::{Claims, Payload, Subject, TokenPair};

/// Result of a successful [`Cred::authenticate`](crate::Cred::authenticate).
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// Name of the strategy that accepted the request.
    pub strategy: String,
    /// Payload returned by the strategy.
    pub payload: Payload,
    /// The issued tokens; the refresh token is already allowlisted.
    pub tokens: TokenPair,
}

/// A token that passed a token guard, with its claims.
///
/// The axum extractors also store it in the request extensions so later
/// extractors and handlers can run permission checks against it.
#[derive(Debug, Clone)]
pub struct VerifiedToken {
    /// Verified claims.
    pub claims: Claims,
    /// The raw token as presented.
    pub token: String,
}

impl VerifiedToken {
    /// Creates a new verified token.
    #[must_use]
    pub fn new(claims: Claims, token: impl Into<String>) -> Self {
        Self {
            claims,
            token: token.into(),
        }
    }

    /// Returns the token kind.
    #[must_use]
    pub fn subject(&self) -> Subject {
        self.claims.sub
    }

    /// Returns the `jti`.
    #[must_use]
    pub fn token_id(&self) -> &str {
        &self.claims.jti
    }

    /// Returns a caller-supplied claim.
    #[must_use]
    pub fn claim(&self, name: &str) -> Option<&Value> {
        self.claims.get(name)
    }

    /// Returns the `permissions` claim, if it is an object.
    #[must_use]
    pub fn permissions(&self) -> Option<&Map<String, Value>> {
        self.claims.permissions()
    }
}
