//! Authentication and authorization error types.
//!
//! Every failure in this crate is classified into one [`AuthError`] variant.
//! The crate never writes a response itself; hosts map the error to their
//! transport (see [`crate::guard::response`] for the axum mapping).

use std::fmt;

/// Why a presented token was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvalidTokenReason {
    /// Not a well-formed token, or claims that cannot be parsed.
    Malformed,
    /// The `exp` claim is in the past.
    Expired,
    /// The `iss` claim does not match the configured issuer.
    WrongIssuer,
    /// The signature does not verify with the configured key.
    BadSignature,
    /// The header declares an algorithm other than the configured one.
    WrongAlgorithm,
    /// The `sub` claim names a different token kind than the one required.
    WrongSubject,
    /// The token carries no `jti` claim.
    MissingTokenId,
}

impl InvalidTokenReason {
    /// Returns the reason as a short, stable string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Malformed => "malformed",
            Self::Expired => "expired",
            Self::WrongIssuer => "wrong issuer",
            Self::BadSignature => "bad signature",
            Self::WrongAlgorithm => "wrong algorithm",
            Self::WrongSubject => "wrong subject",
            Self::MissingTokenId => "missing token id",
        }
    }
}

impl fmt::Display for InvalidTokenReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur during token issuance, verification and authorization.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Unknown strategy, missing key material or an invalid option.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },

    /// An authentication strategy rejected the request.
    #[error("Unauthorized: {message}")]
    Authentication {
        /// The strategy's rejection message.
        message: String,
    },

    /// The token signer failed or produced no token.
    #[error("Failed to create token: {message}")]
    Signing {
        /// Description of the signing failure.
        message: String,
    },

    /// The token failed signature, issuer, algorithm, expiry or shape checks.
    #[error("Invalid token ({reason}): {message}")]
    InvalidToken {
        /// The specific rejection reason.
        reason: InvalidTokenReason,
        /// Underlying detail from the signer.
        message: String,
    },

    /// The refresh token is not present in the allowlist.
    #[error("Token has been revoked")]
    TokenRevoked,

    /// The allowlist backend could not be reached.
    #[error("Allowlist cache unavailable: {message}")]
    CacheUnavailable {
        /// Description of the backend failure.
        message: String,
    },

    /// No token was found in the request.
    #[error("No token provided")]
    NoToken,

    /// A token guard rejected the presented token.
    #[error("Authentication failed: {source}")]
    Unauthorized {
        /// The verification failure.
        source: Box<AuthError>,
    },

    /// A permission guard ran without verified claims.
    #[error("Auth context missing in request")]
    MissingAuthContext,

    /// The verified claims carry no `permissions` object.
    #[error("Payload has no permissions")]
    NoPermissionsClaim,

    /// None of the required actions is permitted.
    #[error("Insufficient permissions: {message}")]
    InsufficientPermissions {
        /// Which resource and actions were checked.
        message: String,
    },

    /// A required claim is absent or has a different value.
    #[error("Insufficient privilege: {message}")]
    InsufficientPrivilege {
        /// Which claim was checked.
        message: String,
    },

    /// Refresh rotation failed part way.
    #[error("Problem refreshing tokens: {source}")]
    Refresh {
        /// The failure that aborted the rotation.
        source: Box<AuthError>,
    },
}

impl AuthError {
    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new `Authentication` error.
    #[must_use]
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
        }
    }

    /// Creates a new `Signing` error.
    #[must_use]
    pub fn signing(message: impl Into<String>) -> Self {
        Self::Signing {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidToken` error.
    #[must_use]
    pub fn invalid_token(reason: InvalidTokenReason, message: impl Into<String>) -> Self {
        Self::InvalidToken {
            reason,
            message: message.into(),
        }
    }

    /// Creates a new `CacheUnavailable` error.
    #[must_use]
    pub fn cache_unavailable(message: impl Into<String>) -> Self {
        Self::CacheUnavailable {
            message: message.into(),
        }
    }

    /// Wraps a verification failure as `Unauthorized`.
    #[must_use]
    pub fn unauthorized(source: AuthError) -> Self {
        Self::Unauthorized {
            source: Box::new(source),
        }
    }

    /// Creates a new `InsufficientPermissions` error.
    #[must_use]
    pub fn insufficient_permissions(message: impl Into<String>) -> Self {
        Self::InsufficientPermissions {
            message: message.into(),
        }
    }

    /// Creates a new `InsufficientPrivilege` error.
    #[must_use]
    pub fn insufficient_privilege(message: impl Into<String>) -> Self {
        Self::InsufficientPrivilege {
            message: message.into(),
        }
    }

    /// Wraps a rotation failure as `Refresh`.
    #[must_use]
    pub fn refresh(source: AuthError) -> Self {
        Self::Refresh {
            source: Box::new(source),
        }
    }

    /// Returns the reason if this is (or wraps) an `InvalidToken` error.
    #[must_use]
    pub fn invalid_token_reason(&self) -> Option<InvalidTokenReason> {
        match self {
            Self::InvalidToken { reason, .. } => Some(*reason),
            Self::Unauthorized { source } | Self::Refresh { source } => {
                source.invalid_token_reason()
            }
            _ => None,
        }
    }

    /// Returns `true` if this is (or wraps) a `TokenRevoked` error.
    #[must_use]
    pub fn is_revoked(&self) -> bool {
        match self {
            Self::TokenRevoked => true,
            Self::Unauthorized { source } | Self::Refresh { source } => source.is_revoked(),
            _ => false,
        }
    }

    /// Returns `true` if the caller is at fault (4xx category).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        !self.is_server_error()
    }

    /// Returns `true` if the failure is on the server side (5xx category).
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        match self {
            Self::Configuration { .. } | Self::Signing { .. } | Self::CacheUnavailable { .. } => {
                true
            }
            Self::Unauthorized { source } | Self::Refresh { source } => source.is_server_error(),
            _ => false,
        }
    }

    /// Returns the error category for logging/monitoring purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::Authentication { .. } => ErrorCategory::Authentication,
            Self::Signing { .. } => ErrorCategory::Internal,
            Self::InvalidToken { .. } => ErrorCategory::Token,
            Self::TokenRevoked => ErrorCategory::Token,
            Self::CacheUnavailable { .. } => ErrorCategory::Infrastructure,
            Self::NoToken => ErrorCategory::Authentication,
            Self::Unauthorized { source } => source.category(),
            Self::MissingAuthContext => ErrorCategory::Authorization,
            Self::NoPermissionsClaim => ErrorCategory::Authorization,
            Self::InsufficientPermissions { .. } => ErrorCategory::Authorization,
            Self::InsufficientPrivilege { .. } => ErrorCategory::Authorization,
            Self::Refresh { source } => source.category(),
        }
    }
}

/// Categories of errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Identity could not be established.
    Authentication,
    /// Identity is known but lacks the required permission.
    Authorization,
    /// Token validation or revocation failures.
    Token,
    /// Allowlist backend failures.
    Infrastructure,
    /// Configuration errors.
    Configuration,
    /// Internal failures such as signing.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Authentication => write!(f, "authentication"),
            Self::Authorization => write!(f, "authorization"),
            Self::Token => write!(f, "token"),
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Configuration => write!(f, "configuration"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AuthError::configuration("Strategy \"basic\" not defined");
        assert_eq!(
            err.to_string(),
            "Configuration error: Strategy \"basic\" not defined"
        );

        let err = AuthError::invalid_token(InvalidTokenReason::Expired, "ExpiredSignature");
        assert_eq!(err.to_string(), "Invalid token (expired): ExpiredSignature");

        let err = AuthError::unauthorized(AuthError::TokenRevoked);
        assert_eq!(
            err.to_string(),
            "Authentication failed: Token has been revoked"
        );
    }

    #[test]
    fn test_error_predicates() {
        let err = AuthError::TokenRevoked;
        assert!(err.is_client_error());
        assert!(err.is_revoked());

        let err = AuthError::cache_unavailable("connection refused");
        assert!(err.is_server_error());
        assert!(!err.is_client_error());

        let err = AuthError::unauthorized(AuthError::cache_unavailable("down"));
        assert!(err.is_server_error());

        let err = AuthError::refresh(AuthError::TokenRevoked);
        assert!(err.is_revoked());
        assert!(err.is_client_error());
    }

    #[test]
    fn test_invalid_token_reason_unwraps_sources() {
        let err = AuthError::unauthorized(AuthError::invalid_token(
            InvalidTokenReason::BadSignature,
            "InvalidSignature",
        ));
        assert_eq!(
            err.invalid_token_reason(),
            Some(InvalidTokenReason::BadSignature)
        );
        assert_eq!(AuthError::NoToken.invalid_token_reason(), None);
    }

    #[test]
    fn test_error_category() {
        assert_eq!(
            AuthError::authentication("bad password").category(),
            ErrorCategory::Authentication
        );
        assert_eq!(
            AuthError::insufficient_permissions("test").category(),
            ErrorCategory::Authorization
        );
        assert_eq!(AuthError::TokenRevoked.category(), ErrorCategory::Token);
        assert_eq!(
            AuthError::cache_unavailable("test").category(),
            ErrorCategory::Infrastructure
        );
        assert_eq!(
            AuthError::unauthorized(AuthError::TokenRevoked).category(),
            ErrorCategory::Token
        );
    }

    #[test]
    fn test_error_category_display() {
        assert_eq!(ErrorCategory::Authentication.to_string(), "authentication");
        assert_eq!(ErrorCategory::Infrastructure.to_string(), "infrastructure");
        assert_eq!(InvalidTokenReason::WrongIssuer.to_string(), "wrong issuer");
    }
}
