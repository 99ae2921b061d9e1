//! # cred-auth
//!
//! Token lifecycle and revocation engine.
//!
//! This crate provides:
//! - Access/refresh JWT issuance with claim sanitization
//! - A refresh-token allowlist with in-memory and Redis backends
//! - Verification, including refresh-token rotation
//! - Named authentication strategies
//! - Token and permission guards, with axum extractors
//!
//! ## Overview
//!
//! A [`Cred`] instance owns one issuer configuration. Strategies turn request
//! credentials into a payload, the issuer signs an access/refresh pair for it,
//! and the refresh token's `jti` goes into the allowlist. A refresh token is
//! valid only while its `jti` is allowlisted, so revoking it is a single
//! delete. Access tokens are short-lived and never allowlisted.
//!
//! ## Modules
//!
//! - [`config`] - Configuration and TOML/env loading
//! - [`token`] - Claims, signing, issuance and verification
//! - [`allowlist`] - Refresh-token allowlist and its backends
//! - [`strategy`] - Authentication strategies
//! - [`guard`] - Token and permission guards, axum integration
//! - [`service`] - The `Cred` service tying it together
//! - [`error`] - Error taxonomy

pub mod allowlist;
pub mod config;
pub mod context;
pub mod error;
pub mod guard;
pub mod service;
pub mod strategy;
pub mod token;

pub use allowlist::{Allowlist, AllowlistBackend, AllowlistEntry, MemoryAllowlist, RedisAllowlist};
pub use config::{CacheBackendKind, CacheConfig, ConfigError, CredConfig, TokenKeyConfig};
pub use context::{AuthContext, VerifiedToken};
pub use error::{AuthError, ErrorCategory, InvalidTokenReason};
pub use guard::{
    AuthRequest, RequireAccessToken, RequireRefreshToken, RequiredActions, require_permission,
    require_prop,
};
pub use service::Cred;
pub use strategy::{Strategy, StrategyError, StrategyRegistry};
pub use token::{
    Claims, JwtError, JwtSigner, Payload, Permissions, SigningAlgorithm, Subject, TokenPair,
    TokenSigner,
};

/// Type alias for token and authorization results.
pub type AuthResult<T> = Result<T, AuthError>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use cred_auth::prelude::*;
/// ```
pub mod prelude {
    pub use crate::AuthResult;
    pub use crate::config::{CredConfig, TokenKeyConfig};
    pub use crate::context::{AuthContext, VerifiedToken};
    pub use crate::error::{AuthError, InvalidTokenReason};
    pub use crate::guard::{
        AuthRequest, RequireAccessToken, RequireRefreshToken, require_permission, require_prop,
    };
    pub use crate::service::Cred;
    pub use crate::strategy::{Strategy, StrategyError};
    pub use crate::token::{Claims, Payload, Permissions, SigningAlgorithm, Subject, TokenPair};
}
