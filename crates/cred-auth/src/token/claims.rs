//! Token claims, payload sanitization and permission structures.
//!
//! A token's claims are the registered fields assigned by the issuer
//! (`iss`, `sub`, `jti`, `iat`, `exp`) plus the caller-supplied payload,
//! flattened into the same JSON object:
//!
//! ```json
//! { "iss": "svc", "sub": "access", "jti": "…", "iat": 1700000000, "exp": 1700086400,
//!   "userId": 123, "permissions": { "svc": { "actions": ["read"] } } }
//! ```

use std::collections::BTreeMap;
use std::fmt;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::signer::JwtError;

/// Caller-supplied claims merged into every token.
pub type Payload = Map<String, Value>;

/// Name of the claim holding per-resource permitted actions.
pub const PERMISSIONS_CLAIM: &str = "permissions";

/// Claims assigned by the issuer. Both the JWT short names and their long
/// spellings are reserved so a payload can never smuggle either form in.
pub const RESERVED_CLAIMS: &[&str] = &[
    "iss",
    "exp",
    "sub",
    "nbf",
    "jti",
    "iat",
    "issuer",
    "expiresAt",
    "subject",
    "notBefore",
    "tokenId",
    "issuedAt",
];

// ============================================================================
// Subject
// ============================================================================

/// The kind of token, carried in the `sub` claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Subject {
    /// Short-lived token carrying permissions.
    Access,
    /// Long-lived, permission-free token tracked in the allowlist.
    Refresh,
}

impl Subject {
    /// Returns the subject as used in the `sub` claim.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Access => "access",
            Self::Refresh => "refresh",
        }
    }

    /// Returns `true` for refresh tokens.
    #[must_use]
    pub fn is_refresh(&self) -> bool {
        matches!(self, Self::Refresh)
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Claims
// ============================================================================

/// The complete, signed claim set of a token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    /// Issuer.
    pub iss: String,

    /// Token kind.
    pub sub: Subject,

    /// Unique token identifier, the allowlist key.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub jti: String,

    /// Issued at (Unix timestamp).
    pub iat: i64,

    /// Expiration time (Unix timestamp).
    pub exp: i64,

    /// Caller-supplied claims.
    #[serde(flatten)]
    pub extra: Payload,
}

impl Claims {
    /// Returns a caller-supplied claim.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.extra.get(name)
    }

    /// Returns the raw `permissions` claim, if it is a JSON object.
    #[must_use]
    pub fn permissions(&self) -> Option<&Map<String, Value>> {
        self.extra.get(PERMISSIONS_CLAIM).and_then(Value::as_object)
    }

    /// Returns `true` if the token carries a `jti`.
    #[must_use]
    pub fn has_token_id(&self) -> bool {
        !self.jti.is_empty()
    }

    /// Consumes the claims and returns the caller-supplied part.
    #[must_use]
    pub fn into_payload(self) -> Payload {
        self.extra
    }
}

/// Strips reserved claims from a payload before signing.
///
/// For refresh tokens the `permissions` claim is removed as well, so a stolen
/// refresh token carries no authorization data.
#[must_use]
pub fn sanitize(payload: &Payload, is_refresh: bool) -> Payload {
    payload
        .iter()
        .filter(|(key, _)| !RESERVED_CLAIMS.contains(&key.as_str()))
        .filter(|(key, _)| !(is_refresh && key.as_str() == PERMISSIONS_CLAIM))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Reads the claims of a compact JWT without verifying its signature.
///
/// Only used on tokens whose validity has already been established, or to
/// read the `jti`/`exp` of a token this crate just issued.
///
/// # Errors
/// Returns an error if the token is not three dot-separated segments or the
/// claims segment is not valid base64url JSON.
pub fn decode_unverified(token: &str) -> Result<Claims, JwtError> {
    let mut segments = token.split('.');
    let (Some(_header), Some(claims), Some(_signature), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return Err(JwtError::decoding_error("Token must have three segments"));
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(claims)
        .map_err(|e| JwtError::decoding_error(e.to_string()))?;

    serde_json::from_slice(&bytes).map_err(|e| JwtError::decoding_error(e.to_string()))
}

// ============================================================================
// Permissions
// ============================================================================

/// Actions permitted on a single resource.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourcePermission {
    /// Permitted action names.
    pub actions: Vec<String>,
}

/// Typed builder for the `permissions` claim.
///
/// ```
/// use cred_auth::token::Permissions;
///
/// let permissions = Permissions::new().grant("svc", ["read", "write"]);
/// assert!(permissions.allows("svc", "read"));
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Permissions(BTreeMap<String, ResourcePermission>);

impl Permissions {
    /// Creates an empty permission set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds actions for a resource.
    #[must_use]
    pub fn grant<I, S>(mut self, resource: impl Into<String>, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.0
            .entry(resource.into())
            .or_default()
            .actions
            .extend(actions.into_iter().map(Into::into));
        self
    }

    /// Returns `true` if `action` is permitted on `resource`.
    #[must_use]
    pub fn allows(&self, resource: &str, action: &str) -> bool {
        self.0
            .get(resource)
            .is_some_and(|p| p.actions.iter().any(|a| a == action))
    }

    /// Converts to the JSON value stored in the `permissions` claim.
    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
