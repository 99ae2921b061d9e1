//! Authorization guards.
//!
//! Token guards (`Cred::require_access_token` and friends, or the axum
//! extractors in [`extract`]) establish a [`VerifiedToken`]. The permission
//! guards here then check its claims:
//!
//! ```ignore
//! use cred_auth::guard::{require_permission, require_prop};
//!
//! let verified = cred.require_access_token(&request).await?;
//! require_permission(Some(&verified), "articles", ["edit", "admin"])?;
//! require_prop(Some(&verified), "tenant", &json!("acme"))?;
//! ```

pub mod extract;
pub mod request;
pub mod response;

use serde_json::Value;

use crate::AuthResult;
use crate::context::VerifiedToken;
use crate::error::AuthError;

pub use extract::{RequireAccessToken, RequireRefreshToken};
pub use request::{ACCESS_TOKEN_HEADER, AuthRequest, TOKEN_FIELD};

/// Actions a permission guard asks for. Satisfied if any one is permitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequiredActions {
    /// A single action.
    One(String),
    /// Any of several actions.
    Any(Vec<String>),
}

impl RequiredActions {
    /// Returns `true` if at least one required action is in `permitted`.
    #[must_use]
    pub fn satisfied_by<'a>(&self, mut permitted: impl Iterator<Item = &'a str>) -> bool {
        match self {
            Self::One(action) => permitted.any(|p| p == action),
            Self::Any(actions) => permitted.any(|p| actions.iter().any(|a| a == p)),
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::One(action) => action.clone(),
            Self::Any(actions) => actions.join(" | "),
        }
    }
}

impl From<&str> for RequiredActions {
    fn from(action: &str) -> Self {
        Self::One(action.to_string())
    }
}

impl From<String> for RequiredActions {
    fn from(action: String) -> Self {
        Self::One(action)
    }
}

impl From<Vec<String>> for RequiredActions {
    fn from(actions: Vec<String>) -> Self {
        Self::Any(actions)
    }
}

impl From<Vec<&str>> for RequiredActions {
    fn from(actions: Vec<&str>) -> Self {
        Self::Any(actions.into_iter().map(String::from).collect())
    }
}

impl From<&[&str]> for RequiredActions {
    fn from(actions: &[&str]) -> Self {
        Self::Any(actions.iter().map(|a| (*a).to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for RequiredActions {
    fn from(actions: [&str; N]) -> Self {
        Self::Any(actions.iter().map(|a| (*a).to_string()).collect())
    }
}

/// Requires that the token permits at least one of `required` on `resource`.
///
/// Permissions are read from `permissions.<resource>.actions`.
///
/// # Errors
/// - `MissingAuthContext` if `context` is `None`
/// - `NoPermissionsClaim` if the token has no `permissions` object
/// - `InsufficientPermissions` if no required action is permitted, including
///   when the resource has no entry
pub fn require_permission(
    context: Option<&VerifiedToken>,
    resource: &str,
    required: impl Into<RequiredActions>,
) -> AuthResult<()> {
    let context = context.ok_or(AuthError::MissingAuthContext)?;
    let permissions = context.permissions().ok_or(AuthError::NoPermissionsClaim)?;
    let required = required.into();

    let permitted = permissions
        .get(resource)
        .and_then(|entry| entry.get("actions"))
        .and_then(Value::as_array)
        .map(|actions| actions.iter().filter_map(Value::as_str));

    if permitted.is_some_and(|permitted| required.satisfied_by(permitted)) {
        return Ok(());
    }

    tracing::debug!(
        jti = %context.token_id(),
        resource,
        required = %required.describe(),
        "Permission denied"
    );
    Err(AuthError::insufficient_permissions(format!(
        "{resource} requires {}",
        required.describe()
    )))
}

/// Requires that claim `name` equals `expected` exactly.
///
/// # Errors
/// - `MissingAuthContext` if `context` is `None`
/// - `InsufficientPrivilege` if the claim is absent or differs
pub fn require_prop(
    context: Option<&VerifiedToken>,
    name: &str,
    expected: &Value,
) -> AuthResult<()> {
    let context = context.ok_or(AuthError::MissingAuthContext)?;

    if context.claim(name) == Some(expected) {
        Ok(())
    } else {
        tracing::debug!(jti = %context.token_id(), claim = name, "Claim check failed");
        Err(AuthError::insufficient_privilege(format!(
            "claim '{name}' does not match"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::{Claims, Permissions, Subject};
    use serde_json::json;

    fn verified(extra: Value) -> VerifiedToken {
        VerifiedToken::new(
            Claims {
                iss: "svc".to_string(),
                sub: Subject::Access,
                jti: "j".to_string(),
                iat: 0,
                exp: 0,
                extra: extra.as_object().cloned().unwrap(),
            },
            "token",
        )
    }

    fn with_permissions() -> VerifiedToken {
        let permissions = Permissions::new()
            .grant("svc", ["read"])
            .grant("admin", ["all"]);
        verified(json!({ "userId": 123, "permissions": permissions.to_value() }))
    }

    #[test]
    fn test_single_action() {
        let ctx = with_permissions();
        assert!(require_permission(Some(&ctx), "svc", "read").is_ok());

        let err = require_permission(Some(&ctx), "svc", "write").unwrap_err();
        assert!(matches!(err, AuthError::InsufficientPermissions { .. }));
    }

    #[test]
    fn test_any_of_actions() {
        let ctx = with_permissions();
        assert!(require_permission(Some(&ctx), "svc", ["write", "read"]).is_ok());
        assert!(require_permission(Some(&ctx), "svc", vec!["write", "delete"]).is_err());
        assert!(require_permission(Some(&ctx), "svc", Vec::<String>::new()).is_err());
    }

    #[test]
    fn test_unknown_resource() {
        let ctx = with_permissions();
        let err = require_permission(Some(&ctx), "billing", "read").unwrap_err();
        assert!(matches!(err, AuthError::InsufficientPermissions { .. }));
    }

    #[test]
    fn test_missing_context_and_claim() {
        assert!(matches!(
            require_permission(None, "svc", "read").unwrap_err(),
            AuthError::MissingAuthContext
        ));

        let ctx = verified(json!({ "userId": 123 }));
        assert!(matches!(
            require_permission(Some(&ctx), "svc", "read").unwrap_err(),
            AuthError::NoPermissionsClaim
        ));
    }

    #[test]
    fn test_malformed_resource_entry() {
        let ctx = verified(json!({ "permissions": { "svc": ["read"] } }));
        assert!(matches!(
            require_permission(Some(&ctx), "svc", "read").unwrap_err(),
            AuthError::InsufficientPermissions { .. }
        ));
    }

    #[test]
    fn test_require_prop() {
        let ctx = with_permissions();
        assert!(require_prop(Some(&ctx), "userId", &json!(123)).is_ok());

        let err = require_prop(Some(&ctx), "userId", &json!("123")).unwrap_err();
        assert!(matches!(err, AuthError::InsufficientPrivilege { .. }));

        let err = require_prop(Some(&ctx), "role", &json!("admin")).unwrap_err();
        assert!(matches!(err, AuthError::InsufficientPrivilege { .. }));

        assert!(matches!(
            require_prop(None, "userId", &json!(123)).unwrap_err(),
            AuthError::MissingAuthContext
        ));
    }
}
