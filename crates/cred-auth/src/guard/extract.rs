//! Axum extractors for the token guards.
//!
//! The state must provide `Arc<Cred>` through `FromRef`:
//!
//! ```ignore
//! use axum::{Router, routing::get};
//! use cred_auth::guard::{RequireAccessToken, require_permission};
//!
//! async fn articles(RequireAccessToken(token): RequireAccessToken) -> Result<String, AuthError> {
//!     require_permission(Some(&token), "articles", "read")?;
//!     Ok(format!("hello {}", token.token_id()))
//! }
//!
//! let app = Router::new()
//!     .route("/articles", get(articles))
//!     .with_state(cred);
//! ```
//!
//! The body is not read by these extractors, so only the header and query
//! token locations apply. On success the [`VerifiedToken`] is also inserted
//! into the request extensions.

use std::sync::Arc;

use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};

use super::request::AuthRequest;
use crate::AuthResult;
use crate::context::VerifiedToken;
use crate::error::AuthError;
use crate::service::Cred;
use crate::token::Subject;

/// Requires a valid access token.
#[derive(Debug, Clone)]
pub struct RequireAccessToken(pub VerifiedToken);

/// Requires a valid, allowlisted refresh token.
#[derive(Debug, Clone)]
pub struct RequireRefreshToken(pub VerifiedToken);

async fn guard<S>(parts: &mut Parts, state: &S, expected: Subject) -> AuthResult<VerifiedToken>
where
    S: Send + Sync,
    Arc<Cred>: FromRef<S>,
{
    let cred = Arc::<Cred>::from_ref(state);
    let request = AuthRequest::from_parts(parts);

    let verified = cred.require_valid_token(expected, &request).await?;
    parts.extensions.insert(verified.clone());
    Ok(verified)
}

impl<S> FromRequestParts<S> for RequireAccessToken
where
    S: Send + Sync,
    Arc<Cred>: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        guard(parts, state, Subject::Access).await.map(Self)
    }
}

impl<S> FromRequestParts<S> for RequireRefreshToken
where
    S: Send + Sync,
    Arc<Cred>: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        guard(parts, state, Subject::Refresh).await.map(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CredConfig;
    use crate::token::Payload;
    use axum::http::{Request, StatusCode};
    use axum::response::IntoResponse;
    use serde_json::json;

    async fn state() -> Arc<Cred> {
        Arc::new(
            Cred::from_config(CredConfig::with_secrets("a", "r"))
                .await
                .unwrap(),
        )
    }

    fn payload() -> Payload {
        json!({ "user": "ann" }).as_object().cloned().unwrap()
    }

    fn parts(builder: axum::http::request::Builder) -> Parts {
        builder.body(()).unwrap().into_parts().0
    }

    #[tokio::test]
    async fn test_access_extractor() {
        let cred = state().await;
        let token = cred.create_access_token(&payload()).await.unwrap();

        let mut parts = parts(
            Request::builder()
                .uri("/articles")
                .header("authorization", format!("Bearer {token}")),
        );
        let RequireAccessToken(verified) =
            RequireAccessToken::from_request_parts(&mut parts, &cred)
                .await
                .unwrap();

        assert_eq!(verified.claim("user"), Some(&json!("ann")));
        let stored = parts.extensions.get::<VerifiedToken>().unwrap();
        assert_eq!(stored.token_id(), verified.token_id());
    }

    #[tokio::test]
    async fn test_refresh_extractor_uses_query() {
        let cred = state().await;
        let issued = cred.create_tokens(payload()).await.unwrap();
        let refresh = issued.tokens.refresh_token;

        let uri = format!("/refresh?token={refresh}");
        let mut unregistered = parts(Request::builder().uri(uri.as_str()));
        let err = RequireRefreshToken::from_request_parts(&mut unregistered, &cred)
            .await
            .unwrap_err();
        assert!(err.is_revoked());

        cred.register_token(&refresh).await.unwrap();
        let mut registered = parts(Request::builder().uri(uri.as_str()));
        let RequireRefreshToken(verified) =
            RequireRefreshToken::from_request_parts(&mut registered, &cred)
                .await
                .unwrap();
        assert_eq!(verified.subject(), Subject::Refresh);
    }

    #[tokio::test]
    async fn test_rejection_is_unauthorized_response() {
        let cred = state().await;
        let mut parts = parts(Request::builder().uri("/articles"));

        let err = RequireAccessToken::from_request_parts(&mut parts, &cred)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::NoToken));
        assert_eq!(err.into_response().status(), StatusCode::UNAUTHORIZED);
        assert!(parts.extensions.get::<VerifiedToken>().is_none());
    }
}
