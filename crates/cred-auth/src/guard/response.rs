//! HTTP response mapping for `AuthError`.
//!
//! Errors render as a small JSON body:
//!
//! ```json
//! { "error": "invalid_token", "message": "Invalid token (expired): Token expired" }
//! ```
//!
//! 401 responses also carry `WWW-Authenticate: Bearer realm="cred", ...`.

use axum::{
    Json,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::error::AuthError;

/// Realm advertised in `WWW-Authenticate`.
pub const REALM: &str = "cred";

impl AuthError {
    /// Returns the HTTP status this error maps to.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Configuration { .. } | Self::Signing { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::CacheUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::Authentication { .. }
            | Self::InvalidToken { .. }
            | Self::TokenRevoked
            | Self::NoToken
            | Self::MissingAuthContext => StatusCode::UNAUTHORIZED,
            Self::NoPermissionsClaim
            | Self::InsufficientPermissions { .. }
            | Self::InsufficientPrivilege { .. } => StatusCode::FORBIDDEN,
            Self::Unauthorized { source } | Self::Refresh { source } => source.status_code(),
        }
    }

    /// Returns the short error code used in response bodies and
    /// `WWW-Authenticate`.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Configuration { .. } | Self::Signing { .. } => "server_error",
            Self::CacheUnavailable { .. } => "temporarily_unavailable",
            Self::InvalidToken { .. } | Self::TokenRevoked => "invalid_token",
            Self::Authentication { .. } | Self::NoToken | Self::MissingAuthContext => {
                "unauthorized"
            }
            Self::NoPermissionsClaim
            | Self::InsufficientPermissions { .. }
            | Self::InsufficientPrivilege { .. } => "insufficient_scope",
            Self::Unauthorized { source } | Self::Refresh { source } => source.error_code(),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code();

        // server-side detail stays in the log
        let message = if status.is_server_error() {
            tracing::warn!(error = %self, category = %self.category(), "Auth request failed");
            status
                .canonical_reason()
                .unwrap_or("Server error")
                .to_string()
        } else {
            self.to_string()
        };

        let mut headers = HeaderMap::new();
        if status == StatusCode::UNAUTHORIZED {
            let www_auth = build_www_authenticate_header(code, &message);
            if let Ok(value) = HeaderValue::from_str(&www_auth) {
                headers.insert(header::WWW_AUTHENTICATE, value);
            }
        }

        let body = json!({ "error": code, "message": message });
        (status, headers, Json(body)).into_response()
    }
}

fn build_www_authenticate_header(error: &str, description: &str) -> String {
    let escaped = description.replace('"', "\\\"");
    format!("Bearer realm=\"{REALM}\", error=\"{error}\", error_description=\"{escaped}\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InvalidTokenReason;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_status_codes() {
        let cases = [
            (AuthError::configuration("x"), StatusCode::INTERNAL_SERVER_ERROR),
            (AuthError::signing("x"), StatusCode::INTERNAL_SERVER_ERROR),
            (AuthError::cache_unavailable("x"), StatusCode::SERVICE_UNAVAILABLE),
            (AuthError::authentication("x"), StatusCode::UNAUTHORIZED),
            (AuthError::TokenRevoked, StatusCode::UNAUTHORIZED),
            (AuthError::NoToken, StatusCode::UNAUTHORIZED),
            (AuthError::NoPermissionsClaim, StatusCode::FORBIDDEN),
            (AuthError::insufficient_permissions("x"), StatusCode::FORBIDDEN),
            (AuthError::insufficient_privilege("x"), StatusCode::FORBIDDEN),
            (
                AuthError::unauthorized(AuthError::TokenRevoked),
                StatusCode::UNAUTHORIZED,
            ),
            (
                AuthError::refresh(AuthError::cache_unavailable("x")),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];

        for (error, status) in cases {
            assert_eq!(error.status_code(), status, "{error}");
        }
    }

    #[tokio::test]
    async fn test_unauthorized_response() {
        let error = AuthError::unauthorized(AuthError::invalid_token(
            InvalidTokenReason::Expired,
            "Token expired",
        ));
        let response = error.into_response();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let www_auth = response
            .headers()
            .get(header::WWW_AUTHENTICATE)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(www_auth.starts_with("Bearer realm=\"cred\""));
        assert!(www_auth.contains("error=\"invalid_token\""));

        let body = body_json(response).await;
        assert_eq!(body["error"], "invalid_token");
        assert_eq!(
            body["message"],
            "Authentication failed: Invalid token (expired): Token expired"
        );
    }

    #[tokio::test]
    async fn test_forbidden_response_has_no_challenge() {
        let response = AuthError::insufficient_permissions("svc: write").into_response();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(response.headers().get(header::WWW_AUTHENTICATE).is_none());
        assert_eq!(body_json(response).await["error"], "insufficient_scope");
    }

    #[tokio::test]
    async fn test_server_error_hides_detail() {
        let response = AuthError::cache_unavailable("redis://secret-host refused").into_response();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = body_json(response).await;
        assert_eq!(body["error"], "temporarily_unavailable");
        assert_eq!(body["message"], "Service Unavailable");
    }

    #[test]
    fn test_www_authenticate_escapes_quotes() {
        let header = build_www_authenticate_header("unauthorized", "bad \"thing\"");
        assert!(header.contains("error_description=\"bad \\\"thing\\\"\""));
    }
}
