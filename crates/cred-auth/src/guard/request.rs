//! Transport-neutral view of an incoming request.

use std::collections::HashMap;

use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;

/// Header carrying a bare token as an alternative to `Authorization`.
pub const ACCESS_TOKEN_HEADER: &str = "x-access-token";

/// Body field and query parameter carrying a token.
pub const TOKEN_FIELD: &str = "token";

const BEARER_PREFIX: &str = "Bearer ";

/// Headers, query parameters and parsed body of a request.
///
/// Strategies read credentials from it and token guards extract the token
/// from it.
#[derive(Debug, Clone, Default)]
pub struct AuthRequest {
    headers: HeaderMap,
    query: HashMap<String, String>,
    body: Option<Value>,
}

impl AuthRequest {
    /// Creates an empty request.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a request from axum request parts. The body is not read.
    #[must_use]
    pub fn from_parts(parts: &Parts) -> Self {
        let query = parts
            .uri
            .query()
            .map(|q| {
                url::form_urlencoded::parse(q.as_bytes())
                    .into_owned()
                    .collect()
            })
            .unwrap_or_default();

        Self {
            headers: parts.headers.clone(),
            query,
            body: None,
        }
    }

    /// Adds a header. Invalid names or values are ignored.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.append(name, value);
        }
        self
    }

    /// Sets `Authorization: Bearer <token>`.
    #[must_use]
    pub fn with_bearer(self, token: &str) -> Self {
        self.with_header(AUTHORIZATION.as_str(), &format!("{BEARER_PREFIX}{token}"))
    }

    /// Adds a query parameter.
    #[must_use]
    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }

    /// Sets the parsed body.
    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Returns all headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns a header value if it is valid UTF-8.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns a query parameter.
    #[must_use]
    pub fn query(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    /// Returns the parsed body.
    #[must_use]
    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    /// Returns a string field of a JSON object body.
    #[must_use]
    pub fn body_field(&self, name: &str) -> Option<&str> {
        self.body.as_ref()?.get(name)?.as_str()
    }

    /// Finds the presented token.
    ///
    /// Looks in `Authorization: Bearer`, then `x-access-token`, then the body
    /// `token` field, then the `token` query parameter. Empty values are
    /// skipped.
    #[must_use]
    pub fn token(&self) -> Option<&str> {
        let non_empty = |s: &&str| !s.trim().is_empty();

        self.header(AUTHORIZATION.as_str())
            .and_then(|v| v.strip_prefix(BEARER_PREFIX))
            .map(str::trim)
            .filter(non_empty)
            .or_else(|| self.header(ACCESS_TOKEN_HEADER).filter(non_empty))
            .or_else(|| self.body_field(TOKEN_FIELD).filter(non_empty))
            .or_else(|| self.query(TOKEN_FIELD).filter(non_empty))
    }
}
