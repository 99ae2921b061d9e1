//! Named authentication strategies.
//!
//! A strategy turns request credentials into the payload that goes into the
//! issued tokens. Hosts register one per login mechanism (password, API key,
//! upstream identity provider) and select it by name in
//! [`Cred::authenticate`](crate::Cred::authenticate).

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::AuthResult;
use crate::error::AuthError;
use crate::guard::AuthRequest;
use crate::token::Payload;

/// Error returned by a strategy when it rejects the credentials.
pub type StrategyError = Box<dyn std::error::Error + Send + Sync>;

/// Authenticates a request and produces the token payload.
///
/// Closures of the form `Fn(AuthRequest) -> impl Future<Output =
/// Result<Payload, StrategyError>>` implement this trait.
#[async_trait]
pub trait Strategy: Send + Sync {
    /// Returns the payload for an authenticated request, or the reason the
    /// request was rejected.
    async fn authenticate(&self, request: &AuthRequest) -> Result<Payload, StrategyError>;
}

#[async_trait]
impl<F, Fut> Strategy for F
where
    F: Fn(AuthRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Payload, StrategyError>> + Send + 'static,
{
    async fn authenticate(&self, request: &AuthRequest) -> Result<Payload, StrategyError> {
        (self)(request.clone()).await
    }
}

/// Strategies by name.
#[derive(Default)]
pub struct StrategyRegistry {
    strategies: DashMap<String, Arc<dyn Strategy>>,
}

impl StrategyRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a strategy, replacing any strategy of the same name.
    ///
    /// # Errors
    /// Returns `AuthError::Configuration` if `name` is empty.
    pub fn insert(&self, name: &str, strategy: Arc<dyn Strategy>) -> AuthResult<()> {
        if name.is_empty() {
            return Err(AuthError::configuration("Strategy name is required"));
        }

        if self.strategies.insert(name.to_string(), strategy).is_some() {
            tracing::info!(strategy = %name, "Strategy replaced");
        } else {
            tracing::info!(strategy = %name, "Strategy registered");
        }
        Ok(())
    }

    /// Removes a strategy. Returns `true` if it was registered.
    pub fn remove(&self, name: &str) -> bool {
        self.strategies.remove(name).is_some()
    }

    /// Returns a strategy by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Strategy>> {
        self.strategies.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Returns the registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.strategies.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Returns the number of registered strategies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    /// Returns `true` if no strategy is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct ApiKey {
        key: &'static str,
    }

    #[async_trait]
    impl Strategy for ApiKey {
        async fn authenticate(&self, request: &AuthRequest) -> Result<Payload, StrategyError> {
            match request.header("x-api-key") {
                Some(key) if key == self.key => {
                    Ok(json!({ "client": "svc" }).as_object().cloned().unwrap_or_default())
                }
                _ => Err("bad api key".into()),
            }
        }
    }

    #[tokio::test]
    async fn test_struct_strategy() {
        let strategy = ApiKey { key: "k" };

        let ok = AuthRequest::new().with_header("x-api-key", "k");
        assert_eq!(strategy.authenticate(&ok).await.unwrap()["client"], "svc");

        let bad = AuthRequest::new().with_header("x-api-key", "nope");
        let err = strategy.authenticate(&bad).await.unwrap_err();
        assert_eq!(err.to_string(), "bad api key");
    }

    #[tokio::test]
    async fn test_closure_strategy() {
        let strategy = |request: AuthRequest| async move {
            let user = request.query("user").ok_or("missing user")?.to_string();
            let mut payload = Payload::new();
            payload.insert("user".to_string(), json!(user));
            Ok::<_, StrategyError>(payload)
        };

        let payload = strategy
            .authenticate(&AuthRequest::new().with_query("user", "ann"))
            .await
            .unwrap();
        assert_eq!(payload["user"], "ann");

        assert!(strategy.authenticate(&AuthRequest::new()).await.is_err());
    }

    #[test]
    fn test_registry() {
        let registry = StrategyRegistry::new();
        assert!(registry.is_empty());

        registry.insert("basic", Arc::new(ApiKey { key: "a" })).unwrap();
        registry.insert("api", Arc::new(ApiKey { key: "b" })).unwrap();
        registry.insert("api", Arc::new(ApiKey { key: "c" })).unwrap();

        assert_eq!(registry.names(), vec!["api", "basic"]);
        assert!(registry.get("basic").is_some());
        assert!(registry.get("missing").is_none());

        assert!(registry.remove("basic"));
        assert!(!registry.remove("basic"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_empty_name_rejected() {
        let registry = StrategyRegistry::new();
        let err = registry.insert("", Arc::new(ApiKey { key: "a" })).unwrap_err();
        assert!(matches!(err, AuthError::Configuration { .. }));
    }
}
