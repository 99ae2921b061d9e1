use std::fs;
use std::sync::Arc;
use std::time::Duration;

use cred_auth::config::loader::load_config;
use cred_auth::prelude::*;
use cred_auth::token::decode_unverified;
use serde_json::{Value, json};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("cred_auth=debug")
        .with_test_writer()
        .try_init();
}

fn payload(value: Value) -> Payload {
    value.as_object().cloned().unwrap_or_default()
}

async fn svc() -> Arc<Cred> {
    init_tracing();

    let mut config = CredConfig::with_secrets("access-secret", "refresh-secret");
    config.issuer = "svc".to_string();
    config.access = config.access.expires_in(Duration::from_secs(24 * 60 * 60));

    Arc::new(Cred::from_config(config).await.expect("valid config"))
}

async fn password(request: AuthRequest) -> Result<Payload, StrategyError> {
    let user = request.body_field("username").ok_or("missing username")?;
    let pass = request.body_field("password").ok_or("missing password")?;
    if user != "ann" || pass != "s3cret" {
        return Err("invalid username or password".into());
    }

    Ok(payload(json!({
        "userId": 123,
        "permissions": Permissions::new().grant("svc", ["read"]).to_value(),
        // reserved names from the host are ignored
        "iss": "spoofed",
        "jti": "spoofed",
    })))
}

#[tokio::test]
async fn login_scenario() {
    let cred = svc().await;
    cred.use_strategy("password", password).unwrap();

    let request =
        AuthRequest::new().with_body(json!({ "username": "ann", "password": "s3cret" }));
    let ctx = cred.authenticate("password", &request).await.unwrap();

    let access = decode_unverified(&ctx.tokens.access_token).unwrap();
    assert_eq!(access.iss, "svc");
    assert_eq!(access.sub, Subject::Access);
    assert_eq!(access.exp - access.iat, 24 * 60 * 60);
    assert_eq!(access.get("userId"), Some(&json!(123)));
    assert_eq!(
        access.get("permissions"),
        Some(&json!({ "svc": { "actions": ["read"] } }))
    );
    assert_ne!(access.jti, "spoofed");

    let refresh = decode_unverified(&ctx.tokens.refresh_token).unwrap();
    assert_eq!(refresh.sub, Subject::Refresh);
    assert_eq!(refresh.get("userId"), Some(&json!(123)));
    assert!(refresh.get("permissions").is_none());
    assert_ne!(refresh.jti, access.jti);

    let entries = cred.list_allowlist().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].token_id, refresh.jti);
    assert_eq!(entries[0].key, format!("cred:token:{}", refresh.jti));
}

#[tokio::test]
async fn guarded_request() {
    let cred = svc().await;
    cred.use_strategy("password", password).unwrap();

    let login = AuthRequest::new().with_body(json!({ "username": "ann", "password": "s3cret" }));
    let ctx = cred.authenticate("password", &login).await.unwrap();

    let request = AuthRequest::new().with_header("x-access-token", &ctx.tokens.access_token);
    let verified = cred.require_access_token(&request).await.unwrap();

    require_permission(Some(&verified), "svc", "read").unwrap();
    require_permission(Some(&verified), "svc", ["write", "read"]).unwrap();
    require_prop(Some(&verified), "userId", &json!(123)).unwrap();

    let err = require_permission(Some(&verified), "svc", "write").unwrap_err();
    assert_eq!(err.status_code().as_u16(), 403);

    let err = require_prop(Some(&verified), "userId", &json!(7)).unwrap_err();
    assert!(matches!(err, AuthError::InsufficientPrivilege { .. }));
}

#[tokio::test]
async fn wrong_credentials() {
    let cred = svc().await;
    cred.use_strategy("password", password).unwrap();

    let request = AuthRequest::new().with_body(json!({ "username": "ann", "password": "nope" }));
    let err = cred.authenticate("password", &request).await.unwrap_err();

    assert!(matches!(err, AuthError::Authentication { .. }));
    assert_eq!(err.status_code().as_u16(), 401);
    assert!(cred.list_allowlist().await.unwrap().is_empty());
}

#[tokio::test]
async fn refresh_rotation_and_revocation() {
    let cred = svc().await;
    cred.use_strategy("password", password).unwrap();

    let login = AuthRequest::new().with_body(json!({ "username": "ann", "password": "s3cret" }));
    let ctx = cred.authenticate("password", &login).await.unwrap();
    let old = ctx.tokens.refresh_token;

    let presented = AuthRequest::new().with_bearer(&old);
    cred.require_refresh_token(&presented).await.unwrap();

    let pair = cred.refresh(&old).await.unwrap();

    let err = cred.require_refresh_token(&presented).await.unwrap_err();
    assert!(err.is_revoked());
    assert_eq!(err.to_string(), "Authentication failed: Token has been revoked");

    let rotated = AuthRequest::new().with_bearer(&pair.refresh_token);
    let verified = cred.require_refresh_token(&rotated).await.unwrap();
    assert_eq!(verified.claim("userId"), Some(&json!(123)));

    cred.revoke_token(&pair.refresh_token).await.unwrap();
    assert!(cred.require_refresh_token(&rotated).await.unwrap_err().is_revoked());
    assert!(cred.list_allowlist().await.unwrap().is_empty());
}

#[tokio::test]
async fn subject_mismatch() {
    let cred = svc().await;
    let issued = cred
        .create_tokens(payload(json!({ "userId": 123 })))
        .await
        .unwrap();
    cred.register_token(&issued.tokens.refresh_token)
        .await
        .unwrap();

    // the refresh token is allowlisted but is not an access token
    let request = AuthRequest::new().with_bearer(&issued.tokens.refresh_token);
    let err = cred.require_access_token(&request).await.unwrap_err();
    assert!(matches!(err, AuthError::Unauthorized { .. }));
}

#[tokio::test]
async fn shared_secret_subject_mismatch() {
    init_tracing();
    let cred = Cred::from_config(CredConfig::with_secrets("same", "same"))
        .await
        .unwrap();
    let issued = cred
        .create_tokens(payload(json!({ "userId": 1 })))
        .await
        .unwrap();

    let err = cred
        .verify(&issued.tokens.refresh_token, Subject::Access)
        .await
        .unwrap_err();
    assert_eq!(
        err.invalid_token_reason(),
        Some(InvalidTokenReason::WrongSubject)
    );
}

#[tokio::test]
async fn foreign_issuer_rejected() {
    let cred = svc().await;
    let other = Cred::from_config(CredConfig::with_secrets("access-secret", "refresh-secret"))
        .await
        .unwrap();

    let token = other
        .create_access_token(&payload(json!({ "userId": 1 })))
        .await
        .unwrap();
    let err = cred.verify(&token, Subject::Access).await.unwrap_err();
    assert_eq!(
        err.invalid_token_reason(),
        Some(InvalidTokenReason::WrongIssuer)
    );
}

#[tokio::test]
async fn config_file_to_service() {
    init_tracing();
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("cred.toml");

    fs::write(
        &path,
        r#"
key = "api"
issuer = "svc"

[cache]
backend = "memory"
capacity = 10
namespace = "api:refresh"

[access]
algorithm = "HS256"
secret = "file-access"
expires_in = "15m"

[refresh]
algorithm = "HS512"
secret = "file-refresh"
expires_in = "30d"
"#,
    )
    .expect("write toml");

    let config = load_config(Some(&path)).expect("should parse config");
    assert_eq!(config.access_expires_in(), Duration::from_secs(15 * 60));

    let cred = Cred::from_config(config).await.unwrap();
    assert_eq!(cred.key(), "api");
    assert_eq!(cred.issuer(), "svc");

    let issued = cred
        .create_tokens(payload(json!({ "userId": 5 })))
        .await
        .unwrap();
    let claims = cred.register_token(&issued.tokens.refresh_token).await.unwrap();
    assert_eq!(claims.exp - claims.iat, 30 * 24 * 60 * 60);

    let entries = cred.list_allowlist().await.unwrap();
    assert!(entries[0].key.starts_with("api:refresh:"));
    cred.close().await.unwrap();
}
