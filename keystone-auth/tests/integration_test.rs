//! Integration tests for keystone-auth

use keystone_auth::*;
use keystone_jwt::{HttpRequest, JwtConfig, JwtError, JwtSubject, Manager, MockClock, Token};
use serde_json::{Value, json};
use std::sync::Arc;

struct Member(&'static str);

impl JwtSubject for Member {
    fn jwt_identifier(&self) -> Value {
        json!(self.0)
    }
}

fn setup() -> (Arc<Manager>, MockClock, GuardRegistry) {
    let clock = MockClock::new(1_700_000_000);
    let manager = Arc::new(
        Manager::builder(JwtConfig::new("integration-secret"))
            .clock(Arc::new(clock.clone()))
            .build()
            .unwrap(),
    );
    let registry = GuardRegistry::new("api")
        .with_guard("api", JwtGuard::new(manager.clone()))
        .with_redirect("/login");
    (manager, clock, registry)
}

fn login(manager: &Arc<Manager>, member: &Member) -> Token {
    keystone_jwt::for_request(manager.clone(), HttpRequest::default())
        .from_subject(member)
        .unwrap()
}

fn bearer(token: &Token) -> HttpRequest {
    HttpRequest::new("GET", "/profile").with_header("Authorization", format!("Bearer {}", token))
}

#[tokio::test]
async fn test_protected_route() {
    let (manager, _, registry) = setup();
    let token = login(&manager, &Member("m1"));

    let auth = registry
        .authenticate(&AuthRequirement::default_guard(), &bearer(&token))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(auth.guard, "api");
    assert_eq!(auth.payload.subject().as_deref(), Some("m1"));
}

#[tokio::test]
async fn test_logout_then_access_is_rejected() {
    let (manager, _, registry) = setup();
    let token = login(&manager, &Member("m1"));

    let mut jwt = keystone_jwt::for_request(manager.clone(), bearer(&token));
    jwt.invalidate(false).await.unwrap();

    let err = registry
        .authenticate(&AuthRequirement::default_guard(), &bearer(&token))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        AuthError::Unauthenticated {
            guards: vec!["api".into()],
            redirect_to: Some("/login".into()),
        }
    );
}

#[tokio::test]
async fn test_expired_token_on_passable_route() {
    let (manager, clock, registry) = setup();
    let token = login(&manager, &Member("m1"));
    clock.advance(7200);

    let requirement = AuthRequirement::new(["api"]).passable(true);
    let result = registry.authenticate(&requirement, &bearer(&token)).await.unwrap();
    assert!(result.is_none());

    let strict = AuthRequirement::new(["api"]);
    assert_eq!(
        registry
            .authenticate(&strict, &bearer(&token))
            .await
            .unwrap_err()
            .status_code(),
        401
    );
}

#[tokio::test]
async fn test_unknown_guard() {
    let (_, _, registry) = setup();
    let err = registry
        .authenticate(&AuthRequirement::new(["admin"]), &HttpRequest::default())
        .await
        .unwrap_err();
    assert_eq!(err, AuthError::GuardNotFound("admin".into()));
}

#[test]
fn test_jwt_errors_convert() {
    let err: AuthError = JwtError::TokenBlacklisted.into();
    assert_eq!(err.to_string(), "JWT error: Token has been blacklisted");
}
