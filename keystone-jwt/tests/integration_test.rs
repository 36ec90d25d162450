//! Integration tests for keystone-jwt

use keystone_jwt::*;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use std::time::Duration;

const T0: i64 = 1_700_000_000;

struct User {
    id: &'static str,
}

impl JwtSubject for User {
    fn jwt_identifier(&self) -> Value {
        json!(self.id)
    }

    fn jwt_custom_claims(&self) -> Map<String, Value> {
        let mut claims = Map::new();
        claims.insert("tenant".into(), json!("acme"));
        claims
    }
}

struct ApiClient;

impl JwtSubject for ApiClient {
    fn jwt_identifier(&self) -> Value {
        json!(42)
    }
}

fn setup(config: JwtConfig) -> (Arc<Manager>, MockClock, Arc<MemoryStore>) {
    let clock = MockClock::new(T0);
    let store = Arc::new(MemoryStore::new());
    let manager = Manager::builder(config)
        .clock(Arc::new(clock.clone()))
        .store(store.clone())
        .build()
        .unwrap();
    (Arc::new(manager), clock, store)
}

fn request_with(token: &Token) -> HttpRequest {
    HttpRequest::new("GET", "/me").with_header("Authorization", format!("Bearer {}", token))
}

#[tokio::test]
async fn test_login_expire_refresh_flow() {
    let (manager, clock, _) = setup(JwtConfig::new("test_secret_key_32_bytes_long!!!"));

    let token = for_request(manager.clone(), HttpRequest::default())
        .from_subject(&User { id: "u1" })
        .unwrap();

    let mut jwt = for_request(manager.clone(), request_with(&token));
    let payload = jwt.check_or_fail().await.unwrap();
    assert_eq!(payload.subject().as_deref(), Some("u1"));
    assert_eq!(payload.issued_at(), Some(T0));
    assert_eq!(payload.expires_at(), Some(T0 + 3600));
    assert_eq!(payload.get("tenant"), Some(&json!("acme")));

    clock.advance(3601);
    assert_eq!(jwt.check_or_fail().await, Err(JwtError::TokenExpired));
    assert!(!jwt.check().await);

    let fresh = jwt.refresh(false).await.unwrap();
    assert_ne!(fresh, token);

    let payload = jwt.check_or_fail().await.unwrap();
    assert_eq!(payload.subject().as_deref(), Some("u1"));
    assert_eq!(payload.issued_at(), Some(T0 + 3601));
    assert_eq!(payload.prv(), Some(hash_subject_type(User { id: "x" }.subject_type()).as_str()));

    // The old token cannot be refreshed twice
    assert_eq!(
        manager.refresh(&token, false, Map::new()).await,
        Err(JwtError::TokenBlacklisted)
    );
}

#[tokio::test]
async fn test_subject_locking() {
    let (manager, _, _) = setup(JwtConfig::new("secret"));

    let token = for_request(manager.clone(), HttpRequest::default())
        .from_subject(&ApiClient)
        .unwrap();
    let mut jwt = for_request(manager.clone(), request_with(&token));
    assert!(jwt.check_subject_model(&ApiClient).await.unwrap());
    assert!(!jwt.check_subject_model(&User { id: "u1" }).await.unwrap());

    let mut unlocked = for_request(manager.clone(), HttpRequest::default());
    unlocked.set_lock_subject(false);
    let token = unlocked.from_subject(&ApiClient).unwrap();
    let mut jwt = for_request(manager, request_with(&token));
    assert!(jwt.check_subject_model(&User { id: "u1" }).await.unwrap());
}

#[tokio::test]
async fn test_grace_period_allows_concurrent_refresh() {
    let config = JwtConfig::new("secret").with_grace_period(Duration::from_secs(30));
    let (manager, clock, _) = setup(config);

    let token = for_request(manager.clone(), HttpRequest::default())
        .from_subject(&User { id: "u1" })
        .unwrap();

    // Two in-flight requests carrying the same token
    let mut first_request = for_request(manager.clone(), request_with(&token));
    let mut second_request = for_request(manager.clone(), request_with(&token));

    let first = first_request.refresh(false).await.unwrap();
    clock.advance(10);
    let second = second_request.refresh(false).await.unwrap();
    assert_ne!(first, second);
    assert!(second_request.check().await);
    assert_eq!(
        second_request.check_or_fail().await.unwrap().prv(),
        first_request.check_or_fail().await.unwrap().prv()
    );

    // Standard validation already rejects it
    assert_eq!(
        manager.decode(&token, true, false).await,
        Err(JwtError::TokenBlacklisted)
    );

    clock.advance(21);
    assert_eq!(
        manager.refresh(&token, false, Map::new()).await,
        Err(JwtError::TokenBlacklisted)
    );
}

#[tokio::test]
async fn test_force_forever_ignores_grace() {
    let config = JwtConfig::new("secret").with_grace_period(Duration::from_secs(30));
    let (manager, _, _) = setup(config);

    let token = for_request(manager.clone(), HttpRequest::default())
        .from_subject(&User { id: "u1" })
        .unwrap();
    manager.invalidate(&token, true).await.unwrap();

    let entry = manager
        .blacklist()
        .entry(&manager.decode(&token, false, false).await.unwrap())
        .await
        .unwrap()
        .unwrap();
    assert!(entry.is_forever());
    assert_eq!(
        manager.refresh(&token, false, Map::new()).await,
        Err(JwtError::TokenBlacklisted)
    );
}

#[tokio::test]
async fn test_blacklist_survives_manager_rebuild() {
    let config = JwtConfig::new("secret");
    let (manager, clock, store) = setup(config.clone());

    let token = for_request(manager.clone(), HttpRequest::default())
        .from_subject(&User { id: "u1" })
        .unwrap();
    manager.invalidate(&token, false).await.unwrap();

    let rebuilt = Manager::builder(config)
        .clock(Arc::new(clock))
        .store(store)
        .build()
        .unwrap();
    assert_eq!(
        rebuilt.decode(&token, true, false).await,
        Err(JwtError::TokenBlacklisted)
    );
}

#[tokio::test]
async fn test_persistent_claims_carried_on_refresh() {
    let config = JwtConfig::new("secret").with_persistent_claims(vec!["tenant".into()]);
    let (manager, _, _) = setup(config);

    let token = for_request(manager.clone(), HttpRequest::default())
        .from_subject(&User { id: "u1" })
        .unwrap();

    let mut extra = Map::new();
    extra.insert("scope".into(), json!("admin"));
    let fresh = manager.refresh(&token, false, extra).await.unwrap();

    let payload = manager.decode(&fresh, true, false).await.unwrap();
    assert_eq!(payload.get("tenant"), Some(&json!("acme")));
    assert_eq!(payload.get("scope"), Some(&json!("admin")));
}

#[tokio::test]
async fn test_blacklist_disabled() {
    let (manager, _, _) = setup(JwtConfig::new("secret").with_blacklist(false));

    let token = for_request(manager.clone(), HttpRequest::default())
        .from_subject(&User { id: "u1" })
        .unwrap();

    assert_eq!(
        manager.invalidate(&token, false).await,
        Err(JwtError::BlacklistDisabled)
    );
    assert!(manager.refresh(&token, false, Map::new()).await.is_ok());
    assert!(manager.decode(&token, true, false).await.is_ok());
}

#[tokio::test]
async fn test_token_from_query_and_cookie() {
    let (manager, _, _) = setup(JwtConfig::new("secret"));
    let token = for_request(manager.clone(), HttpRequest::default())
        .from_subject(&User { id: "u1" })
        .unwrap();

    let request = HttpRequest::new("GET", "/").with_query("token", token.get());
    assert!(for_request(manager.clone(), request).check().await);

    let request = HttpRequest::new("GET", "/").with_header("Cookie", format!("token={}", token));
    assert!(for_request(manager, request).check().await);
}

#[tokio::test]
async fn test_issuer_and_audience() {
    let config = JwtConfig::new("secret")
        .with_issuer("https://auth.example.com")
        .with_audience(vec!["api".into()]);
    let (manager, _, _) = setup(config);

    let mut claims = Map::new();
    claims.insert("sub".into(), json!("u1"));
    claims.insert("aud".into(), json!("api"));
    let token = for_request(manager.clone(), HttpRequest::default())
        .token_for_claims(claims)
        .unwrap();

    let payload = manager.decode(&token, true, false).await.unwrap();
    assert_eq!(payload.issuer(), Some("https://auth.example.com"));

    let mut claims = Map::new();
    claims.insert("sub".into(), json!("u1"));
    claims.insert("aud".into(), json!("other"));
    let token = for_request(manager.clone(), HttpRequest::default())
        .token_for_claims(claims)
        .unwrap();
    assert!(matches!(
        manager.decode(&token, true, false).await,
        Err(JwtError::InvalidClaim(_))
    ));
}

#[test]
fn test_config_from_toml() {
    let config = JwtConfig::from_toml_str(
        r#"
        secret = "toml-secret"
        ttl = 900
        blacklist_grace_period = 15
        persistent_claims = ["tenant"]
        "#,
    )
    .unwrap();

    assert_eq!(config.ttl, 900);
    assert_eq!(config.blacklist_grace_period, 15);
    assert_eq!(config.algorithm, Algorithm::HS256);

    let manager = Manager::new(config).unwrap();
    let token = manager
        .encode(&manager.payload_factory().make(Map::new()).unwrap())
        .unwrap();
    let payload = tokio_test::block_on(manager.decode(&token, true, false)).unwrap();
    assert_eq!(
        payload.expires_at().unwrap() - payload.issued_at().unwrap(),
        900
    );
}
