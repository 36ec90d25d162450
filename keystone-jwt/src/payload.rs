// JWT payload: an ordered set of claims with typed accessors

use crate::{JwtError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

/// Registered claim names.
pub mod claim {
    pub const SUBJECT: &str = "sub";
    pub const ISSUER: &str = "iss";
    pub const AUDIENCE: &str = "aud";
    pub const EXPIRATION: &str = "exp";
    pub const NOT_BEFORE: &str = "nbf";
    pub const ISSUED_AT: &str = "iat";
    pub const JWT_ID: &str = "jti";
    /// Hash of the subject's concrete type, set when the subject is locked.
    pub const SUBJECT_TYPE: &str = "prv";

    /// Claims a caller cannot set to an arbitrary type.
    pub const RESERVED: &[&str] = &[
        SUBJECT,
        ISSUER,
        AUDIENCE,
        EXPIRATION,
        NOT_BEFORE,
        ISSUED_AT,
        JWT_ID,
        SUBJECT_TYPE,
    ];

    /// Claims that must hold a Unix timestamp.
    pub const TIMESTAMPS: &[&str] = &[EXPIRATION, NOT_BEFORE, ISSUED_AT];
}

/// Decoded or freshly built token claims.
///
/// Claims keep their insertion order, which is also the order they are
/// serialized in. A payload is immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Payload {
    claims: Map<String, Value>,
}

impl Payload {
    /// Wrap a claim map after checking the registered claims are well typed.
    pub fn new(claims: Map<String, Value>) -> Result<Self> {
        validate_claims(&claims)?;
        Ok(Self { claims })
    }

    /// Get a raw claim value.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.claims.get(name)
    }

    /// Deserialize a claim into `T`. Missing claims yield `Ok(None)`.
    pub fn get_as<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        self.claims
            .get(name)
            .map(|v| {
                serde_json::from_value(v.clone())
                    .map_err(|e| JwtError::InvalidClaim(format!("{}: {}", name, e)))
            })
            .transpose()
    }

    pub fn has(&self, name: &str) -> bool {
        self.claims.contains_key(name)
    }

    /// True when every given claim is present with an equal value.
    pub fn matches(&self, expected: &Map<String, Value>) -> bool {
        expected
            .iter()
            .all(|(name, value)| self.claims.get(name) == Some(value))
    }

    /// Subject identifier. Numeric subjects are rendered as strings.
    pub fn subject(&self) -> Option<String> {
        match self.claims.get(claim::SUBJECT)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn issuer(&self) -> Option<&str> {
        self.claims.get(claim::ISSUER).and_then(Value::as_str)
    }

    pub fn issued_at(&self) -> Option<i64> {
        self.timestamp(claim::ISSUED_AT)
    }

    pub fn expires_at(&self) -> Option<i64> {
        self.timestamp(claim::EXPIRATION)
    }

    pub fn not_before(&self) -> Option<i64> {
        self.timestamp(claim::NOT_BEFORE)
    }

    pub fn jti(&self) -> Option<&str> {
        self.claims.get(claim::JWT_ID).and_then(Value::as_str)
    }

    /// Stored subject type hash, if the subject was locked at issuance.
    pub fn prv(&self) -> Option<&str> {
        self.claims.get(claim::SUBJECT_TYPE).and_then(Value::as_str)
    }

    /// Expired when `exp + leeway` lies strictly before `now`.
    pub fn is_expired(&self, now: i64, leeway: i64) -> bool {
        self.expires_at()
            .is_some_and(|exp| exp.saturating_add(leeway) < now)
    }

    /// Not yet valid when `nbf - leeway` lies strictly after `now`.
    pub fn is_premature(&self, now: i64, leeway: i64) -> bool {
        self.not_before()
            .is_some_and(|nbf| nbf.saturating_sub(leeway) > now)
    }

    pub fn claims(&self) -> &Map<String, Value> {
        &self.claims
    }

    pub fn to_map(&self) -> Map<String, Value> {
        self.claims.clone()
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.claims
    }

    pub fn len(&self) -> usize {
        self.claims.len()
    }

    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }

    fn timestamp(&self, name: &str) -> Option<i64> {
        self.claims.get(name).and_then(Value::as_i64)
    }
}

fn validate_claims(claims: &Map<String, Value>) -> Result<()> {
    for name in claim::TIMESTAMPS {
        if let Some(value) = claims.get(*name)
            && value.as_i64().is_none()
        {
            return Err(JwtError::InvalidClaim(format!(
                "{} must be an integer timestamp",
                name
            )));
        }
    }

    if let Some(sub) = claims.get(claim::SUBJECT)
        && !(sub.is_string() || sub.is_number())
    {
        return Err(JwtError::InvalidClaim(
            "sub must be a string or a number".to_string(),
        ));
    }

    for name in [claim::JWT_ID, claim::ISSUER, claim::SUBJECT_TYPE] {
        if let Some(value) = claims.get(name)
            && !value.is_string()
        {
            return Err(JwtError::InvalidClaim(format!("{} must be a string", name)));
        }
    }

    if let Some(aud) = claims.get(claim::AUDIENCE) {
        let valid = match aud {
            Value::String(_) => true,
            Value::Array(items) => items.iter().all(Value::is_string),
            _ => false,
        };
        if !valid {
            return Err(JwtError::InvalidClaim(
                "aud must be a string or a list of strings".to_string(),
            ));
        }
    }

    if let (Some(nbf), Some(exp)) = (
        claims.get(claim::NOT_BEFORE).and_then(Value::as_i64),
        claims.get(claim::EXPIRATION).and_then(Value::as_i64),
    ) && nbf > exp
    {
        return Err(JwtError::InvalidClaim(
            "nbf must not be later than exp".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_typed_accessors() {
        let payload = Payload::new(map(json!({
            "sub": 42,
            "iat": 100,
            "exp": 200,
            "nbf": 100,
            "jti": "abc",
            "prv": "deadbeef",
            "role": "admin",
        })))
        .unwrap();

        assert_eq!(payload.subject().as_deref(), Some("42"));
        assert_eq!(payload.issued_at(), Some(100));
        assert_eq!(payload.expires_at(), Some(200));
        assert_eq!(payload.jti(), Some("abc"));
        assert_eq!(payload.prv(), Some("deadbeef"));
        assert_eq!(payload.get_as::<String>("role").unwrap().as_deref(), Some("admin"));
        assert_eq!(payload.get_as::<String>("missing").unwrap(), None);
    }

    #[test]
    fn test_claim_order_is_preserved() {
        let payload = Payload::new(map(json!({"sub": "u1", "exp": 10, "iat": 1}))).unwrap();
        let keys: Vec<_> = payload.claims().keys().cloned().collect();
        assert_eq!(keys, vec!["sub", "exp", "iat"]);
    }

    #[test]
    fn test_rejects_non_numeric_exp() {
        let err = Payload::new(map(json!({"exp": "tomorrow"}))).unwrap_err();
        assert!(matches!(err, JwtError::InvalidClaim(_)));
    }

    #[test]
    fn test_rejects_nbf_after_exp() {
        let err = Payload::new(map(json!({"nbf": 20, "exp": 10}))).unwrap_err();
        assert!(matches!(err, JwtError::InvalidClaim(_)));
    }

    #[test]
    fn test_rejects_bad_audience() {
        assert!(Payload::new(map(json!({"aud": ["a", 1]}))).is_err());
        assert!(Payload::new(map(json!({"aud": ["a", "b"]}))).is_ok());
    }

    #[test]
    fn test_expiry_with_leeway() {
        let payload = Payload::new(map(json!({"exp": 100, "nbf": 50}))).unwrap();

        assert!(!payload.is_expired(100, 0));
        assert!(payload.is_expired(101, 0));
        assert!(!payload.is_expired(105, 10));

        assert!(payload.is_premature(49, 0));
        assert!(!payload.is_premature(45, 5));
    }

    #[test]
    fn test_extreme_timestamps_saturate() {
        let payload = Payload::new(map(json!({"exp": i64::MAX, "nbf": i64::MIN}))).unwrap();

        assert!(!payload.is_expired(i64::MAX, 60));
        assert!(!payload.is_premature(i64::MIN, 60));
    }

    #[test]
    fn test_matches() {
        let payload = Payload::new(map(json!({"sub": "u1", "role": "admin"}))).unwrap();
        assert!(payload.matches(&map(json!({"role": "admin"}))));
        assert!(!payload.matches(&map(json!({"role": "guest"}))));
    }
}
