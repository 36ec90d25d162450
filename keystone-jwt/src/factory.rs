// Builds payloads with the registered claims filled in

use crate::clock::SharedClock;
use crate::payload::claim;
use crate::{JwtConfig, JwtError, Payload, Result};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Turns caller claims into a complete [`Payload`].
///
/// Missing registered claims are added: `iat` is now, `exp` is `iat + ttl`,
/// `nbf` is `iat + nbf_offset`, `jti` is a fresh v4 UUID and `iss` comes
/// from the config when one is set. Caller values win, as long as they have
/// the right type.
#[derive(Debug, Clone)]
pub struct PayloadFactory {
    ttl: i64,
    nbf_offset: i64,
    issuer: Option<String>,
    clock: SharedClock,
}

impl PayloadFactory {
    pub fn new(config: &JwtConfig, clock: SharedClock) -> Self {
        Self {
            ttl: i64::try_from(config.ttl).unwrap_or(i64::MAX),
            nbf_offset: i64::try_from(config.nbf_offset).unwrap_or(i64::MAX),
            issuer: config.issuer.clone(),
            clock,
        }
    }

    /// Build a payload from `claims`.
    ///
    /// Fails with `InvalidClaim` when a registered claim has the wrong type
    /// or `nbf` ends up after `exp`, and when a derived `exp` or `nbf`
    /// would not fit in an `i64`.
    pub fn make(&self, claims: Map<String, Value>) -> Result<Payload> {
        let now = self.clock.now();
        let mut payload = Map::new();

        if let Some(issuer) = &self.issuer {
            payload.insert(claim::ISSUER.to_string(), Value::from(issuer.as_str()));
        }
        payload.insert(claim::ISSUED_AT.to_string(), Value::from(now));
        payload.insert(
            claim::EXPIRATION.to_string(),
            Value::from(shift(now, self.ttl, claim::EXPIRATION)?),
        );
        payload.insert(
            claim::NOT_BEFORE.to_string(),
            Value::from(shift(now, self.nbf_offset, claim::NOT_BEFORE)?),
        );
        payload.insert(
            claim::JWT_ID.to_string(),
            Value::from(Uuid::new_v4().simple().to_string()),
        );

        // A caller-supplied iat moves the default exp/nbf with it.
        if let Some(iat) = claims.get(claim::ISSUED_AT).and_then(Value::as_i64) {
            if !claims.contains_key(claim::EXPIRATION) {
                payload.insert(
                    claim::EXPIRATION.to_string(),
                    Value::from(shift(iat, self.ttl, claim::EXPIRATION)?),
                );
            }
            if !claims.contains_key(claim::NOT_BEFORE) {
                payload.insert(
                    claim::NOT_BEFORE.to_string(),
                    Value::from(shift(iat, self.nbf_offset, claim::NOT_BEFORE)?),
                );
            }
        }

        for (name, value) in claims {
            payload.insert(name, value);
        }

        Payload::new(payload)
    }

    pub fn ttl(&self) -> i64 {
        self.ttl
    }
}

fn shift(base: i64, by: i64, name: &str) -> Result<i64> {
    base.checked_add(by)
        .ok_or_else(|| JwtError::InvalidClaim(format!("{} out of range", name)))
}
