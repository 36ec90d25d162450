// Per-route authentication and policy requirements

use crate::{AuthError, Result};
use keystone_jwt::{Payload, hash_subject_type};
use serde::{Deserialize, Serialize};

fn dedup(names: impl IntoIterator<Item = impl Into<String>>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for name in names.into_iter().map(Into::into) {
        if !out.contains(&name) {
            out.push(name);
        }
    }
    out
}

/// Which guards protect a route.
///
/// An empty guard list means the registry's default guard. A `passable`
/// route lets unauthenticated requests through instead of rejecting them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthRequirement {
    pub guards: Vec<String>,
    pub passable: bool,
}

impl AuthRequirement {
    /// Require one of `guards`; duplicates are dropped, order is kept.
    pub fn new(guards: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            guards: dedup(guards),
            passable: false,
        }
    }

    /// Require the default guard.
    pub fn default_guard() -> Self {
        Self::default()
    }

    pub fn passable(mut self, passable: bool) -> Self {
        self.passable = passable;
        self
    }
}

/// Subject types allowed on a route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyRequirement {
    models: Vec<String>,
}

impl PolicyRequirement {
    /// Fails with `InvalidRequirement` when no model is given.
    pub fn new(models: impl IntoIterator<Item = impl Into<String>>) -> Result<Self> {
        let models = dedup(models);
        if models.is_empty() {
            return Err(AuthError::InvalidRequirement(
                "a policy requires at least one model".to_string(),
            ));
        }
        Ok(Self { models })
    }

    pub fn models(&self) -> &[String] {
        &self.models
    }

    /// Whether the token's subject type is one of the models. Tokens
    /// issued without subject locking are allowed.
    pub fn permits(&self, payload: &Payload) -> bool {
        match payload.prv() {
            None => true,
            Some(prv) => self.models.iter().any(|m| hash_subject_type(m) == prv),
        }
    }

    pub fn authorize(&self, payload: &Payload) -> Result<()> {
        if self.permits(payload) {
            Ok(())
        } else {
            Err(AuthError::Forbidden(format!(
                "subject is not one of: {}",
                self.models.join(", ")
            )))
        }
    }
}

impl<'de> Deserialize<'de> for PolicyRequirement {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Raw {
            models: Vec<String>,
        }

        let raw = Raw::deserialize(deserializer)?;
        Self::new(raw.models).map_err(serde::de::Error::custom)
    }
}
