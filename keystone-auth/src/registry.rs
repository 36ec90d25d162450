// Named guards and route authentication

use crate::{AuthError, AuthRequirement, Guard, Result};
use keystone_jwt::{Payload, RequestView};
use std::collections::HashMap;
use std::sync::Arc;

/// A request authenticated by a named guard.
#[derive(Debug, Clone, PartialEq)]
pub struct Authenticated {
    pub guard: String,
    pub payload: Payload,
}

/// Guards by name, plus the one used when a requirement names none.
#[derive(Clone)]
pub struct GuardRegistry {
    guards: HashMap<String, Arc<dyn Guard>>,
    default_guard: String,
    redirect_to: Option<String>,
}

impl GuardRegistry {
    pub fn new(default_guard: impl Into<String>) -> Self {
        Self {
            guards: HashMap::new(),
            default_guard: default_guard.into(),
            redirect_to: None,
        }
    }

    /// Register a guard under `name`, replacing any previous one.
    pub fn with_guard(mut self, name: impl Into<String>, guard: impl Guard + 'static) -> Self {
        self.register(name, Arc::new(guard));
        self
    }

    pub fn register(&mut self, name: impl Into<String>, guard: Arc<dyn Guard>) {
        let name = name.into();
        keystone_log::debug!("Registered auth guard {}", name);
        self.guards.insert(name, guard);
    }

    /// Where unauthenticated requests should be sent, if anywhere.
    pub fn with_redirect(mut self, to: impl Into<String>) -> Self {
        self.redirect_to = Some(to.into());
        self
    }

    /// Guard by name, or the default guard for `None`.
    pub fn guard(&self, name: Option<&str>) -> Result<Arc<dyn Guard>> {
        let name = name.unwrap_or(&self.default_guard);
        self.guards
            .get(name)
            .cloned()
            .ok_or_else(|| AuthError::GuardNotFound(name.to_string()))
    }

    /// Make `name` the default guard.
    pub fn should_use(&mut self, name: impl Into<String>) {
        self.default_guard = name.into();
    }

    pub fn default_guard(&self) -> &str {
        &self.default_guard
    }

    pub fn has_guard(&self, name: &str) -> bool {
        self.guards.contains_key(name)
    }

    /// Run a route's requirement against a request.
    ///
    /// Guards are tried in order and the first success wins. When all fail,
    /// a passable route yields `Ok(None)`; otherwise the result is
    /// `Unauthenticated`. A store outage is returned as is, passable route
    /// or not, so a handler can answer 503 instead of 401.
    pub async fn authenticate(
        &self,
        requirement: &AuthRequirement,
        request: &dyn RequestView,
    ) -> Result<Option<Authenticated>> {
        let names = if requirement.guards.is_empty() {
            vec![self.default_guard.clone()]
        } else {
            requirement.guards.clone()
        };

        let mut outage = None;
        for name in &names {
            let guard = self.guard(Some(name))?;
            match guard.authenticate(request).await {
                Ok(payload) => {
                    return Ok(Some(Authenticated {
                        guard: name.clone(),
                        payload,
                    }));
                }
                Err(AuthError::JwtError(e)) if e.is_retryable() => {
                    keystone_log::warn!("Guard {} could not reach the blacklist: {}", name, e);
                    outage = Some(AuthError::JwtError(e));
                }
                Err(e) => {
                    keystone_log::debug!("Guard {} rejected request: {}", name, e);
                }
            }
        }

        if let Some(outage) = outage {
            return Err(outage);
        }
        if requirement.passable {
            return Ok(None);
        }
        Err(AuthError::Unauthenticated {
            guards: names,
            redirect_to: self.redirect_to.clone(),
        })
    }
}

impl std::fmt::Debug for GuardRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.guards.keys().collect();
        names.sort();
        f.debug_struct("GuardRegistry")
            .field("guards", &names)
            .field("default_guard", &self.default_guard)
            .finish()
    }
}
