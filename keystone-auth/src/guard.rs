// Authentication guards

use crate::{AuthError, Result};
use async_trait::async_trait;
use keystone_jwt::{
    JwtSubject, Manager, Payload, RequestParser, RequestView, hash_subject_type,
};
use std::sync::Arc;

/// Guard trait for protecting routes
#[async_trait]
pub trait Guard: Send + Sync {
    /// Authenticate the request and return the verified claims.
    async fn authenticate(&self, request: &dyn RequestView) -> Result<Payload>;

    /// Check if the request can proceed
    async fn can_activate(&self, request: &dyn RequestView) -> Result<bool> {
        match self.authenticate(request).await {
            Ok(_) => Ok(true),
            Err(AuthError::JwtError(e)) if e.is_retryable() => Err(AuthError::JwtError(e)),
            Err(_) => Ok(false),
        }
    }
}

/// Stateless guard backed by a JWT [`Manager`].
///
/// Every call builds a request-scoped [`keystone_jwt::Jwt`], so nothing is
/// shared between requests apart from the manager and the parser chain.
#[derive(Clone)]
pub struct JwtGuard {
    manager: Arc<Manager>,
    parser: Arc<RequestParser>,
    subject_types: Vec<String>,
}

impl JwtGuard {
    pub fn new(manager: Arc<Manager>) -> Self {
        Self {
            manager,
            parser: Arc::new(RequestParser::default()),
            subject_types: Vec::new(),
        }
    }

    /// Use a custom parser chain
    pub fn with_parser(mut self, parser: RequestParser) -> Self {
        self.parser = Arc::new(parser);
        self
    }

    /// Only accept tokens issued for this subject type. May be called more
    /// than once to accept several types.
    pub fn for_subject_type(mut self, type_name: impl Into<String>) -> Self {
        self.subject_types.push(type_name.into());
        self
    }

    /// Only accept tokens issued for the type of `subject`.
    pub fn for_subject<S: JwtSubject + ?Sized>(self, subject: &S) -> Self {
        self.for_subject_type(subject.subject_type())
    }

    pub fn manager(&self) -> &Arc<Manager> {
        &self.manager
    }

    fn subject_allowed(&self, payload: &Payload) -> bool {
        match payload.prv() {
            None => true,
            Some(_) if self.subject_types.is_empty() => true,
            Some(prv) => self
                .subject_types
                .iter()
                .any(|name| hash_subject_type(name) == prv),
        }
    }
}

#[async_trait]
impl Guard for JwtGuard {
    async fn authenticate(&self, request: &dyn RequestView) -> Result<Payload> {
        let mut jwt = keystone_jwt::Jwt::new(self.manager.clone(), self.parser.clone(), request);
        let payload = jwt.check_or_fail().await?;

        if !self.subject_allowed(&payload) {
            keystone_log::debug!("Token subject type not accepted by guard");
            return Err(AuthError::Forbidden(
                "token was issued for another subject type".to_string(),
            ));
        }
        Ok(payload)
    }
}
