// Per-request JWT facade

use crate::blacklist::Blacklist;
use crate::factory::PayloadFactory;
use crate::payload::claim;
use crate::request::{RequestParser, RequestView};
use crate::subject::{JwtSubject, hash_subject_type, subject_hash};
use crate::{JwtError, Manager, Payload, Result, Token, TokenResponse};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Request-scoped entry point.
///
/// Build one per inbound request and drop it when the request ends. The
/// token is parsed from the request lazily, on first use, and cached.
pub struct Jwt<R: RequestView> {
    manager: Arc<Manager>,
    parser: Arc<RequestParser>,
    request: R,
    token: Option<Token>,
    custom_claims: Map<String, Value>,
    lock_subject: bool,
}

impl<R: RequestView> Jwt<R> {
    pub fn new(manager: Arc<Manager>, parser: Arc<RequestParser>, request: R) -> Self {
        let lock_subject = manager.config().lock_subject;
        Self {
            manager,
            parser,
            request,
            token: None,
            custom_claims: Map::new(),
            lock_subject,
        }
    }

    /// Issue a token for a subject.
    pub fn from_subject<S: JwtSubject + ?Sized>(&self, subject: &S) -> Result<Token> {
        let payload = self.make_payload(subject)?;
        self.manager.encode(&payload)
    }

    /// Alias of [`from_subject`](Self::from_subject).
    pub fn from_user<S: JwtSubject + ?Sized>(&self, user: &S) -> Result<Token> {
        self.from_subject(user)
    }

    /// Issue a token for arbitrary claims, without a subject.
    pub fn token_for_claims(&self, claims: Map<String, Value>) -> Result<Token> {
        let payload = self.manager.payload_factory().make(claims)?;
        self.manager.encode(&payload)
    }

    /// Build the payload [`from_subject`](Self::from_subject) would sign.
    ///
    /// Claims are layered as: the subject's custom claims, then the claims
    /// added through [`claims`](Self::claims), then `sub` and (when locking)
    /// `prv`. Custom claims never override registered ones.
    pub fn make_payload<S: JwtSubject + ?Sized>(&self, subject: &S) -> Result<Payload> {
        let mut claims = Map::new();
        claims.insert(claim::SUBJECT.to_string(), subject.jwt_identifier());
        if self.lock_subject {
            claims.insert(
                claim::SUBJECT_TYPE.to_string(),
                Value::from(subject_hash(subject)),
            );
        }

        let custom = subject
            .jwt_custom_claims()
            .into_iter()
            .chain(self.custom_claims.clone());
        for (name, value) in custom {
            if claim::RESERVED.contains(&name.as_str()) {
                keystone_log::debug!("Ignoring custom claim {} shadowing a registered claim", name);
                continue;
            }
            claims.insert(name, value);
        }

        self.manager.payload_factory().make(claims)
    }

    /// Swap the current token for a fresh one and cache the new token.
    ///
    /// The custom claims and the current `prv` are carried over. A token
    /// still inside its blacklist grace window can be refreshed again.
    pub async fn refresh(&mut self, force_forever: bool) -> Result<Token> {
        let token = self.require_token()?;

        let mut extra = self.custom_claims.clone();
        if let Some(prv) = self.manager.decode_for_refresh(&token).await?.prv() {
            extra.insert(claim::SUBJECT_TYPE.to_string(), Value::from(prv));
        }

        let fresh = self.manager.refresh(&token, force_forever, extra).await?;
        self.set_token(fresh.clone());
        Ok(fresh)
    }

    /// Blacklist the current token.
    pub async fn invalidate(&mut self, force_forever: bool) -> Result<&mut Self> {
        let token = self.require_token()?;
        self.manager.invalidate(&token, force_forever).await?;
        Ok(self)
    }

    /// Validate the current token: present, correctly signed, unexpired and
    /// not blacklisted.
    pub async fn check_or_fail(&mut self) -> Result<Payload> {
        self.get_payload(false).await
    }

    /// [`check_or_fail`](Self::check_or_fail) as a boolean.
    pub async fn check(&mut self) -> bool {
        self.check_payload().await.is_some()
    }

    /// [`check_or_fail`](Self::check_or_fail), with every failure mapped to
    /// `None`. Store outages still fail closed.
    pub async fn check_payload(&mut self) -> Option<Payload> {
        match self.check_or_fail().await {
            Ok(payload) => Some(payload),
            Err(e) => {
                if e.is_retryable() {
                    keystone_log::warn!("Token check failed closed: {}", e);
                }
                None
            }
        }
    }

    /// Current token, parsing it from the request if needed.
    pub fn token(&mut self) -> Option<Token> {
        if self.token.is_none() {
            // No token in the request simply means there is none to return.
            let _ = self.parse_token();
        }
        self.token.clone()
    }

    /// Parse the token from the request, replacing any cached one.
    pub fn parse_token(&mut self) -> Result<&mut Self> {
        let raw = self
            .parser
            .parse_token(&self.request)
            .ok_or(JwtError::TokenNotFound)?;
        Ok(self.set_token(Token::new(raw)))
    }

    /// Decode the current token with the blacklist checked.
    pub async fn get_payload(&mut self, ignore_expired: bool) -> Result<Payload> {
        let token = self.require_token()?;
        self.manager.decode(&token, true, ignore_expired).await
    }

    /// One claim of the current, validated token.
    pub async fn get_claim(&mut self, name: &str) -> Result<Option<Value>> {
        Ok(self.get_payload(false).await?.get(name).cloned())
    }

    /// Whether `model` is the type the token was issued for. Always true
    /// for tokens issued without subject locking.
    pub async fn check_subject_model<S: JwtSubject + ?Sized>(&mut self, model: &S) -> Result<bool> {
        self.check_subject_type(model.subject_type()).await
    }

    /// Like [`check_subject_model`](Self::check_subject_model), by type name.
    pub async fn check_subject_type(&mut self, type_name: &str) -> Result<bool> {
        let payload = self.get_payload(false).await?;
        Ok(match payload.prv() {
            None => true,
            Some(prv) => prv == hash_subject_type(type_name),
        })
    }

    /// Token body for a client, with the configured lifetime.
    pub fn respond_with_token(&self, token: &Token) -> TokenResponse {
        TokenResponse::new(token, self.manager.payload_factory().ttl())
    }

    pub fn set_token(&mut self, token: impl Into<Token>) -> &mut Self {
        self.token = Some(token.into());
        self
    }

    pub fn unset_token(&mut self) -> &mut Self {
        self.token = None;
        self
    }

    /// Point the facade at another request. The cached token is dropped.
    pub fn set_request(&mut self, request: R) -> &mut Self {
        self.request = request;
        self.token = None;
        self
    }

    pub fn request(&self) -> &R {
        &self.request
    }

    pub fn set_lock_subject(&mut self, lock: bool) -> &mut Self {
        self.lock_subject = lock;
        self
    }

    /// Add claims to every token issued through this facade.
    pub fn claims(&mut self, claims: Map<String, Value>) -> &mut Self {
        self.custom_claims.extend(claims);
        self
    }

    pub fn custom_claims(&self) -> &Map<String, Value> {
        &self.custom_claims
    }

    pub fn reset_claims(&mut self) -> &mut Self {
        self.custom_claims.clear();
        self
    }

    pub fn manager(&self) -> &Manager {
        &self.manager
    }

    pub fn request_parser(&self) -> &RequestParser {
        &self.parser
    }

    pub fn payload_factory(&self) -> &PayloadFactory {
        self.manager.payload_factory()
    }

    pub fn blacklist(&self) -> &Blacklist {
        self.manager.blacklist()
    }

    fn require_token(&mut self) -> Result<Token> {
        self.token().ok_or(JwtError::TokenRequired)
    }
}
