// Token lifecycle: encode, decode, refresh, invalidate

use crate::blacklist::Blacklist;
use crate::clock::{self, SharedClock};
use crate::codec::{JwtCodec, TokenCodec};
use crate::factory::PayloadFactory;
use crate::payload::claim;
use crate::store::{BlacklistStore, MemoryStore};
use crate::{JwtConfig, JwtError, Payload, Result, Token};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Long-lived, shared token manager.
///
/// Decoding a token walks `parsed -> verified -> valid`, failing with
/// `Malformed`/`InvalidSignature` at verification, then `TokenExpired`,
/// `TokenNotYetValid` or `TokenBlacklisted`.
#[derive(Clone)]
pub struct Manager {
    config: Arc<JwtConfig>,
    codec: Arc<dyn TokenCodec>,
    blacklist: Blacklist,
    factory: PayloadFactory,
    clock: SharedClock,
}

/// Knobs for [`Manager::decode_with`].
#[derive(Debug, Clone, Copy)]
struct DecodeOptions {
    check_blacklist: bool,
    ignore_expired: bool,
    /// Accept blacklist entries still inside their grace window.
    allow_grace: bool,
}

impl Manager {
    /// Manager with an in-memory blacklist and the system clock.
    pub fn new(config: JwtConfig) -> Result<Self> {
        Self::builder(config).build()
    }

    pub fn builder(config: JwtConfig) -> ManagerBuilder {
        ManagerBuilder {
            config,
            codec: None,
            store: None,
            clock: None,
        }
    }

    /// Sign a payload.
    pub fn encode(&self, payload: &Payload) -> Result<Token> {
        let token = self.codec.sign(payload)?;
        keystone_log::debug!(
            "Issued token {} for subject {:?}",
            Blacklist::identifier(payload),
            payload.subject()
        );
        Ok(token)
    }

    /// Verify a token and return its payload.
    ///
    /// Expiry is enforced unless `ignore_expired`. With `check_blacklist`,
    /// any blacklist entry rejects the token, grace window or not. Grace
    /// windows only ever admit a token to [`refresh`](Self::refresh); see
    /// "Grace period semantics" in DESIGN.md.
    pub async fn decode(
        &self,
        token: &Token,
        check_blacklist: bool,
        ignore_expired: bool,
    ) -> Result<Payload> {
        self.decode_with(
            token,
            DecodeOptions {
                check_blacklist,
                ignore_expired,
                allow_grace: false,
            },
        )
        .await
    }

    /// Exchange a token for a new one.
    ///
    /// The old token may be expired but must still be inside its refresh
    /// window (`exp + refresh_ttl >= now`). It is blacklisted, permanently
    /// with `force_forever`, else with the configured grace period. The new
    /// token carries the old subject, the configured persistent claims and
    /// `extra_claims`, with fresh `iat`, `exp` and `jti`.
    pub async fn refresh(
        &self,
        token: &Token,
        force_forever: bool,
        extra_claims: Map<String, Value>,
    ) -> Result<Token> {
        let payload = self.decode_for_refresh(token).await?;

        let now = self.clock.now();
        if let Some(exp) = payload.expires_at()
            && self.refresh_deadline(exp) < now
        {
            keystone_log::debug!("Refresh window closed for token expired at {}", exp);
            return Err(JwtError::TokenExpired);
        }

        if self.config.blacklist_enabled {
            if force_forever {
                self.blacklist.add_forever(&payload).await?;
            } else {
                self.blacklist.add(&payload).await?;
            }
        }

        let claims = self.refresh_claims(&payload, extra_claims);
        let fresh = self.factory.make(claims)?;
        self.encode(&fresh)
    }

    /// Blacklist a token. Expiry is ignored and the blacklist is not
    /// consulted first, so invalidating twice is harmless.
    pub async fn invalidate(&self, token: &Token, force_forever: bool) -> Result<()> {
        if !self.config.blacklist_enabled {
            return Err(JwtError::BlacklistDisabled);
        }

        let payload = self.decode(token, false, true).await?;
        if force_forever {
            self.blacklist.add_forever(&payload).await
        } else {
            self.blacklist.add(&payload).await
        }
    }

    pub fn payload_factory(&self) -> &PayloadFactory {
        &self.factory
    }

    pub fn blacklist(&self) -> &Blacklist {
        &self.blacklist
    }

    pub fn config(&self) -> &JwtConfig {
        &self.config
    }

    pub fn codec(&self) -> &dyn TokenCodec {
        self.codec.as_ref()
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    /// Decode the way [`refresh`](Self::refresh) does: expiry ignored and
    /// blacklist entries inside their grace window accepted.
    pub(crate) async fn decode_for_refresh(&self, token: &Token) -> Result<Payload> {
        self.decode_with(
            token,
            DecodeOptions {
                check_blacklist: true,
                ignore_expired: true,
                allow_grace: true,
            },
        )
        .await
    }

    fn refresh_deadline(&self, exp: i64) -> i64 {
        let refresh_ttl = i64::try_from(self.config.refresh_ttl).unwrap_or(i64::MAX);
        let leeway = i64::try_from(self.config.leeway).unwrap_or(i64::MAX);
        exp.saturating_add(refresh_ttl).saturating_add(leeway)
    }

    async fn decode_with(&self, token: &Token, options: DecodeOptions) -> Result<Payload> {
        let payload = self.codec.verify(token)?;
        let now = self.clock.now();
        let leeway = i64::try_from(self.config.leeway).unwrap_or(i64::MAX);

        if !options.ignore_expired && payload.is_expired(now, leeway) {
            keystone_log::debug!("Rejected expired token {}", Blacklist::identifier(&payload));
            return Err(JwtError::TokenExpired);
        }
        if payload.is_premature(now, leeway) {
            return Err(JwtError::TokenNotYetValid);
        }

        if options.check_blacklist && self.config.blacklist_enabled {
            let blacklisted = if options.allow_grace {
                self.blacklist.blocks_refresh(&payload).await?
            } else {
                self.blacklist.has(&payload).await?
            };
            if blacklisted {
                keystone_log::debug!(
                    "Rejected blacklisted token {}",
                    Blacklist::identifier(&payload)
                );
                return Err(JwtError::TokenBlacklisted);
            }
        }

        Ok(payload)
    }

    fn refresh_claims(&self, old: &Payload, extra: Map<String, Value>) -> Map<String, Value> {
        let mut claims = Map::new();

        if let Some(sub) = old.get(claim::SUBJECT) {
            claims.insert(claim::SUBJECT.to_string(), sub.clone());
        }
        for name in &self.config.persistent_claims {
            if let Some(value) = old.get(name) {
                claims.insert(name.clone(), value.clone());
            }
        }
        for (name, value) in extra {
            claims.insert(name, value);
        }

        // Time and identity claims are always regenerated.
        for name in [claim::ISSUED_AT, claim::EXPIRATION, claim::NOT_BEFORE, claim::JWT_ID] {
            claims.remove(name);
        }
        claims
    }
}

impl std::fmt::Debug for Manager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manager")
            .field("algorithm", &self.codec.algorithm())
            .field("blacklist", &self.blacklist)
            .finish_non_exhaustive()
    }
}

/// Assembles a [`Manager`] with custom collaborators.
pub struct ManagerBuilder {
    config: JwtConfig,
    codec: Option<Arc<dyn TokenCodec>>,
    store: Option<Arc<dyn BlacklistStore>>,
    clock: Option<SharedClock>,
}

impl ManagerBuilder {
    pub fn codec(mut self, codec: Arc<dyn TokenCodec>) -> Self {
        self.codec = Some(codec);
        self
    }

    pub fn store(mut self, store: Arc<dyn BlacklistStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Validate the configuration and build. Key problems surface here.
    pub fn build(self) -> Result<Manager> {
        self.config.validate()?;

        let codec = match self.codec {
            Some(codec) => codec,
            None => Arc::new(JwtCodec::new(&self.config)?),
        };
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()));
        let clock = self.clock.unwrap_or_else(clock::system);

        let blacklist = Blacklist::new(&self.config, store, clock.clone());
        let factory = PayloadFactory::new(&self.config, clock.clone());

        keystone_log::debug!(
            "JWT manager ready (alg={:?}, blacklist={})",
            codec.algorithm(),
            self.config.blacklist_enabled
        );

        Ok(Manager {
            config: Arc::new(self.config),
            codec,
            blacklist,
            factory,
            clock,
        })
    }
}
