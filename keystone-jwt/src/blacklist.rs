// Token blacklist

use crate::clock::SharedClock;
use crate::store::{BlacklistStore, StoreResult};
use crate::{JwtConfig, JwtError, Payload, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Minimum lifetime given to a grace entry in the store.
const MIN_ENTRY_TTL: i64 = 60;

/// What the blacklist remembers about one token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlacklistEntry {
    /// When the token was invalidated
    pub invalidated_at: i64,

    /// Refresh is still accepted while `now < valid_until`.
    /// `None` marks a permanent entry.
    pub valid_until: Option<i64>,
}

impl BlacklistEntry {
    pub fn forever(now: i64) -> Self {
        Self {
            invalidated_at: now,
            valid_until: None,
        }
    }

    pub fn with_grace(now: i64, grace: i64) -> Self {
        Self {
            invalidated_at: now,
            valid_until: Some(now.saturating_add(grace)),
        }
    }

    pub fn is_forever(&self) -> bool {
        self.valid_until.is_none()
    }

    /// Whether the token may still be used to refresh at `now`.
    pub fn in_grace(&self, now: i64) -> bool {
        self.valid_until.is_some_and(|until| now < until)
    }

    /// Combine with an existing entry for the same token. A permanent entry
    /// always wins; otherwise the earlier `valid_until` is kept.
    pub fn merge(self, existing: Option<BlacklistEntry>) -> Self {
        let Some(existing) = existing else {
            return self;
        };
        match (existing.valid_until, self.valid_until) {
            (None, _) => existing,
            (_, None) => self,
            (Some(old), Some(new)) if old <= new => existing,
            _ => self,
        }
    }
}

/// Invalidated tokens, keyed by `jti` (or a hash of the payload when a
/// token carries no `jti`).
///
/// Every store call is bounded by the configured timeout. A store that
/// fails or times out yields `StoreUnavailable`; it is never read as
/// "not blacklisted".
#[derive(Clone)]
pub struct Blacklist {
    store: Arc<dyn BlacklistStore>,
    clock: SharedClock,
    prefix: String,
    grace_period: i64,
    refresh_ttl: i64,
    timeout: Duration,
    write_lock: Arc<Mutex<()>>,
}

impl Blacklist {
    pub fn new(config: &JwtConfig, store: Arc<dyn BlacklistStore>, clock: SharedClock) -> Self {
        Self {
            store,
            clock,
            prefix: config.blacklist_prefix.clone(),
            grace_period: i64::try_from(config.blacklist_grace_period).unwrap_or(i64::MAX),
            refresh_ttl: i64::try_from(config.refresh_ttl).unwrap_or(i64::MAX),
            timeout: config.store_timeout(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Key used for a payload: its `jti`, or a SHA-256 of the claims.
    pub fn identifier(payload: &Payload) -> String {
        match payload.jti() {
            Some(jti) => jti.to_string(),
            None => {
                let json = serde_json::to_vec(payload.claims()).unwrap_or_default();
                hex::encode(Sha256::digest(&json))
            }
        }
    }

    /// Invalidate with the configured grace period.
    pub async fn add(&self, payload: &Payload) -> Result<()> {
        self.add_with_grace(payload, self.grace_period).await
    }

    /// Invalidate with an explicit grace period. `0` is permanent, as is any
    /// token without an `exp`.
    pub async fn add_with_grace(&self, payload: &Payload, grace: i64) -> Result<()> {
        let now = self.clock.now();
        let Some(exp) = payload.expires_at().filter(|_| grace > 0) else {
            return self
                .put(&Self::identifier(payload), BlacklistEntry::forever(now), None)
                .await;
        };

        // Keep the entry as long as the token could still be refreshed.
        let ttl = exp
            .saturating_add(self.refresh_ttl)
            .saturating_sub(now)
            .saturating_add(grace)
            .max(MIN_ENTRY_TTL);
        self.put(
            &Self::identifier(payload),
            BlacklistEntry::with_grace(now, grace),
            Some(Duration::from_secs(ttl as u64)),
        )
        .await
    }

    /// Invalidate permanently.
    pub async fn add_forever(&self, payload: &Payload) -> Result<()> {
        let now = self.clock.now();
        self.put(&Self::identifier(payload), BlacklistEntry::forever(now), None)
            .await
    }

    /// Whether the token is blacklisted for standard validation. Any entry
    /// counts, including one still inside its grace window.
    pub async fn has(&self, payload: &Payload) -> Result<bool> {
        Ok(self.entry(payload).await?.is_some())
    }

    /// Whether the token is blacklisted for a refresh attempt: only entries
    /// past their grace window (or permanent ones) count.
    pub async fn blocks_refresh(&self, payload: &Payload) -> Result<bool> {
        let now = self.clock.now();
        Ok(self
            .entry(payload)
            .await?
            .is_some_and(|entry| !entry.in_grace(now)))
    }

    /// Stored entry for a payload, if any.
    pub async fn entry(&self, payload: &Payload) -> Result<Option<BlacklistEntry>> {
        self.lookup(&Self::identifier(payload)).await
    }

    /// Remove a token from the blacklist.
    pub async fn remove(&self, payload: &Payload) -> Result<()> {
        let key = self.key(&Self::identifier(payload));
        let _guard = self.write_lock.lock().await;
        self.bounded(self.store.delete(&key)).await
    }

    /// Remove every entry under this blacklist's prefix.
    pub async fn clear(&self) -> Result<()> {
        let prefix = format!("{}:", self.prefix);
        let _guard = self.write_lock.lock().await;
        self.bounded(self.store.clear(&prefix)).await
    }

    pub fn grace_period(&self) -> i64 {
        self.grace_period
    }

    async fn lookup(&self, id: &str) -> Result<Option<BlacklistEntry>> {
        let raw = self.bounded(self.store.get(&self.key(id))).await?;
        raw.map(|raw| {
            serde_json::from_str(&raw).map_err(|e| {
                keystone_log::warn!("Unreadable blacklist entry for {}: {}", id, e);
                JwtError::StoreUnavailable(format!("corrupt entry: {}", e))
            })
        })
        .transpose()
    }

    async fn put(&self, id: &str, entry: BlacklistEntry, ttl: Option<Duration>) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let existing = self.lookup(id).await?;
        let merged = entry.merge(existing);
        if Some(merged) == existing {
            return Ok(());
        }

        let ttl = if merged.is_forever() { None } else { ttl };
        let value = serde_json::to_string(&merged)?;
        self.bounded(self.store.set(&self.key(id), value, ttl))
            .await?;

        keystone_log::info!(
            "Blacklisted token {} ({})",
            id,
            match merged.valid_until {
                None => "forever".to_string(),
                Some(until) => format!("grace until {}", until),
            }
        );
        Ok(())
    }

    fn key(&self, id: &str) -> String {
        format!("{}:{}", self.prefix, id)
    }

    async fn bounded<T>(&self, op: impl Future<Output = StoreResult<T>>) -> Result<T> {
        match tokio::time::timeout(self.timeout, op).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                keystone_log::warn!("Blacklist store error: {}", e);
                Err(JwtError::StoreUnavailable(e.to_string()))
            }
            Err(_) => {
                keystone_log::warn!("Blacklist store timed out after {:?}", self.timeout);
                Err(JwtError::StoreUnavailable("timed out".to_string()))
            }
        }
    }
}

impl std::fmt::Debug for Blacklist {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Blacklist")
            .field("prefix", &self.prefix)
            .field("grace_period", &self.grace_period)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
