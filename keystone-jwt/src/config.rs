// JWT configuration

use crate::{JwtError, Result};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey};
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Process-wide JWT settings, fixed at startup.
///
/// All durations are whole seconds so the struct reads naturally from TOML
/// or environment variables.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct JwtConfig {
    /// Secret key for HS256/HS384/HS512 algorithms
    pub secret: Option<String>,

    /// Public key for asymmetric algorithms (PEM format)
    pub public_key: Option<String>,

    /// Private key for asymmetric algorithms (PEM format)
    pub private_key: Option<String>,

    /// Signing algorithm (default: HS256)
    pub algorithm: Algorithm,

    /// Token lifetime in seconds (default: 1 hour)
    pub ttl: u64,

    /// How long after `exp` a token may still be refreshed (default: 2 weeks)
    pub refresh_ttl: u64,

    /// Clock skew tolerance for `exp` and `nbf` checks
    pub leeway: u64,

    /// Seconds added to `iat` to compute `nbf`
    pub nbf_offset: u64,

    /// Whether invalidated tokens are tracked at all
    pub blacklist_enabled: bool,

    /// Window after a refresh during which the old token may refresh again
    pub blacklist_grace_period: u64,

    /// Key prefix used in the blacklist store
    pub blacklist_prefix: String,

    /// Upper bound on a single blacklist store call, in milliseconds
    pub store_timeout_ms: u64,

    /// Bind tokens to the subject's concrete type via the `prv` claim
    pub lock_subject: bool,

    /// Issuer (iss claim); verified on decode when set
    pub issuer: Option<String>,

    /// Audience (aud claim); verified on decode when set
    pub audience: Option<Vec<String>>,

    /// Claims copied from the old token into the refreshed one
    pub persistent_claims: Vec<String>,
}

impl JwtConfig {
    /// Create a new HMAC configuration with a secret
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: Some(secret.into()),
            public_key: None,
            private_key: None,
            algorithm: Algorithm::HS256,
            ttl: 3600,
            refresh_ttl: 20160 * 60,
            leeway: 0,
            nbf_offset: 0,
            blacklist_enabled: true,
            blacklist_grace_period: 0,
            blacklist_prefix: "jwt_blacklist".to_string(),
            store_timeout_ms: 500,
            lock_subject: true,
            issuer: None,
            audience: None,
            persistent_claims: Vec::new(),
        }
    }

    /// Create configuration with an RSA key pair
    pub fn with_rsa(private_key: impl Into<String>, public_key: impl Into<String>) -> Self {
        Self {
            secret: None,
            public_key: Some(public_key.into()),
            private_key: Some(private_key.into()),
            algorithm: Algorithm::RS256,
            ..Self::new(String::new())
        }
    }

    /// Parse a TOML document, e.g. the `[jwt]` table of an application config.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(source).map_err(|e| JwtError::ConfigError(e.to_string()))?;
        config.validate()?;
        keystone_log::info!(
            "Loaded JWT config (alg={:?}, ttl={}s, refresh_ttl={}s)",
            config.algorithm,
            config.ttl,
            config.refresh_ttl
        );
        Ok(config)
    }

    /// Overlay `<PREFIX>_*` environment variables on the defaults.
    ///
    /// Recognized keys: `SECRET`, `PUBLIC_KEY`, `PRIVATE_KEY`, `ALGORITHM`,
    /// `TTL`, `REFRESH_TTL`, `LEEWAY`, `BLACKLIST_ENABLED`,
    /// `BLACKLIST_GRACE_PERIOD`, `LOCK_SUBJECT`, `ISSUER`, `AUDIENCE`
    /// (comma separated).
    pub fn from_env(prefix: &str) -> Result<Self> {
        let var = |key: &str| env::var(format!("{}_{}", prefix, key)).ok();
        let mut config = Self::new(var("SECRET").unwrap_or_default());

        if config.secret.as_deref() == Some("") {
            config.secret = None;
        }
        config.public_key = var("PUBLIC_KEY");
        config.private_key = var("PRIVATE_KEY");

        if let Some(alg) = var("ALGORITHM") {
            config.algorithm = Algorithm::from_str(&alg)
                .map_err(|_| JwtError::ConfigError(format!("Unknown algorithm: {}", alg)))?;
        }
        if let Some(v) = var("TTL") {
            config.ttl = parse_secs("TTL", &v)?;
        }
        if let Some(v) = var("REFRESH_TTL") {
            config.refresh_ttl = parse_secs("REFRESH_TTL", &v)?;
        }
        if let Some(v) = var("LEEWAY") {
            config.leeway = parse_secs("LEEWAY", &v)?;
        }
        if let Some(v) = var("BLACKLIST_GRACE_PERIOD") {
            config.blacklist_grace_period = parse_secs("BLACKLIST_GRACE_PERIOD", &v)?;
        }
        if let Some(v) = var("BLACKLIST_ENABLED") {
            config.blacklist_enabled = parse_bool(&v);
        }
        if let Some(v) = var("LOCK_SUBJECT") {
            config.lock_subject = parse_bool(&v);
        }
        config.issuer = var("ISSUER");
        config.audience = var("AUDIENCE").map(|v| {
            v.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        });

        config.validate()?;
        Ok(config)
    }

    /// Set the algorithm
    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Set token lifetime
    pub fn with_ttl(mut self, duration: Duration) -> Self {
        self.ttl = duration.as_secs();
        self
    }

    /// Set refresh window
    pub fn with_refresh_ttl(mut self, duration: Duration) -> Self {
        self.refresh_ttl = duration.as_secs();
        self
    }

    /// Set leeway
    pub fn with_leeway(mut self, leeway: u64) -> Self {
        self.leeway = leeway;
        self
    }

    pub fn with_nbf_offset(mut self, seconds: u64) -> Self {
        self.nbf_offset = seconds;
        self
    }

    pub fn with_blacklist(mut self, enabled: bool) -> Self {
        self.blacklist_enabled = enabled;
        self
    }

    /// Set the grace period granted to refreshed tokens
    pub fn with_grace_period(mut self, duration: Duration) -> Self {
        self.blacklist_grace_period = duration.as_secs();
        self
    }

    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_lock_subject(mut self, lock: bool) -> Self {
        self.lock_subject = lock;
        self
    }

    /// Set issuer
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    /// Set audience
    pub fn with_audience(mut self, audience: Vec<String>) -> Self {
        self.audience = Some(audience);
        self
    }

    pub fn with_persistent_claims(mut self, claims: Vec<String>) -> Self {
        self.persistent_claims = claims;
        self
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    /// Check that the configured key material fits the algorithm.
    pub fn validate(&self) -> Result<()> {
        self.encoding_key()?;
        self.decoding_key()?;
        if self.ttl == 0 {
            return Err(JwtError::ConfigError("ttl must be positive".to_string()));
        }
        if self.store_timeout_ms == 0 {
            return Err(JwtError::ConfigError(
                "store_timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Get encoding key
    pub fn encoding_key(&self) -> Result<EncodingKey> {
        match self.algorithm {
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => {
                Ok(EncodingKey::from_secret(self.hmac_secret()?))
            }
            Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512 => EncodingKey::from_rsa_pem(self.pem(&self.private_key, "Private")?)
                .map_err(|e| JwtError::ConfigError(e.to_string())),
            Algorithm::ES256 | Algorithm::ES384 => {
                EncodingKey::from_ec_pem(self.pem(&self.private_key, "Private")?)
                    .map_err(|e| JwtError::ConfigError(e.to_string()))
            }
            Algorithm::EdDSA => EncodingKey::from_ed_pem(self.pem(&self.private_key, "Private")?)
                .map_err(|e| JwtError::ConfigError(e.to_string())),
            #[allow(unreachable_patterns)]
            _ => Err(JwtError::ConfigError("Unsupported algorithm".to_string())),
        }
    }

    /// Get decoding key
    pub fn decoding_key(&self) -> Result<DecodingKey> {
        match self.algorithm {
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => {
                Ok(DecodingKey::from_secret(self.hmac_secret()?))
            }
            Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512 => DecodingKey::from_rsa_pem(self.pem(&self.public_key, "Public")?)
                .map_err(|e| JwtError::ConfigError(e.to_string())),
            Algorithm::ES256 | Algorithm::ES384 => {
                DecodingKey::from_ec_pem(self.pem(&self.public_key, "Public")?)
                    .map_err(|e| JwtError::ConfigError(e.to_string()))
            }
            Algorithm::EdDSA => DecodingKey::from_ed_pem(self.pem(&self.public_key, "Public")?)
                .map_err(|e| JwtError::ConfigError(e.to_string())),
            #[allow(unreachable_patterns)]
            _ => Err(JwtError::ConfigError("Unsupported algorithm".to_string())),
        }
    }

    fn hmac_secret(&self) -> Result<&[u8]> {
        match self.secret.as_deref() {
            Some(secret) if !secret.is_empty() => Ok(secret.as_bytes()),
            _ => Err(JwtError::ConfigError(
                "Secret required for HMAC algorithms".to_string(),
            )),
        }
    }

    fn pem<'a>(&self, key: &'a Option<String>, kind: &str) -> Result<&'a [u8]> {
        key.as_deref().map(str::as_bytes).ok_or_else(|| {
            JwtError::ConfigError(format!(
                "{} key required for {:?}",
                kind, self.algorithm
            ))
        })
    }
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self::new("change-me-in-production")
    }
}

fn parse_secs(key: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse()
        .map_err(|_| JwtError::ConfigError(format!("{} must be a number of seconds", key)))
}

fn parse_bool(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = JwtConfig::default();
        assert!(config.secret.is_some());
        assert_eq!(config.algorithm, Algorithm::HS256);
        assert_eq!(config.ttl, 3600);
        assert_eq!(config.refresh_ttl, 1_209_600);
        assert!(config.blacklist_enabled);
        assert!(config.lock_subject);
    }

    #[test]
    fn test_config_builder() {
        let config = JwtConfig::new("secret")
            .with_algorithm(Algorithm::HS512)
            .with_ttl(Duration::from_secs(7200))
            .with_grace_period(Duration::from_secs(30))
            .with_issuer("my-app")
            .with_leeway(60);

        assert_eq!(config.algorithm, Algorithm::HS512);
        assert_eq!(config.ttl, 7200);
        assert_eq!(config.blacklist_grace_period, 30);
        assert_eq!(config.issuer.as_deref(), Some("my-app"));
        assert_eq!(config.leeway, 60);
    }

    #[test]
    fn test_missing_secret_is_config_error() {
        let mut config = JwtConfig::new("x");
        config.secret = None;
        assert!(matches!(config.validate(), Err(JwtError::ConfigError(_))));
    }

    #[test]
    fn test_rsa_without_keys_fails() {
        let config = JwtConfig::new("x").with_algorithm(Algorithm::RS256);
        assert!(matches!(config.encoding_key(), Err(JwtError::ConfigError(_))));
    }

    #[test]
    fn test_from_toml() {
        let config = JwtConfig::from_toml_str(
            r#"
            secret = "toml-secret"
            algorithm = "HS384"
            ttl = 600
            blacklist_grace_period = 15
            lock_subject = false
            persistent_claims = ["tenant"]
            "#,
        )
        .unwrap();

        assert_eq!(config.secret.as_deref(), Some("toml-secret"));
        assert_eq!(config.algorithm, Algorithm::HS384);
        assert_eq!(config.ttl, 600);
        assert_eq!(config.blacklist_grace_period, 15);
        assert!(!config.lock_subject);
        assert_eq!(config.persistent_claims, vec!["tenant".to_string()]);
        // untouched fields keep their defaults
        assert_eq!(config.blacklist_prefix, "jwt_blacklist");
    }

    #[test]
    fn test_from_toml_rejects_zero_ttl() {
        let result = JwtConfig::from_toml_str("secret = \"s\"\nttl = 0\n");
        assert!(matches!(result, Err(JwtError::ConfigError(_))));
    }

    #[test]
    fn test_from_env_without_secret_fails() {
        // No variables with this prefix exist, so the HMAC secret is missing.
        let result = JwtConfig::from_env("KEYSTONE_TEST_UNSET_PREFIX_4821");
        assert!(matches!(result, Err(JwtError::ConfigError(_))));
    }
}
