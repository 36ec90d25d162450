// Error types for JWT operations

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtError {
    #[error("Malformed token: {0}")]
    Malformed(String),

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Token expired")]
    TokenExpired,

    #[error("Token not yet valid")]
    TokenNotYetValid,

    #[error("Token has been blacklisted")]
    TokenBlacklisted,

    #[error("The token could not be parsed from the request")]
    TokenNotFound,

    #[error("A token is required")]
    TokenRequired,

    #[error("Invalid claim: {0}")]
    InvalidClaim(String),

    #[error("Blacklist store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("You must have the blacklist enabled to invalidate a token")]
    BlacklistDisabled,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl JwtError {
    /// Whether retrying the same call may succeed. Only store outages qualify;
    /// every other failure is a property of the token or the configuration.
    pub fn is_retryable(&self) -> bool {
        matches!(self, JwtError::StoreUnavailable(_))
    }

    /// Short machine-readable name, used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            JwtError::Malformed(_) => "malformed",
            JwtError::InvalidSignature => "invalid_signature",
            JwtError::TokenExpired => "token_expired",
            JwtError::TokenNotYetValid => "token_not_yet_valid",
            JwtError::TokenBlacklisted => "token_blacklisted",
            JwtError::TokenNotFound => "token_not_found",
            JwtError::TokenRequired => "token_required",
            JwtError::InvalidClaim(_) => "invalid_claim",
            JwtError::StoreUnavailable(_) => "store_unavailable",
            JwtError::BlacklistDisabled => "blacklist_disabled",
            JwtError::ConfigError(_) => "config_error",
            JwtError::SerializationError(_) => "serialization_error",
        }
    }
}

impl From<serde_json::Error> for JwtError {
    fn from(e: serde_json::Error) -> Self {
        JwtError::SerializationError(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, JwtError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_store_errors_are_retryable() {
        assert!(JwtError::StoreUnavailable("timeout".into()).is_retryable());
        assert!(!JwtError::TokenExpired.is_retryable());
        assert!(!JwtError::Malformed("x".into()).is_retryable());
    }

    #[test]
    fn test_messages() {
        assert_eq!(JwtError::TokenRequired.to_string(), "A token is required");
        assert_eq!(
            JwtError::InvalidClaim("exp".into()).to_string(),
            "Invalid claim: exp"
        );
        assert_eq!(JwtError::TokenBlacklisted.kind(), "token_blacklisted");
    }
}
