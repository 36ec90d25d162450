// Error types for authentication

use keystone_jwt::JwtError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AuthError {
    /// No guard could authenticate the request.
    #[error("Unauthenticated.")]
    Unauthenticated {
        guards: Vec<String>,
        redirect_to: Option<String>,
    },

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Auth guard [{0}] is not defined")]
    GuardNotFound(String),

    #[error("Invalid requirement: {0}")]
    InvalidRequirement(String),

    #[error("JWT error: {0}")]
    JwtError(#[from] JwtError),
}

impl AuthError {
    pub fn unauthenticated(guards: Vec<String>) -> Self {
        Self::Unauthenticated {
            guards,
            redirect_to: None,
        }
    }

    /// Guards that were tried, for `Unauthenticated`.
    pub fn guards(&self) -> &[String] {
        match self {
            Self::Unauthenticated { guards, .. } => guards,
            _ => &[],
        }
    }

    pub fn redirect_to(&self) -> Option<&str> {
        match self {
            Self::Unauthenticated { redirect_to, .. } => redirect_to.as_deref(),
            _ => None,
        }
    }

    /// HTTP status a handler should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Unauthenticated { .. } => 401,
            Self::Forbidden(_) => 403,
            Self::JwtError(e) if e.is_retryable() => 503,
            Self::JwtError(_) => 401,
            Self::GuardNotFound(_) | Self::InvalidRequirement(_) => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;
