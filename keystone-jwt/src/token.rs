// Token types and utilities

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// An encoded JWT. Opaque outside the codec; never mutated, only replaced.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Token(String);

impl Token {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The encoded string.
    pub fn get(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Token {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s.trim()))
    }
}

impl From<String> for Token {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Token {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl AsRef<str> for Token {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Body handed back to a client after login or refresh.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenResponse {
    /// The encoded token
    pub access_token: String,

    /// Token type (always "bearer")
    pub token_type: String,

    /// Seconds until the token expires
    pub expires_in: i64,
}

impl TokenResponse {
    pub fn new(token: &Token, expires_in: i64) -> Self {
        Self {
            access_token: token.get().to_string(),
            token_type: "bearer".to_string(),
            expires_in,
        }
    }
}
