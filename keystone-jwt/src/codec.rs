// Signing and verification of tokens

use crate::{JwtConfig, JwtError, Payload, Result, Token};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde_json::{Map, Value};

/// Turns payloads into tokens and back.
///
/// Implementations check integrity only. Expiry and blacklist checks belong
/// to the [`Manager`](crate::Manager).
pub trait TokenCodec: Send + Sync {
    /// Sign a payload.
    fn sign(&self, payload: &Payload) -> Result<Token>;

    /// Verify a token's signature and return its claims.
    ///
    /// Fails with `Malformed` when the token is not three base64url
    /// segments with a JSON header and payload, and with `InvalidSignature`
    /// when the MAC/signature does not match or the header names a different
    /// algorithm than the configured one.
    fn verify(&self, token: &Token) -> Result<Payload>;

    /// The algorithm written to and required in the header.
    fn algorithm(&self) -> Algorithm;
}

/// [`TokenCodec`] backed by `jsonwebtoken`.
#[derive(Clone)]
pub struct JwtCodec {
    algorithm: Algorithm,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtCodec {
    /// Build the codec. Bad key material is reported here, once, at startup.
    pub fn new(config: &JwtConfig) -> Result<Self> {
        let encoding_key = config.encoding_key()?;
        let decoding_key = config.decoding_key()?;

        let mut validation = Validation::new(config.algorithm);
        // Time-based claims are checked by the manager against its own clock.
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.required_spec_claims.clear();
        validation.leeway = config.leeway;

        if let Some(ref iss) = config.issuer {
            validation.set_issuer(&[iss]);
        }
        match config.audience {
            Some(ref aud) => validation.set_audience(aud),
            None => validation.validate_aud = false,
        }

        Ok(Self {
            algorithm: config.algorithm,
            encoding_key,
            decoding_key,
            validation,
        })
    }
}

impl std::fmt::Debug for JwtCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtCodec")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

impl TokenCodec for JwtCodec {
    fn sign(&self, payload: &Payload) -> Result<Token> {
        let header = Header::new(self.algorithm);
        encode(&header, payload.claims(), &self.encoding_key)
            .map(Token::new)
            .map_err(|e| JwtError::ConfigError(e.to_string()))
    }

    fn verify(&self, token: &Token) -> Result<Payload> {
        check_structure(token.get())?;

        let data = decode::<Map<String, Value>>(token.get(), &self.decoding_key, &self.validation)
            .map_err(|e| {
                let err = map_error(e.kind());
                keystone_log::debug!("Token verification failed: {}", err.kind());
                err
            })?;

        Payload::new(data.claims)
    }

    fn algorithm(&self) -> Algorithm {
        self.algorithm
    }
}

/// Reject anything that is not `header.payload.signature` in base64url with
/// a JSON object header, before any key is touched.
fn check_structure(token: &str) -> Result<()> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 {
        return Err(JwtError::Malformed(format!(
            "expected 3 segments, found {}",
            segments.len()
        )));
    }
    if segments.iter().any(|s| s.is_empty()) {
        return Err(JwtError::Malformed("empty segment".to_string()));
    }

    let header = URL_SAFE_NO_PAD
        .decode(segments[0])
        .map_err(|e| JwtError::Malformed(format!("header: {}", e)))?;
    let header: Value = serde_json::from_slice(&header)
        .map_err(|e| JwtError::Malformed(format!("header: {}", e)))?;
    if !header.is_object() {
        return Err(JwtError::Malformed("header is not an object".to_string()));
    }

    for (name, segment) in [("payload", segments[1]), ("signature", segments[2])] {
        URL_SAFE_NO_PAD
            .decode(segment)
            .map_err(|e| JwtError::Malformed(format!("{}: {}", name, e)))?;
    }
    Ok(())
}

fn map_error(kind: &ErrorKind) -> JwtError {
    match kind {
        ErrorKind::InvalidSignature => JwtError::InvalidSignature,
        // A header naming another algorithm is never trusted.
        ErrorKind::InvalidAlgorithm => JwtError::InvalidSignature,
        ErrorKind::InvalidIssuer => JwtError::InvalidClaim("iss".to_string()),
        ErrorKind::InvalidAudience => JwtError::InvalidClaim("aud".to_string()),
        ErrorKind::InvalidSubject => JwtError::InvalidClaim("sub".to_string()),
        ErrorKind::ExpiredSignature => JwtError::TokenExpired,
        ErrorKind::ImmatureSignature => JwtError::TokenNotYetValid,
        other => JwtError::Malformed(format!("{:?}", other)),
    }
}
