// Subject-bound JWT authentication for Keystone

pub mod blacklist;
pub mod clock;
pub mod codec;
pub mod config;
pub mod error;
pub mod factory;
pub mod jwt;
pub mod manager;
pub mod payload;
pub mod request;
pub mod store;
pub mod subject;
pub mod token;

pub use blacklist::{Blacklist, BlacklistEntry};
pub use clock::{Clock, MockClock, SharedClock, SystemClock};
pub use codec::{JwtCodec, TokenCodec};
pub use config::JwtConfig;
pub use error::{JwtError, Result};
pub use factory::PayloadFactory;
pub use jwt::Jwt;
pub use manager::{Manager, ManagerBuilder};
pub use payload::{Payload, claim};
pub use request::{
    AuthHeaders, Cookies, HttpRequest, QueryString, RequestParser, RequestView, RouteParams,
    TokenParser,
};
#[cfg(feature = "redis")]
pub use store::RedisStore;
pub use store::{BlacklistStore, MemoryStore, StoreError};
pub use subject::{JwtSubject, hash_subject_type};
pub use token::{Token, TokenResponse};

// Re-export jsonwebtoken types
pub use jsonwebtoken::Algorithm;

/// Build a request-scoped [`Jwt`] with the default parser chain.
pub fn for_request<R: RequestView>(manager: std::sync::Arc<Manager>, request: R) -> Jwt<R> {
    Jwt::new(manager, std::sync::Arc::new(RequestParser::default()), request)
}
