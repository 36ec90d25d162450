// Keystone - JWT authentication for Rust web services
//
// Subject-bound tokens, refresh with grace periods, blacklisting and
// token extraction from inbound requests.

// Re-export logging
pub use keystone_log as log;

// Re-export optional crates
#[cfg(feature = "jwt")]
pub use keystone_jwt as jwt;

#[cfg(feature = "auth")]
pub use keystone_auth as auth;

// Prelude for common imports
pub mod prelude {
    #[cfg(feature = "jwt")]
    pub use keystone_jwt::{
        Algorithm, BlacklistStore, HttpRequest, Jwt, JwtConfig, JwtError, JwtSubject, Manager,
        MemoryStore, Payload, RequestParser, RequestView, Token, TokenResponse, for_request,
    };

    #[cfg(feature = "auth")]
    pub use keystone_auth::{
        AuthError, AuthRequirement, Authenticated, Guard, GuardRegistry, JwtGuard,
        PolicyRequirement, authorize,
    };
}
