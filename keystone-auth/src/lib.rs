// Route authentication for Keystone

pub mod error;
pub mod guard;
pub mod registry;
pub mod requirement;

pub use error::{AuthError, Result};
pub use guard::{Guard, JwtGuard};
pub use registry::{Authenticated, GuardRegistry};
pub use requirement::{AuthRequirement, PolicyRequirement};

use keystone_jwt::RequestView;

/// Authenticate a request for a route, then apply its policy if it has one.
///
/// Returns `Ok(None)` only for passable routes without credentials.
pub async fn authorize(
    registry: &GuardRegistry,
    requirement: &AuthRequirement,
    policy: Option<&PolicyRequirement>,
    request: &dyn RequestView,
) -> Result<Option<Authenticated>> {
    let authenticated = registry.authenticate(requirement, request).await?;
    if let (Some(auth), Some(policy)) = (&authenticated, policy) {
        policy.authorize(&auth.payload)?;
    }
    Ok(authenticated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use keystone_jwt::{HttpRequest, JwtConfig, JwtSubject, Manager};
    use serde_json::{Value, json};
    use std::sync::Arc;

    struct Customer;

    impl JwtSubject for Customer {
        fn jwt_identifier(&self) -> Value {
            json!(7)
        }

        fn subject_type(&self) -> &'static str {
            "shop::Customer"
        }
    }

    #[tokio::test]
    async fn test_authorize_with_policy() {
        let manager = Arc::new(Manager::new(JwtConfig::new("secret")).unwrap());
        let registry = GuardRegistry::new("jwt").with_guard("jwt", JwtGuard::new(manager.clone()));

        let token = keystone_jwt::for_request(manager, HttpRequest::default())
            .from_subject(&Customer)
            .unwrap();
        let request =
            HttpRequest::new("GET", "/orders").with_header("Authorization", format!("Bearer {}", token));

        let allowed = PolicyRequirement::new(["shop::Customer"]).unwrap();
        let auth = authorize(&registry, &AuthRequirement::default_guard(), Some(&allowed), &request)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(auth.payload.get("sub"), Some(&json!(7)));

        let staff_only = PolicyRequirement::new(["shop::Staff"]).unwrap();
        let err = authorize(&registry, &AuthRequirement::default_guard(), Some(&staff_only), &request)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 403);
    }
}
