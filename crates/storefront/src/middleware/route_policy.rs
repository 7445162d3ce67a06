//! Per-path access and caching rules.
//!
//! Every request is matched against [`ROUTE_POLICIES`] (first match wins).
//! The matched policy decides who may reach the handler and which
//! `Cache-Control` header the response carries. Handlers still extract the
//! user they act for; the table keeps whole areas closed even when a handler
//! forgets to.

use axum::{
    extract::Request,
    http::{HeaderValue, StatusCode, header::CACHE_CONTROL},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use tower_sessions::Session;

use crate::error::AppError;
use crate::models::{CurrentUser, session_keys};

/// Who may reach a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Public,
    Customer,
    Admin,
}

/// How responses for a route may be cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    NoStore,
    Private,
    Public {
        max_age: u32,
        stale_while_revalidate: u32,
    },
    Immutable,
}

impl CachePolicy {
    /// The `Cache-Control` value for this policy.
    #[must_use]
    pub fn header_value(self) -> String {
        match self {
            Self::NoStore => "no-store".to_string(),
            Self::Private => "private, no-cache".to_string(),
            Self::Public {
                max_age,
                stale_while_revalidate,
            } => format!("public, max-age={max_age}, stale-while-revalidate={stale_while_revalidate}"),
            Self::Immutable => "public, max-age=31536000, immutable".to_string(),
        }
    }
}

/// Access and cache rules for a path prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutePolicy {
    pub access: Access,
    pub cache: CachePolicy,
}

const CATALOG_CACHE: CachePolicy = CachePolicy::Public {
    max_age: 60,
    stale_while_revalidate: 300,
};

const fn policy(access: Access, cache: CachePolicy) -> RoutePolicy {
    RoutePolicy { access, cache }
}

/// Path prefixes and their policies, most specific first.
///
/// A prefix ending in `/` matches anything below it; any other prefix matches
/// the path itself and anything below `prefix/`.
pub const ROUTE_POLICIES: &[(&str, RoutePolicy)] = &[
    ("/static/", policy(Access::Public, CachePolicy::Immutable)),
    ("/api/webhooks/", policy(Access::Public, CachePolicy::NoStore)),
    ("/api/admin/", policy(Access::Admin, CachePolicy::NoStore)),
    ("/admin", policy(Access::Admin, CachePolicy::NoStore)),
    ("/api/account/", policy(Access::Customer, CachePolicy::NoStore)),
    ("/api/registries", policy(Access::Customer, CachePolicy::NoStore)),
    ("/account", policy(Access::Customer, CachePolicy::NoStore)),
    ("/api/checkout", policy(Access::Customer, CachePolicy::NoStore)),
    ("/api/cart", policy(Access::Public, CachePolicy::NoStore)),
    ("/cart", policy(Access::Public, CachePolicy::NoStore)),
    ("/api/products", policy(Access::Public, CATALOG_CACHE)),
    ("/api/categories", policy(Access::Public, CATALOG_CACHE)),
    ("/products", policy(Access::Public, CATALOG_CACHE)),
    ("/categories", policy(Access::Public, CATALOG_CACHE)),
    ("/registry/", policy(Access::Public, CATALOG_CACHE)),
    ("/", policy(Access::Public, CachePolicy::Private)),
];

/// Fallback when nothing matches (only paths not starting with `/`).
const DEFAULT_POLICY: RoutePolicy = policy(Access::Public, CachePolicy::Private);

fn prefix_matches(path: &str, prefix: &str) -> bool {
    if prefix.ends_with('/') {
        return path.starts_with(prefix);
    }
    path.strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

/// Look up the policy for a request path.
#[must_use]
pub fn policy_for(path: &str) -> RoutePolicy {
    ROUTE_POLICIES
        .iter()
        .find(|(prefix, _)| prefix_matches(path, prefix))
        .map_or(DEFAULT_POLICY, |(_, policy)| *policy)
}

/// Why a request was turned away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    NotLoggedIn,
    NotAdmin,
}

/// Decide whether `user` may reach a route with `access`.
///
/// # Errors
///
/// Returns the reason the request is denied.
pub fn check_access(access: Access, user: Option<&CurrentUser>) -> Result<(), Denial> {
    match (access, user) {
        (Access::Public, _) => Ok(()),
        (Access::Customer | Access::Admin, None) => Err(Denial::NotLoggedIn),
        (Access::Customer, Some(_)) => Ok(()),
        (Access::Admin, Some(user)) if user.is_admin() => Ok(()),
        (Access::Admin, Some(_)) => Err(Denial::NotAdmin),
    }
}

fn deny(path: &str, denial: Denial) -> Response {
    let is_api = path.starts_with("/api/");
    match denial {
        Denial::NotLoggedIn if !is_api => Redirect::to("/auth/login").into_response(),
        Denial::NotLoggedIn => AppError::Unauthorized("login required".to_string()).into_response(),
        Denial::NotAdmin => AppError::Forbidden("admin access required".to_string()).into_response(),
    }
}

/// Enforce the route table and set `Cache-Control`.
///
/// Public routes never read the session, so anonymous catalog traffic does
/// not touch the session store.
pub async fn route_policy_middleware(request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();
    let policy = policy_for(&path);

    if policy.access != Access::Public {
        let user = match request.extensions().get::<Session>() {
            Some(session) => session
                .get::<CurrentUser>(session_keys::CURRENT_USER)
                .await
                .ok()
                .flatten(),
            None => None,
        };
        if let Err(denial) = check_access(policy.access, user.as_ref()) {
            tracing::debug!(path = %path, ?denial, "Request denied by route policy");
            let mut response = deny(&path, denial);
            set_cache_control(&mut response, CachePolicy::NoStore);
            return response;
        }
    }

    let mut response = next.run(request).await;
    if !response.headers().contains_key(CACHE_CONTROL) {
        let status = response.status();
        set_cache_control(&mut response, cache_for_status(policy.cache, status));
    }
    response
}

/// Only successful responses may be shared; errors are never cached.
#[must_use]
pub fn cache_for_status(cache: CachePolicy, status: StatusCode) -> CachePolicy {
    if status.is_success() || status.is_redirection() {
        cache
    } else {
        CachePolicy::NoStore
    }
}

fn set_cache_control(response: &mut Response, cache: CachePolicy) {
    if let Ok(value) = HeaderValue::from_str(&cache.header_value()) {
        response.headers_mut().insert(CACHE_CONTROL, value);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use nestling_core::{Email, UserId, UserRole};

    use super::*;

    fn user(role: UserRole) -> CurrentUser {
        CurrentUser {
            id: UserId::new(7),
            email: Email::parse("parent@example.com").unwrap(),
            role,
        }
    }

    #[test]
    fn test_static_assets_are_immutable() {
        assert_eq!(policy_for("/static/css/main.css").cache, CachePolicy::Immutable);
    }

    #[test]
    fn test_webhooks_are_public_and_uncached() {
        let policy = policy_for("/api/webhooks/stripe");
        assert_eq!(policy.access, Access::Public);
        assert_eq!(policy.cache, CachePolicy::NoStore);
    }

    #[test]
    fn test_admin_areas() {
        assert_eq!(policy_for("/admin").access, Access::Admin);
        assert_eq!(policy_for("/admin/orders/12").access, Access::Admin);
        assert_eq!(policy_for("/api/admin/dropship").access, Access::Admin);
        assert_eq!(policy_for("/administrators").access, Access::Public);
    }

    #[test]
    fn test_customer_areas() {
        for path in [
            "/api/account/orders",
            "/api/registries",
            "/api/registries/3/items",
            "/account",
            "/api/checkout",
        ] {
            assert_eq!(policy_for(path).access, Access::Customer, "{path}");
        }
    }

    #[test]
    fn test_shared_registry_is_public() {
        assert_eq!(policy_for("/api/registry/share/ABCD2345").access, Access::Public);
        let page = policy_for("/registry/ABCD2345");
        assert_eq!(page.access, Access::Public);
        assert_eq!(page.cache, CATALOG_CACHE);
    }

    #[test]
    fn test_cart_is_public_and_uncached() {
        for path in ["/cart", "/api/cart", "/api/cart/items/4"] {
            let policy = policy_for(path);
            assert_eq!(policy.access, Access::Public, "{path}");
            assert_eq!(policy.cache, CachePolicy::NoStore, "{path}");
        }
    }

    #[test]
    fn test_catalog_is_publicly_cached() {
        assert_eq!(
            policy_for("/api/products").cache.header_value(),
            "public, max-age=60, stale-while-revalidate=300"
        );
        assert_eq!(policy_for("/categories/bedding").cache, CATALOG_CACHE);
    }

    #[test]
    fn test_errors_are_never_shared() {
        assert_eq!(cache_for_status(CATALOG_CACHE, StatusCode::OK), CATALOG_CACHE);
        assert_eq!(
            cache_for_status(CATALOG_CACHE, StatusCode::NOT_FOUND),
            CachePolicy::NoStore
        );
        assert_eq!(
            cache_for_status(CachePolicy::Immutable, StatusCode::INTERNAL_SERVER_ERROR),
            CachePolicy::NoStore
        );
    }

    #[test]
    fn test_everything_else_is_private() {
        assert_eq!(policy_for("/").cache, CachePolicy::Private);
        assert_eq!(policy_for("/checkout/success").cache, CachePolicy::Private);
        assert_eq!(policy_for("/auth/login").access, Access::Public);
    }

    #[test]
    fn test_check_access() {
        let customer = user(UserRole::Customer);
        let admin = user(UserRole::Admin);

        assert_eq!(check_access(Access::Public, None), Ok(()));
        assert_eq!(check_access(Access::Customer, None), Err(Denial::NotLoggedIn));
        assert_eq!(check_access(Access::Customer, Some(&customer)), Ok(()));
        assert_eq!(check_access(Access::Admin, Some(&customer)), Err(Denial::NotAdmin));
        assert_eq!(check_access(Access::Admin, Some(&admin)), Ok(()));
    }
}
