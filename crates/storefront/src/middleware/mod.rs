//! HTTP middleware stack for the storefront.
//!
//! # Middleware Order (outermost first)
//!
//! 1. Sentry layers (hub per request, transactions)
//! 2. `TraceLayer` (request span)
//! 3. Request ID
//! 4. Security headers
//! 5. Session layer (tower-sessions with `PostgreSQL` store)
//! 6. Route policy (access rules and `Cache-Control`)
//! 7. Rate limiting on auth, webhook and API routers (governor)

pub mod auth;
pub mod rate_limit;
pub mod request_id;
pub mod route_policy;
pub mod security_headers;
pub mod session;

pub use auth::{OptionalAuth, RequireAdmin, RequireAuth, clear_current_user, set_current_user};
pub use rate_limit::{api_rate_limiter, auth_rate_limiter, webhook_rate_limiter};
pub use request_id::request_id_middleware;
pub use route_policy::route_policy_middleware;
pub use security_headers::security_headers_middleware;
pub use session::create_session_layer;
