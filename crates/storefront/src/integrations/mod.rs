//! Clients for the hosted services the storefront delegates to.
//!
//! - [`stripe`] - hosted checkout and payment webhooks
//! - [`cms`] - catalog content (used by the CLI sync)
//! - [`search`] - product search index uploads
//! - [`email`] - transactional email over SMTP
//! - [`analytics`] - server-side event collection

pub mod analytics;
pub mod cms;
pub mod email;
pub mod search;
pub mod stripe;

pub use analytics::{AnalyticsClient, AnalyticsError, AnalyticsEvent};
pub use cms::{CmsClient, CmsError};
pub use email::{EmailError, EmailService};
pub use search::{SearchClient, SearchError};
pub use stripe::{StripeClient, StripeError};
