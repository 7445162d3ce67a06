//! Shared registry page.
//!
//! Reached through the share code; gift buttons post to `/cart/add` with the
//! registry item so the purchase counts toward the registry.

use askama::Template;
use askama_web::WebTemplate;
use axum::extract::{Path, State};

use nestling_core::CurrencyCode;

use crate::filters;
use crate::models::{CurrentUser, RegistryDetail};
use crate::routes::PageResult;
use crate::state::AppState;

/// Public registry template.
#[derive(Template, WebTemplate)]
#[template(path = "registry/show.html")]
pub struct RegistryTemplate {
    pub user: Option<CurrentUser>,
    pub currency: CurrencyCode,
    pub detail: RegistryDetail,
}

impl RegistryTemplate {
    /// Whether anything is left to buy.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.detail.items.iter().all(|item| item.remaining() == 0)
    }
}

/// `GET /registry/{code}`
pub async fn show(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> PageResult<RegistryTemplate> {
    let detail = state.registries().public_view(&code).await?;
    Ok(RegistryTemplate {
        user: None,
        currency: state.config().shop.pricing.currency,
        detail,
    })
}
