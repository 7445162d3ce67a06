//! Cart page and its form actions.
//!
//! Every action redirects back to the cart page; failures come back as an
//! `?error=` message rather than an error page.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use nestling_core::{AddressId, CartItemId, CurrencyCode, RegistryItemId, VariantId};

use crate::db::AddressRepository;
use crate::error::AppError;
use crate::filters;
use crate::middleware::{OptionalAuth, RequireAuth};
use crate::models::{Address, AddressInput, CartView, CurrentUser};
use crate::routes::api::checkout::{self as checkout_api, CheckoutBody};
use crate::routes::{PageResult, redirect_with, visitor};
use crate::services::cart::{AddToCart, unavailable_lines};
use crate::state::AppState;

// =============================================================================
// Form Types
// =============================================================================

/// Add-to-cart form from product and registry pages.
#[derive(Debug, Deserialize)]
pub struct AddForm {
    pub variant_id: VariantId,
    #[serde(default = "one")]
    pub quantity: i32,
    #[serde(default)]
    pub registry_item_id: Option<RegistryItemId>,
}

const fn one() -> i32 {
    1
}

/// Quantity change form.
#[derive(Debug, Deserialize)]
pub struct UpdateForm {
    pub item_id: CartItemId,
    pub quantity: i32,
}

/// Remove-line form.
#[derive(Debug, Deserialize)]
pub struct RemoveForm {
    pub item_id: CartItemId,
}

/// Checkout form: a saved address (radio) or the new-address fields.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CheckoutForm {
    pub address_id: String,
    pub full_name: String,
    pub line1: String,
    pub line2: String,
    pub city: String,
    pub region: String,
    pub postal_code: String,
    pub country: String,
    pub phone: String,
}

impl CheckoutForm {
    /// Turn the form into the checkout API body.
    ///
    /// # Errors
    ///
    /// Returns `AppError::BadRequest` for a malformed address ID.
    pub fn into_body(self) -> Result<CheckoutBody, AppError> {
        let address_id = self.address_id.trim();
        if !address_id.is_empty() && address_id != "new" {
            let id = address_id
                .parse::<i32>()
                .map_err(|_| AppError::BadRequest("invalid address".to_string()))?;
            return Ok(CheckoutBody {
                address_id: Some(AddressId::new(id)),
                shipping_address: None,
            });
        }

        let optional = |value: String| (!value.trim().is_empty()).then_some(value);
        Ok(CheckoutBody {
            address_id: None,
            shipping_address: Some(AddressInput {
                full_name: self.full_name,
                line1: self.line1,
                line2: optional(self.line2),
                city: self.city,
                region: self.region,
                postal_code: self.postal_code,
                country: self.country,
                phone: optional(self.phone),
                is_default: false,
            }),
        })
    }
}

/// Messages passed back to the cart page.
#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    pub error: Option<String>,
    pub success: Option<String>,
}

// =============================================================================
// Templates
// =============================================================================

/// Cart page template.
#[derive(Template, WebTemplate)]
#[template(path = "cart/show.html")]
pub struct CartTemplate {
    pub user: Option<CurrentUser>,
    pub currency: CurrencyCode,
    pub cart: CartView,
    pub unavailable: Vec<CartItemId>,
    pub addresses: Vec<Address>,
    pub error: Option<String>,
    pub success: Option<String>,
}

impl CartTemplate {
    /// Whether a line cannot be bought as it stands.
    #[must_use]
    pub fn is_unavailable(&self, id: &CartItemId) -> bool {
        self.unavailable.contains(id)
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// `GET /cart`
pub async fn show(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
    Query(query): Query<MessageQuery>,
) -> PageResult<CartTemplate> {
    let owner = visitor::cart_owner(&session, user.as_ref()).await?;
    let cart = state.carts().view(owner).await?;
    let unavailable = unavailable_lines(&cart.lines)
        .into_iter()
        .map(|line| line.id)
        .collect();
    let addresses = match &user {
        Some(user) => {
            AddressRepository::new(state.pool())
                .list_for_user(user.id)
                .await?
        }
        None => Vec::new(),
    };

    Ok(CartTemplate {
        user,
        currency: state.config().shop.pricing.currency,
        cart,
        unavailable,
        addresses,
        error: query.error,
        success: query.success,
    })
}

fn back_to_cart(result: Result<(), AppError>, success: &str) -> Redirect {
    match result {
        Ok(()) => redirect_with("/cart", "success", success),
        Err(e) => redirect_with("/cart", "error", &e.public_message()),
    }
}

/// `POST /cart/add`
#[instrument(skip(state, session, user))]
pub async fn add(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
    Form(form): Form<AddForm>,
) -> Redirect {
    let result = async {
        let owner = visitor::ensure_cart_owner(&session, user.as_ref()).await?;
        state
            .carts()
            .add(
                owner,
                AddToCart {
                    variant_id: form.variant_id,
                    quantity: form.quantity,
                    registry_item_id: form.registry_item_id,
                },
            )
            .await?;
        Ok(())
    }
    .await;
    back_to_cart(result, "Added to your cart.")
}

/// `POST /cart/update`
#[instrument(skip(state, session, user))]
pub async fn update(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
    Form(form): Form<UpdateForm>,
) -> Redirect {
    let result = async {
        let owner = visitor::cart_owner(&session, user.as_ref())
            .await?
            .ok_or_else(|| AppError::NotFound("cart not found".to_string()))?;
        state
            .carts()
            .update(owner, form.item_id, form.quantity)
            .await?;
        Ok(())
    }
    .await;
    back_to_cart(result, "Cart updated.")
}

/// `POST /cart/remove`
#[instrument(skip(state, session, user))]
pub async fn remove(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
    Form(form): Form<RemoveForm>,
) -> Redirect {
    let result = async {
        let owner = visitor::cart_owner(&session, user.as_ref())
            .await?
            .ok_or_else(|| AppError::NotFound("cart not found".to_string()))?;
        state.carts().remove(owner, form.item_id).await?;
        Ok(())
    }
    .await;
    back_to_cart(result, "Item removed.")
}

/// `POST /cart/checkout`
///
/// Sends the shopper to Stripe's hosted payment page.
#[instrument(skip(state, session, user, form), fields(user_id = %user.id))]
pub async fn checkout(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(user): RequireAuth,
    Form(form): Form<CheckoutForm>,
) -> Response {
    let result = async {
        let body = form.into_body()?;
        checkout_api::start(&state, &session, &user, body).await
    }
    .await;

    match result {
        Ok(redirect) => Redirect::to(&redirect.url).into_response(),
        Err(e) => {
            if e.status().is_server_error() {
                tracing::error!(error = %e, "Checkout failed");
            }
            redirect_with("/cart", "error", &e.public_message()).into_response()
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_saved_address_selected() {
        let form = CheckoutForm {
            address_id: "12".to_string(),
            ..CheckoutForm::default()
        };
        let body = form.into_body().unwrap();
        assert_eq!(body.address_id, Some(AddressId::new(12)));
        assert!(body.shipping_address.is_none());
    }

    #[test]
    fn test_new_address_fields_used() {
        let form = CheckoutForm {
            address_id: "new".to_string(),
            full_name: "Sam Park".to_string(),
            line1: "1 Elm St".to_string(),
            line2: "  ".to_string(),
            city: "Portland".to_string(),
            region: "OR".to_string(),
            postal_code: "97201".to_string(),
            country: "us".to_string(),
            phone: String::new(),
        };
        let body = form.into_body().unwrap();
        let address = body.shipping_address.unwrap();
        assert_eq!(address.line2, None);
        assert_eq!(address.phone, None);
        assert_eq!(address.normalized().unwrap().country, "US");
    }

    #[test]
    fn test_bad_address_id_rejected() {
        let form = CheckoutForm {
            address_id: "abc".to_string(),
            ..CheckoutForm::default()
        };
        assert!(form.into_body().is_err());
    }
}
