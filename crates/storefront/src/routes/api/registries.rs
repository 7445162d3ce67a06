//! Gift registry endpoints: owner management and the public share view.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use nestling_core::{RegistryEventType, RegistryId, RegistryItemId, RegistryStatus};

use crate::error::Result;
use crate::middleware::RequireAuth;
use crate::models::{Registry, RegistryDetail, RegistryItemView};
use crate::services::registry::{RegistryInput, RegistryItemInput, RegistryItemUpdate};
use crate::state::AppState;

/// Body of `PATCH /api/registries/{id}`; absent fields keep their value.
#[derive(Debug, Default, Deserialize)]
pub struct RegistryPatch {
    pub title: Option<String>,
    pub event_type: Option<RegistryEventType>,
    #[serde(default, with = "double_option")]
    pub event_date: Option<Option<NaiveDate>>,
    #[serde(default, with = "double_option")]
    pub message: Option<Option<String>>,
    pub is_public: Option<bool>,
    pub status: Option<RegistryStatus>,
}

impl RegistryPatch {
    fn has_field_changes(&self) -> bool {
        self.title.is_some()
            || self.event_type.is_some()
            || self.event_date.is_some()
            || self.message.is_some()
            || self.is_public.is_some()
    }

    /// Apply the patch on top of a registry's current fields.
    #[must_use]
    pub fn merged_with(self, current: &Registry) -> RegistryInput {
        RegistryInput {
            title: self.title.unwrap_or_else(|| current.title.clone()),
            event_type: self.event_type.unwrap_or(current.event_type),
            event_date: self.event_date.unwrap_or(current.event_date),
            message: self.message.unwrap_or_else(|| current.message.clone()),
            is_public: self.is_public.unwrap_or(current.is_public),
        }
    }
}

/// Distinguishes `"field": null` (clear) from a missing field (keep).
mod double_option {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
    where
        T: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        Option::<T>::deserialize(deserializer).map(Some)
    }
}

/// A registry as shown to gift givers; owner details stay private.
#[derive(Serialize)]
pub struct PublicRegistry {
    pub share_code: String,
    pub title: String,
    pub event_type: RegistryEventType,
    pub event_date: Option<NaiveDate>,
    pub message: Option<String>,
    pub items: Vec<RegistryItemView>,
}

impl From<RegistryDetail> for PublicRegistry {
    fn from(detail: RegistryDetail) -> Self {
        let registry = detail.registry;
        Self {
            share_code: registry.share_code.as_str().to_string(),
            title: registry.title,
            event_type: registry.event_type,
            event_date: registry.event_date,
            message: registry.message,
            items: detail.items,
        }
    }
}

// =============================================================================
// Owner endpoints
// =============================================================================

/// `GET /api/registries`
pub async fn list(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<Vec<Registry>>> {
    Ok(Json(state.registries().list(user.id).await?))
}

/// `POST /api/registries`
#[instrument(skip(state, user, input), fields(user_id = %user.id))]
pub async fn create(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Json(input): Json<RegistryInput>,
) -> Result<impl IntoResponse> {
    let registry = state.registries().create(user.id, input).await?;
    Ok((StatusCode::CREATED, Json(registry)))
}

/// `GET /api/registries/{id}`
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<RegistryId>,
) -> Result<Json<RegistryDetail>> {
    Ok(Json(state.registries().owner_view(user.id, id).await?))
}

/// `PATCH /api/registries/{id}`
///
/// Field changes are applied before a status change, so a registry can be
/// edited and completed in one request.
#[instrument(skip(state, user, patch), fields(user_id = %user.id))]
pub async fn update(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<RegistryId>,
    Json(patch): Json<RegistryPatch>,
) -> Result<Json<Registry>> {
    let registries = state.registries();
    let mut registry = registries.owner_view(user.id, id).await?.registry;

    let status = patch.status;
    if patch.has_field_changes() {
        let input = patch.merged_with(&registry);
        registry = registries.update(user.id, id, input).await?;
    }
    if let Some(status) = status
        && status != registry.status
    {
        registry = registries.set_status(user.id, id, status).await?;
    }

    Ok(Json(registry))
}

/// `POST /api/registries/{id}/items`
#[instrument(skip(state, user, input), fields(user_id = %user.id))]
pub async fn add_item(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<RegistryId>,
    Json(input): Json<RegistryItemInput>,
) -> Result<impl IntoResponse> {
    let item = state.registries().add_item(user.id, id, input).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

/// `PATCH /api/registries/{id}/items/{item_id}`
#[instrument(skip(state, user, input), fields(user_id = %user.id))]
pub async fn update_item(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path((id, item_id)): Path<(RegistryId, RegistryItemId)>,
    Json(input): Json<RegistryItemUpdate>,
) -> Result<Json<RegistryItemView>> {
    Ok(Json(
        state
            .registries()
            .update_item(user.id, id, item_id, input)
            .await?,
    ))
}

/// `DELETE /api/registries/{id}/items/{item_id}`
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn remove_item(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path((id, item_id)): Path<(RegistryId, RegistryItemId)>,
) -> Result<StatusCode> {
    state.registries().remove_item(user.id, id, item_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Public share view
// =============================================================================

/// `GET /api/registry/share/{code}`
pub async fn shared(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<PublicRegistry>> {
    let detail = state.registries().public_view(&code).await?;
    Ok(Json(PublicRegistry::from(detail)))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use nestling_core::{ShareCode, UserId};

    use super::*;

    fn registry() -> Registry {
        Registry {
            id: RegistryId::new(3),
            user_id: UserId::new(9),
            share_code: ShareCode::parse("ABCD2345").unwrap(),
            title: "Baby Park".to_string(),
            event_type: RegistryEventType::BabyShower,
            event_date: NaiveDate::from_ymd_opt(2026, 11, 14),
            message: Some("Thank you!".to_string()),
            is_public: true,
            status: RegistryStatus::Active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_missing_fields_keep_current_values() {
        let patch: RegistryPatch = serde_json::from_str(r#"{"title": "Baby Lee"}"#).unwrap();
        assert!(patch.has_field_changes());
        let input = patch.merged_with(&registry());
        assert_eq!(input.title, "Baby Lee");
        assert_eq!(input.message.as_deref(), Some("Thank you!"));
        assert_eq!(input.event_date, NaiveDate::from_ymd_opt(2026, 11, 14));
    }

    #[test]
    fn test_null_clears_optional_fields() {
        let patch: RegistryPatch =
            serde_json::from_str(r#"{"message": null, "event_date": null}"#).unwrap();
        let input = patch.merged_with(&registry());
        assert_eq!(input.message, None);
        assert_eq!(input.event_date, None);
    }

    #[test]
    fn test_status_only_patch() {
        let patch: RegistryPatch = serde_json::from_str(r#"{"status": "completed"}"#).unwrap();
        assert!(!patch.has_field_changes());
        assert_eq!(patch.status, Some(RegistryStatus::Completed));
    }
}
