//! Gift registries.
//!
//! Owners manage their registries through the account API. Everyone else
//! reaches a registry by its share code, and only while it is active and
//! public; any other registry answers as not found.

use chrono::NaiveDate;
use serde::Deserialize;
use sqlx::PgPool;
use tracing::instrument;

use nestling_core::{
    RegistryEventType, RegistryId, RegistryItemId, RegistryStatus, ShareCode, UserId, VariantId,
};

use crate::db::registries::RegistryFields;
use crate::db::{CatalogRepository, RegistryRepository, RepositoryError};
use crate::error::{AppError, Result};
use crate::models::{Registry, RegistryDetail, RegistryItemView};
use crate::services::cart::validate_quantity;

/// Longest registry title.
pub const MAX_TITLE_LENGTH: usize = 120;

/// Longest registry message or item note.
pub const MAX_MESSAGE_LENGTH: usize = 1_000;

/// Registry fields as submitted by the owner.
#[derive(Debug, Clone, Deserialize)]
pub struct RegistryInput {
    pub title: String,
    pub event_type: RegistryEventType,
    #[serde(default)]
    pub event_date: Option<NaiveDate>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default = "default_public")]
    pub is_public: bool,
}

const fn default_public() -> bool {
    true
}

impl RegistryInput {
    /// Trim and check the fields.
    ///
    /// # Errors
    ///
    /// Returns `AppError::BadRequest` naming the invalid field.
    pub fn validate(self) -> Result<RegistryFields> {
        let title = self.title.trim().to_string();
        let length = title.chars().count();
        if length == 0 || length > MAX_TITLE_LENGTH {
            return Err(AppError::BadRequest(format!(
                "title must be between 1 and {MAX_TITLE_LENGTH} characters"
            )));
        }

        Ok(RegistryFields {
            title,
            event_type: self.event_type,
            event_date: self.event_date,
            message: clean_text("message", self.message)?,
            is_public: self.is_public,
        })
    }
}

/// An item to add to a registry.
#[derive(Debug, Clone, Deserialize)]
pub struct RegistryItemInput {
    pub variant_id: VariantId,
    pub quantity: i32,
    #[serde(default)]
    pub note: Option<String>,
}

/// Changes to a registry item.
#[derive(Debug, Clone, Deserialize)]
pub struct RegistryItemUpdate {
    pub quantity: i32,
    #[serde(default)]
    pub note: Option<String>,
}

/// Registry service.
pub struct RegistryService<'a> {
    registries: RegistryRepository<'a>,
    catalog: CatalogRepository<'a>,
}

impl<'a> RegistryService<'a> {
    /// Create a new registry service.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self {
            registries: RegistryRepository::new(pool),
            catalog: CatalogRepository::new(pool),
        }
    }

    /// Create a registry owned by `owner`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::BadRequest` for invalid fields.
    #[instrument(skip(self, input))]
    pub async fn create(&self, owner: UserId, input: RegistryInput) -> Result<Registry> {
        let fields = input.validate()?;
        let registry = self.registries.create(owner, &fields).await?;
        tracing::info!(registry_id = %registry.id, "Registry created");
        Ok(registry)
    }

    /// The owner's registries.
    ///
    /// # Errors
    ///
    /// Returns error if the database read fails.
    pub async fn list(&self, owner: UserId) -> Result<Vec<Registry>> {
        Ok(self.registries.list_for_user(owner).await?)
    }

    /// A registry with its items, for its owner.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the registry does not exist or belongs
    /// to someone else.
    pub async fn owner_view(&self, owner: UserId, id: RegistryId) -> Result<RegistryDetail> {
        let registry = self.owned(owner, id).await?;
        Ok(self.registries.detail(registry).await?)
    }

    /// Replace a registry's editable fields.
    ///
    /// # Errors
    ///
    /// Returns `AppError::BadRequest` for invalid fields and
    /// `AppError::NotFound` for someone else's registry.
    pub async fn update(
        &self,
        owner: UserId,
        id: RegistryId,
        input: RegistryInput,
    ) -> Result<Registry> {
        let fields = input.validate()?;
        self.owned(owner, id).await?;
        Ok(self.registries.update(id, &fields).await?)
    }

    /// Complete, archive or reopen a registry.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Conflict` if the registry cannot move to `status`.
    #[instrument(skip(self))]
    pub async fn set_status(
        &self,
        owner: UserId,
        id: RegistryId,
        status: RegistryStatus,
    ) -> Result<Registry> {
        let registry = self.owned(owner, id).await?;
        if !status_change_allowed(registry.status, status) {
            return Err(AppError::Conflict(format!(
                "registry cannot move from {} to {status}",
                registry.status
            )));
        }
        let registry = self.registries.set_status(id, status).await?;
        tracing::info!(registry_id = %id, status = %status, "Registry status changed");
        Ok(registry)
    }

    /// Add a variant to a registry.
    ///
    /// # Errors
    ///
    /// Returns `AppError::BadRequest` for an out-of-range quantity,
    /// `AppError::Conflict` if the registry is archived, the variant is not
    /// for sale or is already on the registry.
    pub async fn add_item(
        &self,
        owner: UserId,
        id: RegistryId,
        input: RegistryItemInput,
    ) -> Result<RegistryItemView> {
        let quantity = validate_quantity(input.quantity)?;
        let note = clean_text("note", input.note)?;
        let registry = self.owned(owner, id).await?;
        ensure_editable(&registry)?;

        self.catalog
            .get_purchasable_variant(input.variant_id)
            .await?
            .ok_or_else(|| AppError::Conflict("this item is not available".to_string()))?;

        Ok(self
            .registries
            .add_item(id, input.variant_id, quantity, note.as_deref())
            .await?)
    }

    /// Change an item's requested quantity and note.
    ///
    /// # Errors
    ///
    /// Returns `AppError::BadRequest` for an out-of-range quantity and
    /// `AppError::NotFound` if the item is not on the owner's registry.
    pub async fn update_item(
        &self,
        owner: UserId,
        id: RegistryId,
        item_id: RegistryItemId,
        input: RegistryItemUpdate,
    ) -> Result<RegistryItemView> {
        let quantity = validate_quantity(input.quantity)?;
        let note = clean_text("note", input.note)?;
        let registry = self.owned(owner, id).await?;
        ensure_editable(&registry)?;

        Ok(self
            .registries
            .update_item(id, item_id, quantity, note.as_deref())
            .await?)
    }

    /// Remove an item from a registry.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the item is not on the owner's registry.
    pub async fn remove_item(
        &self,
        owner: UserId,
        id: RegistryId,
        item_id: RegistryItemId,
    ) -> Result<()> {
        let registry = self.owned(owner, id).await?;
        ensure_editable(&registry)?;
        Ok(self.registries.remove_item(id, item_id).await?)
    }

    /// The public view of a registry reached through its share code.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` for malformed codes and for registries
    /// that are not active and public, and `AppError::Database` if the
    /// lookup fails.
    #[instrument(skip(self))]
    pub async fn public_view(&self, code: &str) -> Result<RegistryDetail> {
        let not_found = || AppError::NotFound("registry not found".to_string());
        let code = ShareCode::parse(code).map_err(|_| not_found())?;
        let registry = self
            .registries
            .get_by_share_code(&code)
            .await
            .map_err(share_lookup_error)?;
        if !is_publicly_visible(&registry) {
            return Err(not_found());
        }
        Ok(self.registries.detail(registry).await?)
    }

    async fn owned(&self, owner: UserId, id: RegistryId) -> Result<Registry> {
        let registry = self.registries.get(id).await?;
        if registry.user_id != owner {
            return Err(AppError::NotFound("resource not found".to_string()));
        }
        Ok(registry)
    }
}

/// Map a share-code lookup failure. Only a missing row is a 404; anything
/// else must not look like a cacheable "no such registry".
fn share_lookup_error(err: RepositoryError) -> AppError {
    match err {
        RepositoryError::NotFound => AppError::NotFound("registry not found".to_string()),
        other => other.into(),
    }
}

/// Whether a registry may be shown through its share code.
#[must_use]
pub const fn is_publicly_visible(registry: &Registry) -> bool {
    registry.is_public && matches!(registry.status, RegistryStatus::Active)
}

/// Allowed registry status changes.
///
/// Active registries can be completed or archived, completed ones archived,
/// and archived ones reopened.
#[must_use]
pub const fn status_change_allowed(from: RegistryStatus, to: RegistryStatus) -> bool {
    matches!(
        (from, to),
        (RegistryStatus::Active, RegistryStatus::Completed | RegistryStatus::Archived)
            | (RegistryStatus::Completed, RegistryStatus::Archived)
            | (RegistryStatus::Archived, RegistryStatus::Active)
    )
}

fn ensure_editable(registry: &Registry) -> Result<()> {
    if registry.status == RegistryStatus::Archived {
        return Err(AppError::Conflict("archived registries cannot be edited".to_string()));
    }
    Ok(())
}

fn clean_text(field: &str, value: Option<String>) -> Result<Option<String>> {
    let value = value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());
    if let Some(v) = &value
        && v.chars().count() > MAX_MESSAGE_LENGTH
    {
        return Err(AppError::BadRequest(format!(
            "{field} must be at most {MAX_MESSAGE_LENGTH} characters"
        )));
    }
    Ok(value)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn input(title: &str) -> RegistryInput {
        RegistryInput {
            title: title.to_string(),
            event_type: RegistryEventType::BabyShower,
            event_date: None,
            message: Some("  ".to_string()),
            is_public: true,
        }
    }

    fn registry(status: RegistryStatus, is_public: bool) -> Registry {
        Registry {
            id: RegistryId::new(1),
            user_id: UserId::new(1),
            share_code: ShareCode::parse("ABCD2345").unwrap(),
            title: "Baby Park".to_string(),
            event_type: RegistryEventType::BabyShower,
            event_date: None,
            message: None,
            is_public,
            status,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_title_bounds() {
        assert_eq!(input("  Baby Park  ").validate().unwrap().title, "Baby Park");
        assert!(input("   ").validate().is_err());
        assert!(input(&"a".repeat(MAX_TITLE_LENGTH)).validate().is_ok());
        assert!(input(&"a".repeat(MAX_TITLE_LENGTH + 1)).validate().is_err());
    }

    #[test]
    fn test_blank_message_dropped() {
        assert_eq!(input("Baby Park").validate().unwrap().message, None);
    }

    #[test]
    fn test_share_lookup_keeps_database_failures() {
        assert!(matches!(
            share_lookup_error(RepositoryError::NotFound),
            AppError::NotFound(_)
        ));
        assert!(matches!(
            share_lookup_error(RepositoryError::Database(sqlx::Error::PoolTimedOut)),
            AppError::Database(_)
        ));
    }

    #[test]
    fn test_public_visibility() {
        assert!(is_publicly_visible(&registry(RegistryStatus::Active, true)));
        assert!(!is_publicly_visible(&registry(RegistryStatus::Active, false)));
        assert!(!is_publicly_visible(&registry(RegistryStatus::Completed, true)));
        assert!(!is_publicly_visible(&registry(RegistryStatus::Archived, true)));
    }

    #[test]
    fn test_status_changes() {
        use RegistryStatus::{Active, Archived, Completed};
        assert!(status_change_allowed(Active, Completed));
        assert!(status_change_allowed(Active, Archived));
        assert!(status_change_allowed(Completed, Archived));
        assert!(status_change_allowed(Archived, Active));
        assert!(!status_change_allowed(Completed, Active));
        assert!(!status_change_allowed(Active, Active));
    }
}
