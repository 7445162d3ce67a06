//! Registry repository.

use chrono::NaiveDate;
use rand::rng;
use sqlx::{PgConnection, PgPool};

use nestling_core::{
    RegistryEventType, RegistryId, RegistryItemId, RegistryStatus, ShareCode, UserId, VariantId,
};

use super::{RepositoryError, map_unique_violation};
use crate::models::{Registry, RegistryDetail, RegistryItemView};

const REGISTRY_COLUMNS: &str = "id, user_id, share_code, title, event_type, event_date, message, \
                                is_public, status, created_at, updated_at";

const ITEM_SELECT: &str = r"
    SELECT ri.id, ri.registry_id, ri.variant_id, p.id AS product_id,
           p.slug AS product_slug, p.name AS product_name, v.name AS variant_name,
           p.image_url, v.price, ri.quantity_requested, ri.quantity_purchased, ri.note
    FROM shop.registry_items ri
    JOIN shop.variants v ON v.id = ri.variant_id
    JOIN shop.products p ON p.id = v.product_id
";

/// How many fresh share codes to try before giving up.
const SHARE_CODE_ATTEMPTS: usize = 5;

/// Registry fields as written on create and update.
#[derive(Debug, Clone)]
pub struct RegistryFields {
    pub title: String,
    pub event_type: RegistryEventType,
    pub event_date: Option<NaiveDate>,
    pub message: Option<String>,
    pub is_public: bool,
}

/// Repository for registries and their items.
pub struct RegistryRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> RegistryRepository<'a> {
    /// Create a new registry repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Create a registry with a fresh share code.
    ///
    /// Share codes are random; a collision with an existing code retries
    /// with a new one.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if no unique code was found.
    pub async fn create(
        &self,
        user_id: UserId,
        fields: &RegistryFields,
    ) -> Result<Registry, RepositoryError> {
        for _ in 0..SHARE_CODE_ATTEMPTS {
            let code = ShareCode::generate(&mut rng());
            let result = sqlx::query_as::<_, Registry>(&format!(
                "INSERT INTO shop.registries \
                     (user_id, share_code, title, event_type, event_date, message, is_public) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7) \
                 RETURNING {REGISTRY_COLUMNS}"
            ))
            .bind(user_id)
            .bind(&code)
            .bind(&fields.title)
            .bind(fields.event_type)
            .bind(fields.event_date)
            .bind(&fields.message)
            .bind(fields.is_public)
            .fetch_one(self.pool)
            .await
            .map_err(|e| map_unique_violation(e, "share code collision"));

            match result {
                Ok(registry) => return Ok(registry),
                Err(RepositoryError::Conflict(_)) => {
                    tracing::debug!(code = %code, "Share code collision, retrying");
                }
                Err(e) => return Err(e),
            }
        }

        Err(RepositoryError::Conflict(
            "could not allocate a unique share code".to_owned(),
        ))
    }

    /// A registry by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if it does not exist.
    pub async fn get(&self, id: RegistryId) -> Result<Registry, RepositoryError> {
        sqlx::query_as::<_, Registry>(&format!(
            "SELECT {REGISTRY_COLUMNS} FROM shop.registries WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)
    }

    /// A registry by share code.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if no registry has this code.
    pub async fn get_by_share_code(&self, code: &ShareCode) -> Result<Registry, RepositoryError> {
        sqlx::query_as::<_, Registry>(&format!(
            "SELECT {REGISTRY_COLUMNS} FROM shop.registries WHERE share_code = $1"
        ))
        .bind(code)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)
    }

    /// A registry with its items.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn detail(&self, registry: Registry) -> Result<RegistryDetail, RepositoryError> {
        let items = sqlx::query_as::<_, RegistryItemView>(&format!(
            "{ITEM_SELECT} WHERE ri.registry_id = $1 ORDER BY ri.created_at, ri.id"
        ))
        .bind(registry.id)
        .fetch_all(self.pool)
        .await?;
        Ok(RegistryDetail { registry, items })
    }

    /// A user's registries, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Registry>, RepositoryError> {
        let registries = sqlx::query_as::<_, Registry>(&format!(
            "SELECT {REGISTRY_COLUMNS} FROM shop.registries WHERE user_id = $1 \
             ORDER BY created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;
        Ok(registries)
    }

    /// Replace a registry's editable fields.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the registry does not exist.
    pub async fn update(
        &self,
        id: RegistryId,
        fields: &RegistryFields,
    ) -> Result<Registry, RepositoryError> {
        sqlx::query_as::<_, Registry>(&format!(
            "UPDATE shop.registries SET \
                 title = $2, event_type = $3, event_date = $4, message = $5, is_public = $6, \
                 updated_at = now() \
             WHERE id = $1 \
             RETURNING {REGISTRY_COLUMNS}"
        ))
        .bind(id)
        .bind(&fields.title)
        .bind(fields.event_type)
        .bind(fields.event_date)
        .bind(&fields.message)
        .bind(fields.is_public)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)
    }

    /// Change a registry's status.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the registry does not exist.
    pub async fn set_status(
        &self,
        id: RegistryId,
        status: RegistryStatus,
    ) -> Result<Registry, RepositoryError> {
        sqlx::query_as::<_, Registry>(&format!(
            "UPDATE shop.registries SET status = $2, updated_at = now() WHERE id = $1 \
             RETURNING {REGISTRY_COLUMNS}"
        ))
        .bind(id)
        .bind(status)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)
    }

    /// One item of a registry.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the item is not on this registry.
    pub async fn get_item(
        &self,
        registry_id: RegistryId,
        item_id: RegistryItemId,
    ) -> Result<RegistryItemView, RepositoryError> {
        sqlx::query_as::<_, RegistryItemView>(&format!(
            "{ITEM_SELECT} WHERE ri.registry_id = $1 AND ri.id = $2"
        ))
        .bind(registry_id)
        .bind(item_id)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)
    }

    /// A registry item with the status of the registry it is on.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the item does not exist.
    pub async fn get_item_with_status(
        &self,
        item_id: RegistryItemId,
    ) -> Result<(RegistryItemView, RegistryStatus), RepositoryError> {
        #[derive(sqlx::FromRow)]
        struct Row {
            #[sqlx(flatten)]
            item: RegistryItemView,
            registry_status: RegistryStatus,
        }

        let row = sqlx::query_as::<_, Row>(
            r"
            SELECT ri.id, ri.registry_id, ri.variant_id, p.id AS product_id,
                   p.slug AS product_slug, p.name AS product_name, v.name AS variant_name,
                   p.image_url, v.price, ri.quantity_requested, ri.quantity_purchased, ri.note,
                   r.status AS registry_status
            FROM shop.registry_items ri
            JOIN shop.registries r ON r.id = ri.registry_id
            JOIN shop.variants v ON v.id = ri.variant_id
            JOIN shop.products p ON p.id = v.product_id
            WHERE ri.id = $1
            ",
        )
        .bind(item_id)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        Ok((row.item, row.registry_status))
    }

    /// Add a variant to a registry.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the variant is already on the registry.
    pub async fn add_item(
        &self,
        registry_id: RegistryId,
        variant_id: VariantId,
        quantity_requested: i32,
        note: Option<&str>,
    ) -> Result<RegistryItemView, RepositoryError> {
        let id: RegistryItemId = sqlx::query_scalar(
            "INSERT INTO shop.registry_items (registry_id, variant_id, quantity_requested, note) \
             VALUES ($1, $2, $3, $4) RETURNING id",
        )
        .bind(registry_id)
        .bind(variant_id)
        .bind(quantity_requested)
        .bind(note)
        .fetch_one(self.pool)
        .await
        .map_err(|e| map_unique_violation(e, "variant is already on this registry"))?;

        touch(self.pool, registry_id).await?;
        self.get_item(registry_id, id).await
    }

    /// Change how many units of an item are requested, and its note.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the item is not on this registry.
    pub async fn update_item(
        &self,
        registry_id: RegistryId,
        item_id: RegistryItemId,
        quantity_requested: i32,
        note: Option<&str>,
    ) -> Result<RegistryItemView, RepositoryError> {
        let result = sqlx::query(
            "UPDATE shop.registry_items SET quantity_requested = $3, note = $4, updated_at = now() \
             WHERE id = $2 AND registry_id = $1",
        )
        .bind(registry_id)
        .bind(item_id)
        .bind(quantity_requested)
        .bind(note)
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        touch(self.pool, registry_id).await?;
        self.get_item(registry_id, item_id).await
    }

    /// Remove an item from a registry.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the item is not on this registry.
    pub async fn remove_item(
        &self,
        registry_id: RegistryId,
        item_id: RegistryItemId,
    ) -> Result<(), RepositoryError> {
        let result =
            sqlx::query("DELETE FROM shop.registry_items WHERE id = $2 AND registry_id = $1")
                .bind(registry_id)
                .bind(item_id)
                .execute(self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        touch(self.pool, registry_id).await
    }
}

/// Count units bought for a registry item.
///
/// Purchases beyond the requested quantity are still recorded; `remaining`
/// clamps at zero when displayed.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the update fails.
pub async fn record_purchase(
    conn: &mut PgConnection,
    item_id: RegistryItemId,
    quantity: i32,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "UPDATE shop.registry_items \
         SET quantity_purchased = quantity_purchased + $2, updated_at = now() \
         WHERE id = $1",
    )
    .bind(item_id)
    .bind(quantity)
    .execute(conn)
    .await?;
    Ok(())
}

async fn touch(pool: &PgPool, registry_id: RegistryId) -> Result<(), RepositoryError> {
    sqlx::query("UPDATE shop.registries SET updated_at = now() WHERE id = $1")
        .bind(registry_id)
        .execute(pool)
        .await?;
    Ok(())
}
