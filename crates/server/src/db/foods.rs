//! Menu catalog repository.

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crave_core::FoodItemId;

use super::{RepositoryError, to_price};
use crate::models::food::{FoodDraft, FoodFilter, FoodItem};

const FOOD_COLUMNS: &str =
    "id, name, description, category, price_cents, image_path, is_available, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct FoodRow {
    id: FoodItemId,
    name: String,
    description: String,
    category: String,
    price_cents: i64,
    image_path: Option<String>,
    is_available: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<FoodRow> for FoodItem {
    type Error = RepositoryError;

    fn try_from(row: FoodRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            price: to_price(row.price_cents, "price_cents")?,
            name: row.name,
            description: row.description,
            category: row.category,
            image_path: row.image_path,
            is_available: row.is_available,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Repository for menu items.
pub struct FoodRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> FoodRepository<'a> {
    /// Create a new food repository.
    #[must_use]
    pub const fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// List menu items matching a filter, ordered by category then name.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(&self, filter: &FoodFilter) -> Result<Vec<FoodItem>, RepositoryError> {
        let mut qb: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new(format!("SELECT {FOOD_COLUMNS} FROM food_item WHERE 1 = 1"));

        if let Some(category) = filter.category.as_deref().filter(|c| !c.is_empty()) {
            qb.push(" AND category = ").push_bind(category.to_owned());
        }
        if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let pattern = format!("%{search}%");
            qb.push(" AND (name LIKE ")
                .push_bind(pattern.clone())
                .push(" OR description LIKE ")
                .push_bind(pattern)
                .push(")");
        }
        if filter.available_only {
            qb.push(" AND is_available = TRUE");
        }
        qb.push(" ORDER BY category, name, id");

        let rows: Vec<FoodRow> = qb.build_query_as().fetch_all(self.pool).await?;
        rows.into_iter().map(FoodItem::try_from).collect()
    }

    /// Get a menu item by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: FoodItemId) -> Result<Option<FoodItem>, RepositoryError> {
        let row: Option<FoodRow> = sqlx::query_as(&format!(
            "SELECT {FOOD_COLUMNS} FROM food_item WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        row.map(FoodItem::try_from).transpose()
    }

    /// Distinct categories, alphabetically.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn categories(&self) -> Result<Vec<String>, RepositoryError> {
        let categories =
            sqlx::query_scalar("SELECT DISTINCT category FROM food_item ORDER BY category")
                .fetch_all(self.pool)
                .await?;
        Ok(categories)
    }

    /// Insert a new menu item.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    pub async fn create(&self, draft: &FoodDraft) -> Result<FoodItem, RepositoryError> {
        let now = Utc::now();
        let row: FoodRow = sqlx::query_as(&format!(
            "INSERT INTO food_item (name, description, category, price_cents, image_path, is_available, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?) RETURNING {FOOD_COLUMNS}"
        ))
        .bind(&draft.name)
        .bind(&draft.description)
        .bind(&draft.category)
        .bind(draft.price.cents())
        .bind(&draft.image_path)
        .bind(draft.is_available)
        .bind(now)
        .bind(now)
        .fetch_one(self.pool)
        .await?;

        row.try_into()
    }

    /// Replace every editable field of a menu item.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the item doesn't exist.
    pub async fn update(
        &self,
        id: FoodItemId,
        draft: &FoodDraft,
    ) -> Result<FoodItem, RepositoryError> {
        let row: Option<FoodRow> = sqlx::query_as(&format!(
            "UPDATE food_item SET name = ?, description = ?, category = ?, price_cents = ?, \
             image_path = ?, is_available = ?, updated_at = ? WHERE id = ? RETURNING {FOOD_COLUMNS}"
        ))
        .bind(&draft.name)
        .bind(&draft.description)
        .bind(&draft.category)
        .bind(draft.price.cents())
        .bind(&draft.image_path)
        .bind(draft.is_available)
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        row.ok_or(RepositoryError::NotFound)?.try_into()
    }

    /// Show or hide a menu item.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the item doesn't exist.
    pub async fn set_available(
        &self,
        id: FoodItemId,
        available: bool,
    ) -> Result<(), RepositoryError> {
        let result =
            sqlx::query("UPDATE food_item SET is_available = ?, updated_at = ? WHERE id = ?")
                .bind(available)
                .bind(Utc::now())
                .bind(id)
                .execute(self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Delete a menu item. Cart lines cascade; past order lines keep their snapshot.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the item doesn't exist.
    pub async fn delete(&self, id: FoodItemId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM food_item WHERE id = ?")
            .bind(id)
            .execute(self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}
