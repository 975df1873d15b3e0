//! Cart repository.
//!
//! A cart is the set of `cart_item` rows for one user; there is no cart header.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};

use crave_core::{FoodItemId, UserId};

use super::{RepositoryError, to_price, to_u32};
use crate::models::cart::CartLine;

#[derive(sqlx::FromRow)]
struct CartLineRow {
    food_item_id: FoodItemId,
    name: String,
    price_cents: i64,
    quantity: i64,
    is_available: bool,
}

impl TryFrom<CartLineRow> for CartLine {
    type Error = RepositoryError;

    fn try_from(row: CartLineRow) -> Result<Self, Self::Error> {
        let unit_price = to_price(row.price_cents, "price_cents")?;
        let quantity = to_u32(row.quantity, "quantity")?;
        Ok(Self {
            food_item_id: row.food_item_id,
            name: row.name,
            unit_price,
            quantity,
            is_available: row.is_available,
            subtotal: unit_price.times(quantity),
        })
    }
}

/// Repository for cart lines.
pub struct CartRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> CartRepository<'a> {
    /// Create a new cart repository.
    #[must_use]
    pub const fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// All lines in a user's cart, oldest first, joined with current menu data.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn lines(&self, user_id: UserId) -> Result<Vec<CartLine>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        Self::lines_in(&mut conn, user_id).await
    }

    /// Same as [`Self::lines`] on an existing connection or transaction.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn lines_in(
        conn: &mut SqliteConnection,
        user_id: UserId,
    ) -> Result<Vec<CartLine>, RepositoryError> {
        let rows: Vec<CartLineRow> = sqlx::query_as(
            "SELECT c.food_item_id, f.name, f.price_cents, c.quantity, f.is_available \
             FROM cart_item c JOIN food_item f ON f.id = c.food_item_id \
             WHERE c.user_id = ? ORDER BY c.added_at, c.id",
        )
        .bind(user_id)
        .fetch_all(conn)
        .await?;

        rows.into_iter().map(CartLine::try_from).collect()
    }

    /// Add `quantity` of an item, merging with an existing line, as long as the
    /// merged line stays within `max`. Returns the new line quantity, or `None`
    /// when the merge would pass `max` (the line is left as it was).
    ///
    /// The bound is checked inside the upsert, so concurrent adds cannot
    /// overshoot it.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the upsert fails (e.g. unknown food item).
    pub async fn add(
        &self,
        user_id: UserId,
        food_item_id: FoodItemId,
        quantity: u32,
        max: u32,
    ) -> Result<Option<u32>, RepositoryError> {
        let total: Option<i64> = sqlx::query_scalar(
            "INSERT INTO cart_item (user_id, food_item_id, quantity, added_at) VALUES (?, ?, ?, ?) \
             ON CONFLICT (user_id, food_item_id) DO UPDATE SET quantity = quantity + excluded.quantity \
             WHERE quantity + excluded.quantity <= ? \
             RETURNING quantity",
        )
        .bind(user_id)
        .bind(food_item_id)
        .bind(i64::from(quantity))
        .bind(Utc::now())
        .bind(i64::from(max))
        .fetch_optional(self.pool)
        .await?;

        total.map(|q| to_u32(q, "quantity")).transpose()
    }

    /// Set the quantity of an existing line.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the item is not in the cart.
    pub async fn set_quantity(
        &self,
        user_id: UserId,
        food_item_id: FoodItemId,
        quantity: u32,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE cart_item SET quantity = ? WHERE user_id = ? AND food_item_id = ?",
        )
        .bind(i64::from(quantity))
        .bind(user_id)
        .bind(food_item_id)
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Remove one line. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn remove(
        &self,
        user_id: UserId,
        food_item_id: FoodItemId,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM cart_item WHERE user_id = ? AND food_item_id = ?")
            .bind(user_id)
            .bind(food_item_id)
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Empty a user's cart. Returns the number of lines removed.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn clear(&self, user_id: UserId) -> Result<u64, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        Self::clear_in(&mut conn, user_id).await
    }

    /// Same as [`Self::clear`] on an existing connection or transaction.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn clear_in(
        conn: &mut SqliteConnection,
        user_id: UserId,
    ) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM cart_item WHERE user_id = ?")
            .bind(user_id)
            .execute(conn)
            .await?;
        Ok(result.rows_affected())
    }
}
