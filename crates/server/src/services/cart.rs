//! Shopping cart.

use sqlx::SqlitePool;

use crave_core::{FoodItemId, UserId};

use super::error::ServiceError;
use crate::db::{CartRepository, FoodRepository};
use crate::models::cart::CartSummary;

/// Largest quantity of a single item per cart line.
pub const MAX_LINE_QUANTITY: u32 = 99;

/// Cart service.
pub struct CartService<'a> {
    cart: CartRepository<'a>,
    foods: FoodRepository<'a>,
}

impl<'a> CartService<'a> {
    #[must_use]
    pub const fn new(pool: &'a SqlitePool) -> Self {
        Self {
            cart: CartRepository::new(pool),
            foods: FoodRepository::new(pool),
        }
    }

    /// The user's cart with totals.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Repository` if the query fails.
    pub async fn summary(&self, user_id: UserId) -> Result<CartSummary, ServiceError> {
        let lines = self.cart.lines(user_id).await?;
        Ok(CartSummary::from_lines(lines))
    }

    /// Add an item, merging with an existing line.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Validation` for a quantity outside `1..=99` (after merging),
    /// `ServiceError::NotFound` for an unknown item and `ServiceError::ItemUnavailable`
    /// for a hidden one.
    pub async fn add(
        &self,
        user_id: UserId,
        food_item_id: FoodItemId,
        quantity: u32,
    ) -> Result<CartSummary, ServiceError> {
        check_quantity(quantity)?;

        let food = self
            .foods
            .get(food_item_id)
            .await?
            .ok_or(ServiceError::NotFound("food item"))?;
        if !food.is_available {
            return Err(ServiceError::ItemUnavailable(food.name));
        }

        let Some(total) = self
            .cart
            .add(user_id, food_item_id, quantity, MAX_LINE_QUANTITY)
            .await?
        else {
            return Err(quantity_out_of_range());
        };
        tracing::debug!(user_id = %user_id, food_id = %food_item_id, quantity = total, "Cart line updated");

        self.summary(user_id).await
    }

    /// Set the quantity of a line. Zero removes it.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::NotFound` if the item is not in the cart.
    pub async fn update_quantity(
        &self,
        user_id: UserId,
        food_item_id: FoodItemId,
        quantity: u32,
    ) -> Result<CartSummary, ServiceError> {
        if quantity == 0 {
            return self.remove(user_id, food_item_id).await;
        }
        check_quantity(quantity)?;

        self.cart
            .set_quantity(user_id, food_item_id, quantity)
            .await
            .map_err(ServiceError::not_found("cart item"))?;
        self.summary(user_id).await
    }

    /// Remove a line.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::NotFound` if the item is not in the cart.
    pub async fn remove(
        &self,
        user_id: UserId,
        food_item_id: FoodItemId,
    ) -> Result<CartSummary, ServiceError> {
        if !self.cart.remove(user_id, food_item_id).await? {
            return Err(ServiceError::NotFound("cart item"));
        }
        self.summary(user_id).await
    }

    /// Empty the cart. Returns the number of lines removed.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Repository` if the delete fails.
    pub async fn clear(&self, user_id: UserId) -> Result<u64, ServiceError> {
        Ok(self.cart.clear(user_id).await?)
    }
}

fn check_quantity(quantity: u32) -> Result<(), ServiceError> {
    if (1..=MAX_LINE_QUANTITY).contains(&quantity) {
        Ok(())
    } else {
        Err(quantity_out_of_range())
    }
}

fn quantity_out_of_range() -> ServiceError {
    ServiceError::Validation(format!(
        "quantity must be between 1 and {MAX_LINE_QUANTITY}"
    ))
}
