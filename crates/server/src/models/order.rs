//! Order domain types.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crave_core::{FoodItemId, OrderId, OrderItemId, OrderStatus, Price, UserId};

/// An order header.
#[derive(Debug, Clone, Serialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub status: OrderStatus,
    pub total: Price,
    pub delivery_address: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A line of an order, frozen at checkout time.
#[derive(Debug, Clone, Serialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    /// `None` once the menu item has been deleted.
    pub food_item_id: Option<FoodItemId>,
    pub item_name: String,
    pub unit_price: Price,
    pub quantity: u32,
}

impl OrderItem {
    #[must_use]
    pub fn subtotal(&self) -> Price {
        self.unit_price.times(self.quantity)
    }
}

/// An order together with its items.
#[derive(Debug, Clone, Serialize)]
pub struct OrderDetails {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}
