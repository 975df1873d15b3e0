//! Order repository.
//!
//! Orders are written once at checkout (inside the caller's transaction) and
//! afterwards only their status changes. The aggregate queries used by the
//! analytics service live here as well.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};

use crave_core::{FoodItemId, OrderId, OrderItemId, OrderStatus, Price, UserId};

use super::{RepositoryError, page_limit, to_price, to_u32};
use crate::models::order::{Order, OrderItem};

const ORDER_COLUMNS: &str =
    "id, user_id, status, total_cents, delivery_address, notes, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: OrderId,
    user_id: UserId,
    status: OrderStatus,
    total_cents: i64,
    delivery_address: String,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = RepositoryError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            status: row.status,
            total: to_price(row.total_cents, "total_cents")?,
            delivery_address: row.delivery_address,
            notes: row.notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct OrderItemRow {
    id: OrderItemId,
    order_id: OrderId,
    food_item_id: Option<FoodItemId>,
    item_name: String,
    unit_price_cents: i64,
    quantity: i64,
}

impl TryFrom<OrderItemRow> for OrderItem {
    type Error = RepositoryError;

    fn try_from(row: OrderItemRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            order_id: row.order_id,
            food_item_id: row.food_item_id,
            item_name: row.item_name,
            unit_price: to_price(row.unit_price_cents, "unit_price_cents")?,
            quantity: to_u32(row.quantity, "quantity")?,
        })
    }
}

/// Header fields for a new order.
#[derive(Debug, Clone)]
pub struct NewOrder<'n> {
    pub user_id: UserId,
    pub total: Price,
    pub delivery_address: &'n str,
    pub notes: Option<&'n str>,
    pub created_at: DateTime<Utc>,
}

/// One line to snapshot into `order_item`.
#[derive(Debug, Clone)]
pub struct NewOrderItem<'n> {
    pub food_item_id: FoodItemId,
    pub item_name: &'n str,
    pub unit_price: Price,
    pub quantity: u32,
}

/// Completed-order totals over a period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletedTotals {
    pub order_count: u64,
    pub revenue_cents: i64,
}

/// Per-item sales over completed orders.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct ItemSalesRow {
    pub item_name: String,
    pub quantity: i64,
    pub revenue_cents: i64,
}

/// Repository for orders and their items.
pub struct OrderRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> OrderRepository<'a> {
    /// Create a new order repository.
    #[must_use]
    pub const fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert an order header in `Pending` status.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    pub async fn insert_in(
        conn: &mut SqliteConnection,
        order: &NewOrder<'_>,
    ) -> Result<Order, RepositoryError> {
        let row: OrderRow = sqlx::query_as(&format!(
            "INSERT INTO customer_order (user_id, status, total_cents, delivery_address, notes, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?) RETURNING {ORDER_COLUMNS}"
        ))
        .bind(order.user_id)
        .bind(OrderStatus::Pending)
        .bind(order.total.cents())
        .bind(order.delivery_address)
        .bind(order.notes)
        .bind(order.created_at)
        .bind(order.created_at)
        .fetch_one(conn)
        .await?;

        row.try_into()
    }

    /// Insert one order line.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    pub async fn insert_item_in(
        conn: &mut SqliteConnection,
        order_id: OrderId,
        item: &NewOrderItem<'_>,
    ) -> Result<OrderItem, RepositoryError> {
        let row: OrderItemRow = sqlx::query_as(
            "INSERT INTO order_item (order_id, food_item_id, item_name, unit_price_cents, quantity) \
             VALUES (?, ?, ?, ?, ?) \
             RETURNING id, order_id, food_item_id, item_name, unit_price_cents, quantity",
        )
        .bind(order_id)
        .bind(item.food_item_id)
        .bind(item.item_name)
        .bind(item.unit_price.cents())
        .bind(i64::from(item.quantity))
        .fetch_one(conn)
        .await?;

        row.try_into()
    }

    /// Get an order header by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let row: Option<OrderRow> = sqlx::query_as(&format!(
            "SELECT {ORDER_COLUMNS} FROM customer_order WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        row.map(Order::try_from).transpose()
    }

    /// Lines of an order in insertion order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn items(&self, order_id: OrderId) -> Result<Vec<OrderItem>, RepositoryError> {
        let rows: Vec<OrderItemRow> = sqlx::query_as(
            "SELECT id, order_id, food_item_id, item_name, unit_price_cents, quantity \
             FROM order_item WHERE order_id = ? ORDER BY id",
        )
        .bind(order_id)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(OrderItem::try_from).collect()
    }

    /// A user's orders, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Order>, RepositoryError> {
        let rows: Vec<OrderRow> = sqlx::query_as(&format!(
            "SELECT {ORDER_COLUMNS} FROM customer_order WHERE user_id = ? ORDER BY created_at DESC, id DESC"
        ))
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(Order::try_from).collect()
    }

    /// All orders, newest first, optionally restricted to one status.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(
        &self,
        status: Option<OrderStatus>,
        limit: Option<u32>,
    ) -> Result<Vec<Order>, RepositoryError> {
        let rows: Vec<OrderRow> = sqlx::query_as(&format!(
            "SELECT {ORDER_COLUMNS} FROM customer_order WHERE (?1 IS NULL OR status = ?1) \
             ORDER BY created_at DESC, id DESC LIMIT ?2"
        ))
        .bind(status)
        .bind(page_limit(limit, 100, 1000))
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(Order::try_from).collect()
    }

    /// Move an order from `from` to `to`, only if it is still in `from`.
    ///
    /// Returns `false` when the order's status had already changed.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the update fails.
    pub async fn transition(
        &self,
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE customer_order SET status = ?, updated_at = ? WHERE id = ? AND status = ?",
        )
        .bind(to)
        .bind(Utc::now())
        .bind(id)
        .bind(from)
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Count and revenue of completed orders created in `[from, to)`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn completed_totals(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<CompletedTotals, RepositoryError> {
        let (count, revenue): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COALESCE(SUM(total_cents), 0) FROM customer_order \
             WHERE status = 'completed' \
               AND (?1 IS NULL OR created_at >= ?1) \
               AND (?2 IS NULL OR created_at < ?2)",
        )
        .bind(from)
        .bind(to)
        .fetch_one(self.pool)
        .await?;

        Ok(CompletedTotals {
            order_count: u64::try_from(count).map_err(|_| {
                RepositoryError::DataCorruption(format!("negative order count: {count}"))
            })?,
            revenue_cents: revenue,
        })
    }

    /// Best-selling items over completed orders, by quantity then revenue.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn top_items(&self, limit: Option<u32>) -> Result<Vec<ItemSalesRow>, RepositoryError> {
        let rows = sqlx::query_as(
            "SELECT oi.item_name AS item_name, \
                    SUM(oi.quantity) AS quantity, \
                    SUM(oi.quantity * oi.unit_price_cents) AS revenue_cents \
             FROM order_item oi JOIN customer_order o ON o.id = oi.order_id \
             WHERE o.status = 'completed' \
             GROUP BY oi.item_name \
             ORDER BY quantity DESC, revenue_cents DESC, item_name \
             LIMIT ?",
        )
        .bind(page_limit(limit, 5, 100))
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    /// `(created_at, total_cents)` of every completed order since `since`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn completed_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<(DateTime<Utc>, i64)>, RepositoryError> {
        let rows = sqlx::query_as(
            "SELECT created_at, total_cents FROM customer_order \
             WHERE status = 'completed' AND created_at >= ? ORDER BY created_at",
        )
        .bind(since)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    /// Number of orders per stored status.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn status_counts(&self) -> Result<Vec<(OrderStatus, i64)>, RepositoryError> {
        let rows = sqlx::query_as("SELECT status, COUNT(*) FROM customer_order GROUP BY status")
            .fetch_all(self.pool)
            .await?;
        Ok(rows)
    }
}
