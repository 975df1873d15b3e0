//! Checkout and the order lifecycle.
//!
//! Checkout snapshots the cart into `order_item` rows inside one transaction:
//! the order header, every line, clearing the cart and the audit entry either
//! all land or none do. The confirmation email is queued after commit.

use chrono::Utc;
use sqlx::SqlitePool;

use crave_core::{OrderId, OrderStatus, Price, UserId, UserRole};

use super::error::{ServiceError, clean_text};
use crate::db::orders::{NewOrder, NewOrderItem};
use crate::db::{AuditRepository, CartRepository, OrderRepository, UserRepository};
use crate::models::audit::actions;
use crate::models::cart::CartLine;
use crate::models::order::{Order, OrderDetails};
use crate::services::email::EmailService;

const MAX_ADDRESS_LENGTH: usize = 500;
const MAX_NOTES_LENGTH: usize = 500;

/// Order service.
pub struct OrderService<'a> {
    pool: &'a SqlitePool,
    orders: OrderRepository<'a>,
    users: UserRepository<'a>,
    audit: AuditRepository<'a>,
    email: &'a EmailService,
}

impl<'a> OrderService<'a> {
    #[must_use]
    pub const fn new(pool: &'a SqlitePool, email: &'a EmailService) -> Self {
        Self {
            pool,
            orders: OrderRepository::new(pool),
            users: UserRepository::new(pool),
            audit: AuditRepository::new(pool),
            email,
        }
    }

    /// Turn the user's cart into a pending order.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::EmptyCart` when there is nothing to order,
    /// `ServiceError::ItemUnavailable` if any line was taken off the menu and
    /// `ServiceError::Validation` for a blank address or a total that does not
    /// fit in a `Price`.
    pub async fn checkout(
        &self,
        user_id: UserId,
        delivery_address: &str,
        notes: Option<&str>,
    ) -> Result<OrderDetails, ServiceError> {
        let delivery_address =
            clean_text("delivery address", delivery_address, MAX_ADDRESS_LENGTH, true)?
                .unwrap_or_default();
        let notes = match notes {
            Some(notes) => clean_text("notes", notes, MAX_NOTES_LENGTH, false)?,
            None => None,
        };

        let mut tx = self.pool.begin().await?;

        let lines = CartRepository::lines_in(&mut tx, user_id).await?;
        if lines.is_empty() {
            return Err(ServiceError::EmptyCart);
        }
        if let Some(line) = lines.iter().find(|l| !l.is_available) {
            return Err(ServiceError::ItemUnavailable(line.name.clone()));
        }

        let total = order_total(&lines)?;
        let order = OrderRepository::insert_in(
            &mut tx,
            &NewOrder {
                user_id,
                total,
                delivery_address: &delivery_address,
                notes: notes.as_deref(),
                created_at: Utc::now(),
            },
        )
        .await?;

        let mut items = Vec::with_capacity(lines.len());
        for line in &lines {
            let item = OrderRepository::insert_item_in(
                &mut tx,
                order.id,
                &NewOrderItem {
                    food_item_id: line.food_item_id,
                    item_name: &line.name,
                    unit_price: line.unit_price,
                    quantity: line.quantity,
                },
            )
            .await?;
            items.push(item);
        }

        CartRepository::clear_in(&mut tx, user_id).await?;
        AuditRepository::record_in(
            &mut tx,
            Some(user_id),
            actions::ORDER_PLACED,
            &format!("order_id={} total={}", order.id, order.total),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(
            order_id = %order.id,
            user_id = %user_id,
            total = %order.total,
            items = items.len(),
            "Order placed"
        );

        let details = OrderDetails { order, items };
        self.send_confirmation(&details).await;
        Ok(details)
    }

    async fn send_confirmation(&self, details: &OrderDetails) {
        let user = match self.users.get_by_id(details.order.user_id).await {
            Ok(Some(user)) => user,
            Ok(None) => return,
            Err(e) => {
                tracing::error!(order_id = %details.order.id, error = %e, "Failed to load customer for confirmation");
                return;
            }
        };
        if let Err(e) = self
            .email
            .send_order_confirmation(&user.email, user.display_name(), details)
        {
            tracing::error!(order_id = %details.order.id, error = %e, "Failed to send order confirmation");
        }
    }

    /// The user's orders, newest first.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Repository` if the query fails.
    pub async fn history(&self, user_id: UserId) -> Result<Vec<Order>, ServiceError> {
        Ok(self.orders.list_for_user(user_id).await?)
    }

    /// One order with its items. Customers only see their own orders.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::NotFound` if the order doesn't exist or belongs
    /// to someone else.
    pub async fn get(
        &self,
        viewer: UserId,
        role: UserRole,
        id: OrderId,
    ) -> Result<OrderDetails, ServiceError> {
        let order = self.visible_order(viewer, role, id).await?;
        let items = self.orders.items(order.id).await?;
        Ok(OrderDetails { order, items })
    }

    /// Cancel one of the user's own pending orders.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::InvalidTransition` once the order left `Pending`.
    pub async fn cancel(&self, user_id: UserId, id: OrderId) -> Result<OrderDetails, ServiceError> {
        let order = self.visible_order(user_id, UserRole::Customer, id).await?;
        self.move_to(&order, OrderStatus::Cancelled).await?;

        self.audit
            .record(
                Some(user_id),
                actions::ORDER_CANCELLED,
                &format!("order_id={id}"),
            )
            .await?;
        tracing::info!(order_id = %id, user_id = %user_id, "Order cancelled by customer");

        self.get(user_id, UserRole::Customer, id).await
    }

    /// All orders, newest first, optionally by status.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Repository` if the query fails.
    pub async fn list(
        &self,
        status: Option<OrderStatus>,
        limit: Option<u32>,
    ) -> Result<Vec<Order>, ServiceError> {
        Ok(self.orders.list(status, limit).await?)
    }

    /// Move an order along its lifecycle on behalf of an administrator.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::NotFound` or `ServiceError::InvalidTransition`.
    pub async fn update_status(
        &self,
        admin: UserId,
        id: OrderId,
        to: OrderStatus,
    ) -> Result<OrderDetails, ServiceError> {
        let order = self
            .orders
            .get(id)
            .await?
            .ok_or(ServiceError::NotFound("order"))?;
        self.move_to(&order, to).await?;

        self.audit
            .record(
                Some(admin),
                actions::ORDER_STATUS_CHANGED,
                &format!("order_id={id} from={} to={to}", order.status),
            )
            .await?;
        tracing::info!(order_id = %id, from = %order.status, to = %to, "Order status changed");

        self.get(admin, UserRole::Admin, id).await
    }

    async fn visible_order(
        &self,
        viewer: UserId,
        role: UserRole,
        id: OrderId,
    ) -> Result<Order, ServiceError> {
        self.orders
            .get(id)
            .await?
            .filter(|order| role.is_admin() || order.user_id == viewer)
            .ok_or(ServiceError::NotFound("order"))
    }

    async fn move_to(&self, order: &Order, to: OrderStatus) -> Result<(), ServiceError> {
        if !order.status.can_transition_to(to) {
            return Err(ServiceError::InvalidTransition {
                from: order.status,
                to,
            });
        }
        if !self.orders.transition(order.id, order.status, to).await? {
            // Lost a race with another update; report the state that won.
            let current = self
                .orders
                .get(order.id)
                .await?
                .map_or(order.status, |o| o.status);
            return Err(ServiceError::InvalidTransition { from: current, to });
        }
        Ok(())
    }
}

/// Sum of the line subtotals, refusing totals that overflow.
fn order_total(lines: &[CartLine]) -> Result<Price, ServiceError> {
    lines
        .iter()
        .try_fold(Price::ZERO, |total, line| {
            line.unit_price
                .checked_times(line.quantity)
                .and_then(|subtotal| total.checked_add(subtotal))
        })
        .ok_or_else(|| ServiceError::Validation("order total is too large".to_string()))
}
