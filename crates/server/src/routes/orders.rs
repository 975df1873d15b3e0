//! Customer order route handlers.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;

use crave_core::OrderId;

use crate::error::AppError;
use crate::middleware::RequireAuth;
use crate::models::order::{Order, OrderDetails};
use crate::services::{OrderService, ProfileService};
use crate::state::AppState;

/// Checkout form.
///
/// Without a `delivery_address` (or with a blank one) the address saved on the
/// profile is used.
#[derive(Debug, Default, Deserialize)]
pub struct CheckoutRequest {
    pub delivery_address: Option<String>,
    pub notes: Option<String>,
}

/// POST /api/orders/checkout
///
/// # Errors
///
/// Returns 409 for an empty cart or an unavailable item and 400 when no
/// delivery address is given or saved.
pub async fn checkout(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Json(req): Json<CheckoutRequest>,
) -> Result<impl IntoResponse, AppError> {
    let address = match req.delivery_address.filter(|a| !a.trim().is_empty()) {
        Some(address) => address,
        None => ProfileService::new(state.pool())
            .get_profile(user.id)
            .await?
            .address
            .unwrap_or_default(),
    };

    let details = OrderService::new(state.pool(), state.email())
        .checkout(user.id, &address, req.notes.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(details)))
}

/// GET /api/orders
///
/// # Errors
///
/// Returns 500 if the query fails.
pub async fn index(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<Vec<Order>>, AppError> {
    let orders = OrderService::new(state.pool(), state.email())
        .history(user.id)
        .await?;
    Ok(Json(orders))
}

/// GET /api/orders/{id}
///
/// # Errors
///
/// Returns 404 for unknown orders and for other customers' orders.
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<OrderId>,
) -> Result<Json<OrderDetails>, AppError> {
    let details = OrderService::new(state.pool(), state.email())
        .get(user.id, user.role, id)
        .await?;
    Ok(Json(details))
}

/// POST /api/orders/{id}/cancel
///
/// # Errors
///
/// Returns 409 once the order is no longer pending.
pub async fn cancel(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<OrderId>,
) -> Result<Json<OrderDetails>, AppError> {
    let details = OrderService::new(state.pool(), state.email())
        .cancel(user.id, id)
        .await?;
    Ok(Json(details))
}
