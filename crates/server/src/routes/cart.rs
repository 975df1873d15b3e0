//! Cart route handlers.
//!
//! Every mutation answers with the updated [`CartSummary`] so the client can
//! redraw the cart and badge from one response.

use axum::{
    Json,
    extract::{Path, State},
};
use serde::{Deserialize, Serialize};

use crave_core::FoodItemId;

use crate::error::AppError;
use crate::middleware::RequireAuth;
use crate::models::cart::CartSummary;
use crate::services::CartService;
use crate::state::AppState;

/// Form data for adding to cart.
#[derive(Debug, Deserialize)]
pub struct AddToCartRequest {
    pub food_item_id: FoodItemId,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

const fn default_quantity() -> u32 {
    1
}

/// Form data for updating a line.
#[derive(Debug, Deserialize)]
pub struct UpdateCartRequest {
    pub quantity: u32,
}

#[derive(Debug, Serialize)]
pub struct ClearCartResponse {
    pub removed: u64,
}

/// GET /api/cart
///
/// # Errors
///
/// Returns 401 when signed out.
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<CartSummary>, AppError> {
    Ok(Json(CartService::new(state.pool()).summary(user.id).await?))
}

/// POST /api/cart
///
/// # Errors
///
/// Returns 404 for an unknown item, 409 for an unavailable one and 400 for a
/// quantity outside `1..=99`.
pub async fn add(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Json(req): Json<AddToCartRequest>,
) -> Result<Json<CartSummary>, AppError> {
    let summary = CartService::new(state.pool())
        .add(user.id, req.food_item_id, req.quantity)
        .await?;
    tracing::debug!(user_id = %user.id, food_item_id = %req.food_item_id, quantity = req.quantity, "Added to cart");
    Ok(Json(summary))
}

/// PATCH /api/cart/{food_id}
///
/// # Errors
///
/// Returns 404 if the item is not in the cart.
pub async fn update(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(food_id): Path<FoodItemId>,
    Json(req): Json<UpdateCartRequest>,
) -> Result<Json<CartSummary>, AppError> {
    let summary = CartService::new(state.pool())
        .update_quantity(user.id, food_id, req.quantity)
        .await?;
    Ok(Json(summary))
}

/// DELETE /api/cart/{food_id}
///
/// # Errors
///
/// Returns 404 if the item is not in the cart.
pub async fn remove(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(food_id): Path<FoodItemId>,
) -> Result<Json<CartSummary>, AppError> {
    let summary = CartService::new(state.pool())
        .remove(user.id, food_id)
        .await?;
    Ok(Json(summary))
}

/// DELETE /api/cart
///
/// # Errors
///
/// Returns 500 if the delete fails.
pub async fn clear(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<ClearCartResponse>, AppError> {
    let removed = CartService::new(state.pool()).clear(user.id).await?;
    Ok(Json(ClearCartResponse { removed }))
}
