//! Public menu browsing.
//!
//! Only available items are listed here; the back office sees everything via
//! `/api/admin/foods`.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;

use crave_core::FoodItemId;

use crate::error::AppError;
use crate::models::food::{FoodFilter, FoodItem};
use crate::services::CatalogService;
use crate::state::AppState;

/// Query parameters for the menu listing.
#[derive(Debug, Default, Deserialize)]
pub struct MenuQuery {
    pub category: Option<String>,
    pub search: Option<String>,
}

/// GET /api/foods
///
/// # Errors
///
/// Returns 500 if the query fails.
pub async fn index(
    State(state): State<AppState>,
    Query(query): Query<MenuQuery>,
) -> Result<Json<Vec<FoodItem>>, AppError> {
    let filter = FoodFilter {
        category: query.category,
        search: query.search,
        available_only: true,
    };
    let items = CatalogService::new(state.pool()).list(&filter).await?;
    Ok(Json(items))
}

/// GET /api/foods/{id}
///
/// # Errors
///
/// Returns 404 for unknown or unavailable items.
pub async fn show(
    State(state): State<AppState>,
    Path(id): Path<FoodItemId>,
) -> Result<Json<FoodItem>, AppError> {
    let item = CatalogService::new(state.pool()).get(id).await?;
    if !item.is_available {
        return Err(AppError::NotFound("food item".to_string()));
    }
    Ok(Json(item))
}

/// GET /api/categories
///
/// # Errors
///
/// Returns 500 if the query fails.
pub async fn categories(State(state): State<AppState>) -> Result<Json<Vec<String>>, AppError> {
    let categories = CatalogService::new(state.pool()).categories().await?;
    Ok(Json(categories))
}
