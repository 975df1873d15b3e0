//! Menu item domain types.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crave_core::{FoodItemId, Price};

/// A catalog entry.
#[derive(Debug, Clone, Serialize)]
pub struct FoodItem {
    pub id: FoodItemId,
    pub name: String,
    pub description: String,
    pub category: String,
    pub price: Price,
    pub image_path: Option<String>,
    pub is_available: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Values for creating or replacing a menu item.
#[derive(Debug, Clone)]
pub struct FoodDraft {
    pub name: String,
    pub description: String,
    pub category: String,
    pub price: Price,
    pub image_path: Option<String>,
    pub is_available: bool,
}

/// Catalog listing filter.
#[derive(Debug, Clone, Default)]
pub struct FoodFilter {
    pub category: Option<String>,
    pub search: Option<String>,
    pub available_only: bool,
}
