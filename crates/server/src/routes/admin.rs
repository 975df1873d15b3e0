//! Back-office route handlers.
//!
//! Every handler takes [`RequireAdmin`]; the acting administrator's ID is
//! passed down so the services can refuse self-demotion and write the audit
//! trail.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crave_core::{FoodItemId, OrderId, OrderStatus, Price, UserId, UserRole};

use crate::db::AttemptRecord;
use crate::error::AppError;
use crate::middleware::RequireAdmin;
use crate::models::User;
use crate::models::analytics::{DailySales, SalesSummary, StatusCount, TopItem};
use crate::models::audit::AuditEntry;
use crate::models::food::{FoodDraft, FoodFilter, FoodItem};
use crate::models::order::{Order, OrderDetails};
use crate::services::admin_users::UserChanges;
use crate::services::{AnalyticsService, CatalogService, OrderService};
use crate::state::AppState;

// =============================================================================
// Users
// =============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct UserQuery {
    pub search: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub role: UserRole,
    pub full_name: Option<String>,
}

/// GET /api/admin/users
///
/// # Errors
///
/// Returns 403 for non-admins.
pub async fn list_users(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Query(query): Query<UserQuery>,
) -> Result<Json<Vec<User>>, AppError> {
    let users = state
        .admin_users()
        .list(query.search.as_deref(), query.limit)
        .await?;
    Ok(Json(users))
}

/// POST /api/admin/users
///
/// The account is created already verified.
///
/// # Errors
///
/// Returns 400 for a bad email or weak password and 409 for a taken email.
pub async fn create_user(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Json(req): Json<CreateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = state
        .admin_users()
        .create(
            admin.id,
            &req.email,
            &req.password,
            req.role,
            req.full_name.as_deref(),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// GET /api/admin/users/{id}
///
/// # Errors
///
/// Returns 404 for an unknown user.
pub async fn show_user(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Path(id): Path<UserId>,
) -> Result<Json<User>, AppError> {
    Ok(Json(state.admin_users().get(id).await?))
}

/// PATCH /api/admin/users/{id}
///
/// # Errors
///
/// Returns 403 when an admin demotes or deactivates themselves.
pub async fn update_user(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<UserId>,
    Json(changes): Json<UserChanges>,
) -> Result<Json<User>, AppError> {
    let user = state.admin_users().update(admin.id, id, changes).await?;
    Ok(Json(user))
}

/// DELETE /api/admin/users/{id}
///
/// # Errors
///
/// Returns 403 for the admin's own account and 404 for an unknown user.
pub async fn delete_user(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<UserId>,
) -> Result<StatusCode, AppError> {
    state.admin_users().delete(admin.id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Lockouts
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct ClearLockoutRequest {
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct ClearedResponse {
    /// Whether there was anything to clear.
    pub cleared: bool,
}

/// GET /api/admin/lockouts
///
/// # Errors
///
/// Returns 500 if the records cannot be read.
pub async fn locked_accounts(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
) -> Result<Json<Vec<AttemptRecord>>, AppError> {
    Ok(Json(state.admin_users().locked().await?))
}

/// POST /api/admin/lockouts/clear
///
/// # Errors
///
/// Returns 400 for a malformed email.
pub async fn clear_lockout(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Json(req): Json<ClearLockoutRequest>,
) -> Result<Json<ClearedResponse>, AppError> {
    let cleared = state
        .admin_users()
        .clear_lockout(admin.id, &req.email)
        .await?;
    Ok(Json(ClearedResponse { cleared }))
}

/// DELETE /api/admin/lockouts/global
///
/// # Errors
///
/// Returns 500 if the record cannot be removed.
pub async fn clear_global_lockout(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
) -> Result<Json<ClearedResponse>, AppError> {
    let cleared = state.admin_users().clear_global_lockout(admin.id).await?;
    Ok(Json(ClearedResponse { cleared }))
}

// =============================================================================
// Menu
// =============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct FoodQuery {
    pub category: Option<String>,
    pub search: Option<String>,
    #[serde(default)]
    pub available_only: bool,
}

/// A menu item as submitted by the back office. `price` is in cents.
#[derive(Debug, Deserialize)]
pub struct FoodRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub category: String,
    pub price: i64,
    pub image_path: Option<String>,
    #[serde(default = "default_available")]
    pub is_available: bool,
}

const fn default_available() -> bool {
    true
}

impl TryFrom<FoodRequest> for FoodDraft {
    type Error = AppError;

    fn try_from(req: FoodRequest) -> Result<Self, Self::Error> {
        let price =
            Price::from_cents(req.price).map_err(|e| AppError::BadRequest(e.to_string()))?;
        Ok(Self {
            name: req.name,
            description: req.description,
            category: req.category,
            price,
            image_path: req.image_path,
            is_available: req.is_available,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct AvailabilityRequest {
    pub is_available: bool,
}

/// GET /api/admin/foods
///
/// Includes unavailable items unless `available_only=true`.
///
/// # Errors
///
/// Returns 500 if the query fails.
pub async fn list_foods(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Query(query): Query<FoodQuery>,
) -> Result<Json<Vec<FoodItem>>, AppError> {
    let filter = FoodFilter {
        category: query.category,
        search: query.search,
        available_only: query.available_only,
    };
    Ok(Json(CatalogService::new(state.pool()).list(&filter).await?))
}

/// GET /api/admin/foods/{id}
///
/// # Errors
///
/// Returns 404 for an unknown item.
pub async fn show_food(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Path(id): Path<FoodItemId>,
) -> Result<Json<FoodItem>, AppError> {
    Ok(Json(CatalogService::new(state.pool()).get(id).await?))
}

/// POST /api/admin/foods
///
/// # Errors
///
/// Returns 400 for a blank name or category, over-long fields or a negative price.
pub async fn create_food(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Json(req): Json<FoodRequest>,
) -> Result<impl IntoResponse, AppError> {
    let item = CatalogService::new(state.pool())
        .create(admin.id, req.try_into()?)
        .await?;
    Ok((StatusCode::CREATED, Json(item)))
}

/// PUT /api/admin/foods/{id}
///
/// # Errors
///
/// Returns 404 for an unknown item and 400 for invalid values.
pub async fn update_food(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<FoodItemId>,
    Json(req): Json<FoodRequest>,
) -> Result<Json<FoodItem>, AppError> {
    let item = CatalogService::new(state.pool())
        .update(admin.id, id, req.try_into()?)
        .await?;
    Ok(Json(item))
}

/// POST /api/admin/foods/{id}/availability
///
/// # Errors
///
/// Returns 404 for an unknown item.
pub async fn set_food_availability(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<FoodItemId>,
    Json(req): Json<AvailabilityRequest>,
) -> Result<Json<FoodItem>, AppError> {
    let item = CatalogService::new(state.pool())
        .set_available(admin.id, id, req.is_available)
        .await?;
    Ok(Json(item))
}

/// DELETE /api/admin/foods/{id}
///
/// Past orders keep their item snapshots.
///
/// # Errors
///
/// Returns 404 for an unknown item.
pub async fn delete_food(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<FoodItemId>,
) -> Result<StatusCode, AppError> {
    CatalogService::new(state.pool()).delete(admin.id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Orders
// =============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct OrderQuery {
    pub status: Option<OrderStatus>,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: OrderStatus,
}

/// GET /api/admin/orders
///
/// # Errors
///
/// Returns 500 if the query fails.
pub async fn list_orders(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Query(query): Query<OrderQuery>,
) -> Result<Json<Vec<Order>>, AppError> {
    let orders = OrderService::new(state.pool(), state.email())
        .list(query.status, query.limit)
        .await?;
    Ok(Json(orders))
}

/// GET /api/admin/orders/{id}
///
/// # Errors
///
/// Returns 404 for an unknown order.
pub async fn show_order(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<OrderId>,
) -> Result<Json<OrderDetails>, AppError> {
    let details = OrderService::new(state.pool(), state.email())
        .get(admin.id, admin.role, id)
        .await?;
    Ok(Json(details))
}

/// POST /api/admin/orders/{id}/status
///
/// # Errors
///
/// Returns 409 for a transition the lifecycle does not allow.
pub async fn update_order_status(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<OrderId>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<OrderDetails>, AppError> {
    let details = OrderService::new(state.pool(), state.email())
        .update_status(admin.id, id, req.status)
        .await?;
    Ok(Json(details))
}

// =============================================================================
// Audit log & sessions
// =============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct AuditQuery {
    pub user_id: Option<UserId>,
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct ActiveSessions {
    pub active: usize,
}

/// GET /api/admin/audit
///
/// # Errors
///
/// Returns 500 if the query fails.
pub async fn audit_log(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Query(query): Query<AuditQuery>,
) -> Result<Json<Vec<AuditEntry>>, AppError> {
    let entries = state
        .admin_users()
        .audit_log(query.user_id, query.limit)
        .await?;
    Ok(Json(entries))
}

/// GET /api/admin/sessions
pub async fn active_sessions(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
) -> Json<ActiveSessions> {
    Json(ActiveSessions {
        active: state.sessions().active_count().await,
    })
}

// =============================================================================
// Analytics
// =============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct RangeQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct DaysQuery {
    #[serde(default = "default_days")]
    pub days: u32,
}

const fn default_days() -> u32 {
    30
}

/// GET /api/admin/analytics/summary
///
/// # Errors
///
/// Returns 400 if `from` is not before `to`.
pub async fn sales_summary(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Query(range): Query<RangeQuery>,
) -> Result<Json<SalesSummary>, AppError> {
    let summary = AnalyticsService::new(state.pool())
        .sales_summary(range.from, range.to)
        .await?;
    Ok(Json(summary))
}

/// GET /api/admin/analytics/top-items
///
/// # Errors
///
/// Returns 500 if the query fails.
pub async fn top_items(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<TopItem>>, AppError> {
    let items = AnalyticsService::new(state.pool())
        .top_items(query.limit)
        .await?;
    Ok(Json(items))
}

/// GET /api/admin/analytics/daily
///
/// # Errors
///
/// Returns 500 if the query fails.
pub async fn daily_sales(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Query(query): Query<DaysQuery>,
) -> Result<Json<Vec<DailySales>>, AppError> {
    let days = AnalyticsService::new(state.pool())
        .daily_sales(query.days)
        .await?;
    Ok(Json(days))
}

/// GET /api/admin/analytics/status
///
/// # Errors
///
/// Returns 500 if the query fails.
pub async fn status_breakdown(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
) -> Result<Json<Vec<StatusCount>>, AppError> {
    let counts = AnalyticsService::new(state.pool())
        .status_breakdown()
        .await?;
    Ok(Json(counts))
}
