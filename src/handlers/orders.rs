use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::auth::{AuthUser, Role};
use crate::errors::ServiceError;
use crate::models::order::{LineItemStatus, Order};
use crate::services::orders::OrderPage;
use crate::{ApiResponse, AppState, ListQuery, PaginatedResponse};

fn page_response(page: OrderPage, query: &ListQuery) -> Json<PaginatedResponse<Order>> {
    Json(PaginatedResponse {
        items: page.orders,
        total: page.total,
        page: query.page,
        per_page: query.per_page,
    })
}

/// GET /api/v1/orders
///
/// Role-aware history: buyers see their own orders, shop users orders holding
/// their approved items, admins everything non-provisional.
pub async fn list_orders(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ListQuery>,
) -> Result<Response, ServiceError> {
    let params = query.params();
    let page = match user.role {
        Role::Customer | Role::SuperCustomer => state.orders.list_for_buyer(&user, params).await?,
        Role::ShopUser => state.orders.list_for_shop(&user, params).await?,
        Role::Admin => state.orders.list_all(&user, params).await?,
    };
    Ok(page_response(page, &query).into_response())
}

/// GET /api/v1/orders/requests
pub async fn approval_inbox(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ListQuery>,
) -> Result<Response, ServiceError> {
    let page = state.orders.approval_inbox(&user, query.params()).await?;
    Ok(page_response(page, &query).into_response())
}

/// GET /api/v1/orders/super
pub async fn super_orders(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ListQuery>,
) -> Result<Response, ServiceError> {
    let page = state.orders.super_orders(&user, query.params()).await?;
    Ok(page_response(page, &query).into_response())
}

/// GET /api/v1/orders/{id}
pub async fn get_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Response, ServiceError> {
    let order = state.orders.get_order(&user, &id).await?;
    Ok(Json(ApiResponse::new(order)).into_response())
}

#[derive(Debug, Deserialize)]
pub struct IncludeRequest {
    pub include: bool,
}

/// PUT /api/v1/orders/{id}/include
pub async fn set_include(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(req): Json<IncludeRequest>,
) -> Result<Response, ServiceError> {
    let order = state.orders.set_include(&user, &id, req.include).await?;
    Ok(Json(ApiResponse::new(order)).into_response())
}

/// POST /api/v1/orders/{id}/items/{product_id}/approve
pub async fn approve_item(
    State(state): State<AppState>,
    user: AuthUser,
    Path((id, product_id)): Path<(String, Uuid)>,
) -> Result<Response, ServiceError> {
    let order = state.approvals.approve(&user, &id, product_id).await?;
    Ok(Json(ApiResponse::new(order)).into_response())
}

#[derive(Debug, Deserialize, Validate)]
pub struct ReasonRequest {
    #[validate(length(min = 1, message = "A reason is required"))]
    pub reason: String,
}

/// POST /api/v1/orders/{id}/items/{product_id}/reject
pub async fn reject_item(
    State(state): State<AppState>,
    user: AuthUser,
    Path((id, product_id)): Path<(String, Uuid)>,
    Json(req): Json<ReasonRequest>,
) -> Result<Response, ServiceError> {
    req.validate()?;
    let order = state.approvals.reject(&user, &id, product_id, &req.reason).await?;
    Ok(Json(ApiResponse::new(order)).into_response())
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: LineItemStatus,
}

/// PUT /api/v1/orders/{id}/items/{product_id}/status
pub async fn advance_item(
    State(state): State<AppState>,
    user: AuthUser,
    Path((id, product_id)): Path<(String, Uuid)>,
    Json(req): Json<StatusRequest>,
) -> Result<Response, ServiceError> {
    let order = state
        .fulfillment
        .advance(&user, &id, product_id, req.status)
        .await?;
    Ok(Json(ApiResponse::new(order)).into_response())
}

#[derive(Debug, Deserialize, Validate)]
pub struct TrackingRequest {
    #[validate(length(min = 1, message = "A tracking link is required"))]
    pub link: String,
}

/// PUT /api/v1/orders/{id}/items/{product_id}/tracking
pub async fn set_tracking(
    State(state): State<AppState>,
    user: AuthUser,
    Path((id, product_id)): Path<(String, Uuid)>,
    Json(req): Json<TrackingRequest>,
) -> Result<Response, ServiceError> {
    req.validate()?;
    let order = state
        .fulfillment
        .set_tracking(&user, &id, product_id, &req.link)
        .await?;
    Ok(Json(ApiResponse::new(order)).into_response())
}
