use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::auth::AuthUser;
use crate::errors::ServiceError;
use crate::handlers::orders::ReasonRequest;
use crate::services::returns::ReturnRequest;
use crate::{ApiResponse, AppState, ListQuery, PaginatedResponse};

#[derive(Debug, Deserialize, Validate)]
pub struct ReturnRequestBody {
    #[validate(range(min = 1, message = "Return quantity must be at least 1"))]
    pub quantity: u32,
    pub reason: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
}

/// POST /api/v1/orders/{id}/items/{product_id}/return
pub async fn request_return(
    State(state): State<AppState>,
    user: AuthUser,
    Path((id, product_id)): Path<(String, Uuid)>,
    Json(req): Json<ReturnRequestBody>,
) -> Result<Response, ServiceError> {
    req.validate()?;
    let order = state
        .returns
        .request_return(
            &user,
            &id,
            product_id,
            ReturnRequest {
                quantity: req.quantity,
                reason: req.reason,
                description: req.description,
                images: req.images,
            },
        )
        .await?;
    Ok(Json(ApiResponse::new(order)).into_response())
}

/// POST /api/v1/orders/{id}/items/{product_id}/return/approve
pub async fn approve_refund(
    State(state): State<AppState>,
    user: AuthUser,
    Path((id, product_id)): Path<(String, Uuid)>,
) -> Result<Response, ServiceError> {
    let order = state.returns.approve_refund(&user, &id, product_id).await?;
    Ok(Json(ApiResponse::new(order)).into_response())
}

/// POST /api/v1/orders/{id}/items/{product_id}/return/reject
pub async fn reject_refund(
    State(state): State<AppState>,
    user: AuthUser,
    Path((id, product_id)): Path<(String, Uuid)>,
    Json(req): Json<ReasonRequest>,
) -> Result<Response, ServiceError> {
    req.validate()?;
    let order = state
        .returns
        .reject_refund(&user, &id, product_id, &req.reason)
        .await?;
    Ok(Json(ApiResponse::new(order)).into_response())
}

/// POST /api/v1/orders/{id}/items/{product_id}/return/complete
pub async fn complete_refund(
    State(state): State<AppState>,
    user: AuthUser,
    Path((id, product_id)): Path<(String, Uuid)>,
) -> Result<Response, ServiceError> {
    let order = state.returns.complete_refund(&user, &id, product_id).await?;
    Ok(Json(ApiResponse::new(order)).into_response())
}

/// GET /api/v1/returns
pub async fn returns_inbox(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ListQuery>,
) -> Result<Response, ServiceError> {
    let page = state.orders.returns_inbox(&user, query.params()).await?;
    Ok(Json(PaginatedResponse {
        items: page.orders,
        total: page.total,
        page: query.page,
        per_page: query.per_page,
    })
    .into_response())
}

/// GET /api/v1/returns/{id}/{product_id}
pub async fn return_detail(
    State(state): State<AppState>,
    user: AuthUser,
    Path((id, product_id)): Path<(String, Uuid)>,
) -> Result<Response, ServiceError> {
    let item = state.returns.return_detail(&user, &id, product_id).await?;
    Ok(Json(ApiResponse::new(item)).into_response())
}
