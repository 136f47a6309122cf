use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use validator::Validate;

use crate::auth::AuthUser;
use crate::errors::ServiceError;
use crate::models::order::PaymentType;
use crate::{ApiResponse, AppState};

#[derive(Debug, Deserialize, Validate)]
pub struct CheckoutRequest {
    pub payment_type: PaymentType,
    #[validate(email(message = "A valid email is required"))]
    pub email: String,
    #[validate(length(min = 8, message = "A contact phone number is required"))]
    pub phone: String,
}

/// POST /api/v1/checkout
///
/// Online payment returns the order plus a gateway session; cash on delivery
/// places the order immediately.
pub async fn checkout(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<CheckoutRequest>,
) -> Result<Response, ServiceError> {
    req.validate()?;
    match req.payment_type {
        PaymentType::OnlinePayment => {
            let started = state.checkout.start_online(&user, &req.email, &req.phone).await?;
            Ok((StatusCode::CREATED, Json(ApiResponse::new(started))).into_response())
        }
        PaymentType::CashOnDelivery => {
            let order = state.checkout.place_cod(&user, &req.email, &req.phone).await?;
            Ok((StatusCode::CREATED, Json(ApiResponse::new(order))).into_response())
        }
    }
}

/// POST /api/v1/checkout/{order_number}/verify
pub async fn verify_payment(
    State(state): State<AppState>,
    user: AuthUser,
    Path(order_number): Path<String>,
) -> Result<Response, ServiceError> {
    let order = state.checkout.verify_payment(&user, &order_number).await?;
    Ok(Json(ApiResponse::new(order)).into_response())
}
