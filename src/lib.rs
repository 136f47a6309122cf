pub mod auth;
pub mod catalog;
pub mod config;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod models;
pub mod repositories;
pub mod services;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use auth::AuthService;
use catalog::{Catalog, CustomerDirectory};
use events::EventSender;
use models::order::OrderStatus;
use repositories::OrderStore;
use services::approvals::ApprovalService;
use services::cart::CartService;
use services::fulfillment::FulfillmentService;
use services::orders::{ListParams, OrderService};
use services::payments::{CheckoutService, PaymentGateway};
use services::returns::ReturnService;

/// Success envelope wrapping every 2xx payload.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

fn default_page() -> u64 {
    1
}

fn default_per_page() -> u64 {
    20
}

/// Common listing query string: `?page=&per_page=&status=`.
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_per_page")]
    pub per_page: u64,
    pub status: Option<OrderStatus>,
}

impl ListQuery {
    pub fn params(&self) -> ListParams {
        ListParams {
            page: self.page.max(1),
            per_page: self.per_page.clamp(1, 100),
            status: self.status,
        }
    }
}

/// Shared handler state: one instance of each service plus the token
/// verifier.
#[derive(Clone)]
pub struct AppState {
    pub orders: Arc<OrderService>,
    pub approvals: Arc<ApprovalService>,
    pub fulfillment: Arc<FulfillmentService>,
    pub returns: Arc<ReturnService>,
    pub checkout: Arc<CheckoutService>,
    pub auth: Arc<AuthService>,
}

impl AppState {
    pub fn new(
        auth: Arc<AuthService>,
        store: Arc<dyn OrderStore>,
        catalog: Arc<dyn Catalog>,
        directory: Arc<dyn CustomerDirectory>,
        gateway: Arc<dyn PaymentGateway>,
        events: EventSender,
    ) -> Self {
        let cart = CartService::new(catalog, directory.clone());
        Self {
            orders: Arc::new(OrderService::new(store.clone(), events.clone())),
            approvals: Arc::new(ApprovalService::new(store.clone(), events.clone())),
            fulfillment: Arc::new(FulfillmentService::new(store.clone(), events.clone())),
            returns: Arc::new(ReturnService::new(store.clone(), events.clone())),
            checkout: Arc::new(CheckoutService::new(store, cart, directory, gateway, events)),
            auth,
        }
    }
}

/// Builds the full application router. Everything under `/api/v1` requires a
/// bearer token; `/health` does not.
pub fn app_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/checkout", post(handlers::payments::checkout))
        .route(
            "/checkout/{order_number}/verify",
            post(handlers::payments::verify_payment),
        )
        .route("/orders", get(handlers::orders::list_orders))
        .route("/orders/requests", get(handlers::orders::approval_inbox))
        .route("/orders/super", get(handlers::orders::super_orders))
        .route("/orders/{id}", get(handlers::orders::get_order))
        .route("/orders/{id}/include", put(handlers::orders::set_include))
        .route(
            "/orders/{id}/items/{product_id}/approve",
            post(handlers::orders::approve_item),
        )
        .route(
            "/orders/{id}/items/{product_id}/reject",
            post(handlers::orders::reject_item),
        )
        .route(
            "/orders/{id}/items/{product_id}/status",
            put(handlers::orders::advance_item),
        )
        .route(
            "/orders/{id}/items/{product_id}/tracking",
            put(handlers::orders::set_tracking),
        )
        .route(
            "/orders/{id}/items/{product_id}/return",
            post(handlers::returns::request_return),
        )
        .route(
            "/orders/{id}/items/{product_id}/return/approve",
            post(handlers::returns::approve_refund),
        )
        .route(
            "/orders/{id}/items/{product_id}/return/reject",
            post(handlers::returns::reject_refund),
        )
        .route(
            "/orders/{id}/items/{product_id}/return/complete",
            post(handlers::returns::complete_refund),
        )
        .route("/returns", get(handlers::returns::returns_inbox))
        .route(
            "/returns/{id}/{product_id}",
            get(handlers::returns::return_detail),
        )
        .layer(middleware::from_fn_with_state(
            state.auth.clone(),
            auth::require_auth,
        ));

    Router::new()
        .route("/health", get(handlers::health))
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
