use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use rust_decimal::Decimal;
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

use bazaar_api::auth::{AuthService, Role};
use bazaar_api::catalog::{
    CartLine, InMemoryCatalog, InMemoryCustomerDirectory, Product, StockStatus,
};
use bazaar_api::events::event_channel;
use bazaar_api::models::order::{DeliveryAddress, Order, ShopRef};
use bazaar_api::repositories::{InMemoryOrderStore, OrderStore};
use bazaar_api::services::payments::StaticPaymentGateway;
use bazaar_api::{app_router, AppState};

const TEST_SECRET: &str = "integration-test-secret";

/// Full application wired against in-memory backends, driven through the
/// router with `oneshot`.
pub struct TestApp {
    pub router: Router,
    pub auth: Arc<AuthService>,
    pub store: Arc<InMemoryOrderStore>,
    pub catalog: Arc<InMemoryCatalog>,
    pub directory: Arc<InMemoryCustomerDirectory>,
    pub gateway: Arc<StaticPaymentGateway>,
}

impl TestApp {
    pub fn new() -> Self {
        let auth = Arc::new(AuthService::new(TEST_SECRET, 3600));
        let store = Arc::new(InMemoryOrderStore::new());
        let catalog = Arc::new(InMemoryCatalog::new());
        let directory = Arc::new(InMemoryCustomerDirectory::new());
        let gateway = Arc::new(StaticPaymentGateway::new());

        let (events, mut rx) = event_channel(256);
        tokio::spawn(async move { while rx.recv().await.is_some() {} });

        let state = AppState::new(
            auth.clone(),
            store.clone(),
            catalog.clone(),
            directory.clone(),
            gateway.clone(),
            events,
        );

        Self {
            router: app_router(state),
            auth,
            store,
            catalog,
            directory,
            gateway,
        }
    }

    pub fn token(&self, user_id: Uuid, role: Role, shop_id: Option<Uuid>) -> String {
        self.auth.issue(user_id, "Test User", role, shop_id).unwrap()
    }

    pub async fn request(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    pub async fn get(&self, path: &str, token: &str) -> (StatusCode, Value) {
        self.request(Method::GET, path, Some(token), None).await
    }

    pub async fn post(&self, path: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.request(Method::POST, path, Some(token), Some(body)).await
    }

    pub async fn put(&self, path: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.request(Method::PUT, path, Some(token), Some(body)).await
    }

    /// Seeds one in-stock product and returns its id.
    pub fn seed_product(&self, shop_id: Uuid, price: Decimal, max_quantity: u32) -> Uuid {
        let product = Product {
            id: Uuid::new_v4(),
            title: "Widget".to_string(),
            thumbnail: "widget.jpg".to_string(),
            shop: ShopRef {
                id: shop_id,
                name: "WidgetsCo".to_string(),
                contact: "+919999999999".to_string(),
            },
            regular_price: price,
            discounted_price: price,
            price_tiers: vec![],
            max_quantity,
            stock: StockStatus::InStock,
            deleted: false,
        };
        let id = product.id;
        self.catalog.insert(product);
        id
    }

    pub fn seed_cart(&self, customer_id: Uuid, lines: Vec<(Uuid, u32)>) {
        self.directory.set_cart(
            customer_id,
            lines
                .into_iter()
                .map(|(product_id, quantity)| CartLine {
                    product_id,
                    quantity,
                })
                .collect(),
        );
        self.directory.set_address(
            customer_id,
            DeliveryAddress {
                name: "Test User".to_string(),
                phone: "+911234567890".to_string(),
                house: "12A".to_string(),
                street: "Maple Street".to_string(),
                city: "Springfield".to_string(),
                state: "KA".to_string(),
                zip: "560001".to_string(),
            },
        );
    }

    pub async fn stored_order(&self, id: Uuid) -> Order {
        self.store.find(id).await.unwrap().unwrap()
    }
}

pub fn checkout_body(payment_type: &str) -> Value {
    serde_json::json!({
        "payment_type": payment_type,
        "email": "test@example.com",
        "phone": "+911234567890",
    })
}

pub fn order_id(order_json: &Value) -> Uuid {
    order_json["id"].as_str().unwrap().parse().unwrap()
}
