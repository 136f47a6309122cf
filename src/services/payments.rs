use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::catalog::CustomerDirectory;
use crate::config::PaymentConfig;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::models::order::{BuyerRef, Order, OrderStatus, PaymentType};
use crate::repositories::{update_with, OrderStore};
use crate::services::cart::CartService;
use crate::services::orders::generate_order_number;

/// Gateway session handed to the client to collect payment.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PaymentSession {
    pub session_id: String,
    pub order_number: String,
    /// Amount the gateway echoed back; must equal the order total.
    pub amount: Decimal,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PaymentVerification {
    pub paid: bool,
    pub customer_id: Option<Uuid>,
    pub amount: Decimal,
}

/// External payment provider seam.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_session(
        &self,
        order_number: &str,
        amount: Decimal,
        buyer: &BuyerRef,
    ) -> Result<PaymentSession, ServiceError>;

    /// Settlement status for a previously created session.
    async fn verify(&self, order_number: &str) -> Result<PaymentVerification, ServiceError>;
}

#[derive(Serialize)]
struct GatewayCustomer<'a> {
    customer_id: String,
    customer_name: &'a str,
    customer_email: &'a str,
    customer_phone: &'a str,
}

#[derive(Serialize)]
struct CreateSessionRequest<'a> {
    order_id: &'a str,
    order_amount: Decimal,
    order_currency: &'static str,
    customer_details: GatewayCustomer<'a>,
}

#[derive(Deserialize)]
struct CreateSessionResponse {
    payment_session_id: String,
    order_amount: Decimal,
}

#[derive(Deserialize)]
struct GatewayOrderStatus {
    order_status: String,
    order_amount: Decimal,
    customer_details: Option<GatewayCustomerDetails>,
}

#[derive(Deserialize)]
struct GatewayCustomerDetails {
    customer_id: String,
}

/// Cashfree-style REST gateway client.
pub struct HttpPaymentGateway {
    client: reqwest::Client,
    config: PaymentConfig,
}

impl HttpPaymentGateway {
    pub fn new(config: PaymentConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header("x-client-id", &self.config.app_id)
            .header("x-client-secret", &self.config.secret_key)
            .header("x-api-version", "2023-08-01")
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn create_session(
        &self,
        order_number: &str,
        amount: Decimal,
        buyer: &BuyerRef,
    ) -> Result<PaymentSession, ServiceError> {
        let body = CreateSessionRequest {
            order_id: order_number,
            order_amount: amount,
            order_currency: "INR",
            customer_details: GatewayCustomer {
                customer_id: buyer.id.to_string(),
                customer_name: &buyer.name,
                customer_email: &buyer.email,
                customer_phone: &buyer.phone,
            },
        };

        let response = self
            .request(self.client.post(format!("{}/orders", self.config.base_url)))
            .json(&body)
            .send()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(format!("Payment gateway: {e}")))?;

        if !response.status().is_success() {
            return Err(ServiceError::ExternalServiceError(format!(
                "Payment gateway returned {}",
                response.status()
            )));
        }

        let session: CreateSessionResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(format!("Payment gateway: {e}")))?;

        Ok(PaymentSession {
            session_id: session.payment_session_id,
            order_number: order_number.to_string(),
            amount: session.order_amount,
        })
    }

    async fn verify(&self, order_number: &str) -> Result<PaymentVerification, ServiceError> {
        let response = self
            .request(
                self.client
                    .get(format!("{}/orders/{order_number}", self.config.base_url)),
            )
            .send()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(format!("Payment gateway: {e}")))?;

        if !response.status().is_success() {
            return Err(ServiceError::ExternalServiceError(format!(
                "Payment gateway returned {}",
                response.status()
            )));
        }

        let status: GatewayOrderStatus = response
            .json()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(format!("Payment gateway: {e}")))?;

        Ok(PaymentVerification {
            paid: status.order_status == "PAID",
            customer_id: status
                .customer_details
                .and_then(|c| c.customer_id.parse().ok()),
            amount: status.order_amount,
        })
    }
}

/// Scripted gateway for tests and the standalone binary. Sessions echo the
/// requested amount plus a configurable offset; verification verdicts are
/// recorded per order number.
#[derive(Default)]
pub struct StaticPaymentGateway {
    quote_offset: Decimal,
    verdicts: DashMap<String, PaymentVerification>,
}

impl StaticPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn misquoting_by(offset: Decimal) -> Self {
        Self {
            quote_offset: offset,
            verdicts: DashMap::new(),
        }
    }

    pub fn record_verdict(&self, order_number: &str, verification: PaymentVerification) {
        self.verdicts.insert(order_number.to_string(), verification);
    }
}

#[async_trait]
impl PaymentGateway for StaticPaymentGateway {
    async fn create_session(
        &self,
        order_number: &str,
        amount: Decimal,
        _buyer: &BuyerRef,
    ) -> Result<PaymentSession, ServiceError> {
        Ok(PaymentSession {
            session_id: format!("session_{order_number}"),
            order_number: order_number.to_string(),
            amount: amount + self.quote_offset,
        })
    }

    async fn verify(&self, order_number: &str) -> Result<PaymentVerification, ServiceError> {
        self.verdicts
            .get(order_number)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| {
                ServiceError::ExternalServiceError(format!(
                    "No gateway record for {order_number}"
                ))
            })
    }
}

/// Drives checkout: cart snapshot, gateway session, provisional order, and
/// the verify-then-place step that makes the order real.
pub struct CheckoutService {
    store: Arc<dyn OrderStore>,
    cart: CartService,
    directory: Arc<dyn CustomerDirectory>,
    gateway: Arc<dyn PaymentGateway>,
    events: EventSender,
}

/// Result of starting an online checkout.
#[derive(Clone, Debug, Serialize)]
pub struct CheckoutStarted {
    pub order: Order,
    pub session: PaymentSession,
}

impl CheckoutService {
    pub fn new(
        store: Arc<dyn OrderStore>,
        cart: CartService,
        directory: Arc<dyn CustomerDirectory>,
        gateway: Arc<dyn PaymentGateway>,
        events: EventSender,
    ) -> Self {
        Self {
            store,
            cart,
            directory,
            gateway,
            events,
        }
    }

    fn buyer_ref(actor: &AuthUser, email: &str, phone: &str) -> Result<BuyerRef, ServiceError> {
        if !actor.role.is_buyer() {
            return Err(ServiceError::Forbidden(
                "Only buyers can place orders".to_string(),
            ));
        }
        Ok(BuyerRef {
            id: actor.id,
            role: actor.role,
            name: actor.name.clone(),
            email: email.to_string(),
            phone: phone.to_string(),
        })
    }

    /// Starts an online checkout: snapshots the cart, opens a gateway
    /// session, and persists a provisional order. Nothing is persisted when
    /// the gateway echoes back a different amount.
    #[instrument(skip(self, actor))]
    pub async fn start_online(
        &self,
        actor: &AuthUser,
        email: &str,
        phone: &str,
    ) -> Result<CheckoutStarted, ServiceError> {
        let buyer = Self::buyer_ref(actor, email, phone)?;
        let snapshot = self.cart.snapshot(buyer.id).await?;
        let order_number = generate_order_number();

        let session = self
            .gateway
            .create_session(&order_number, snapshot.total_amount, &buyer)
            .await?;
        if session.amount != snapshot.total_amount {
            warn!(
                order_number,
                expected = %snapshot.total_amount,
                actual = %session.amount,
                "gateway amount mismatch, aborting checkout"
            );
            return Err(ServiceError::AmountMismatch {
                expected: snapshot.total_amount,
                actual: session.amount,
            });
        }

        let order = Order::new(
            order_number,
            buyer,
            snapshot.line_items,
            snapshot.delivery_address,
            OrderStatus::PaymentInitiated,
            PaymentType::OnlinePayment,
            true,
        );
        let order = self.store.insert(order).await?;
        self.events.send(Event::OrderCreated { order_id: order.id }).await;
        info!(order_id = %order.id, "online checkout started");

        Ok(CheckoutStarted { order, session })
    }

    /// Places a cash-on-delivery order directly; no gateway involved.
    #[instrument(skip(self, actor))]
    pub async fn place_cod(
        &self,
        actor: &AuthUser,
        email: &str,
        phone: &str,
    ) -> Result<Order, ServiceError> {
        let buyer = Self::buyer_ref(actor, email, phone)?;
        let snapshot = self.cart.snapshot(buyer.id).await?;
        let include = actor.role != crate::auth::Role::SuperCustomer;

        let order = Order::new(
            generate_order_number(),
            buyer,
            snapshot.line_items,
            snapshot.delivery_address,
            OrderStatus::Pending,
            PaymentType::CashOnDelivery,
            include,
        );
        let order = self.store.insert(order).await?;
        self.directory.clear_cart(actor.id).await?;
        self.events.send(Event::OrderCreated { order_id: order.id }).await;
        self.events.send(Event::OrderPlaced { order_id: order.id }).await;
        info!(order_id = %order.id, "cash-on-delivery order placed");

        Ok(order)
    }

    /// Verifies settlement with the gateway. A paid session belonging to the
    /// caller and covering the full order amount places the order; anything
    /// else marks it failed.
    #[instrument(skip(self, actor))]
    pub async fn verify_payment(
        &self,
        actor: &AuthUser,
        order_number: &str,
    ) -> Result<Order, ServiceError> {
        let order = self
            .store
            .find_by_number(order_number)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {order_number} not found")))?;

        if order.buyer.id != actor.id {
            return Err(ServiceError::Forbidden(
                "Order belongs to another customer".to_string(),
            ));
        }
        if !order.is_provisional() {
            return Err(ServiceError::InvalidTransition(format!(
                "Order {} is not awaiting payment",
                order.order_number
            )));
        }

        let verification = self.gateway.verify(order_number).await?;
        // the settled amount must cover the order exactly
        let settled = verification.paid
            && verification.customer_id == Some(actor.id)
            && verification.amount == order.total_amount;

        if !settled {
            let order_id = order.id;
            update_with(self.store.as_ref(), order_id, |order| {
                order.status = OrderStatus::Failed;
                Ok(())
            })
            .await?;
            self.events.send(Event::PaymentFailed { order_id }).await;
            return Err(ServiceError::PaymentFailed(format!(
                "Payment for {order_number} was not settled"
            )));
        }

        let include = actor.role != crate::auth::Role::SuperCustomer;
        let placed = update_with(self.store.as_ref(), order.id, |order| {
            order.status = OrderStatus::Pending;
            order.include = include;
            Ok(())
        })
        .await?;
        self.directory.clear_cart(actor.id).await?;
        self.events.send(Event::OrderPlaced { order_id: placed.id }).await;
        info!(order_id = %placed.id, "payment verified, order placed");

        Ok(placed)
    }
}
