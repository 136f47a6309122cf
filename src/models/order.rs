use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::Role;

/// Enum representing the possible order-level statuses.
///
/// `partial-*` statuses mean the order's approved line items disagree: at
/// least one item sits in the named state while others are elsewhere.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumIter,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum OrderStatus {
    PaymentInitiated,
    Pending,
    PartialPending,
    ShipmentPreparation,
    PartialShipmentPreparation,
    Shipped,
    PartialShipped,
    Delivered,
    PartialDelivered,
    Cancelled,
    PartialCancelled,
    Returned,
    PartialReturned,
    Refunded,
    PartialRefunded,
    Rejected,
    Failed,
}

/// Enum representing the fulfillment-phase status of a single line item.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum LineItemStatus {
    Pending,
    ShipmentPreparation,
    Shipped,
    Delivered,
    Cancelled,
    Returned,
    ReturnRequested,
    RefundInProgress,
    RefundApproved,
    RefundRejected,
    Refunded,
    Rejected,
    Failed,
}

/// Enum representing the shop-approval phase of a line item.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum PaymentType {
    OnlinePayment,
    CashOnDelivery,
}

/// Buyer identity frozen into the order at creation time.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuyerRef {
    pub id: Uuid,
    pub role: Role,
    pub name: String,
    pub email: String,
    pub phone: String,
}

/// Owning-shop reference frozen into each line item.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShopRef {
    pub id: Uuid,
    pub name: String,
    pub contact: String,
}

/// Immutable copy of the delivery address chosen at checkout.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeliveryAddress {
    pub name: String,
    pub phone: String,
    pub house: String,
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip: String,
}

/// Actor that decided a line item's approval, kept for audit.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DecidedBy {
    pub id: Uuid,
    pub name: String,
}

/// Frozen unit price: catalog price plus the tier price resolved at checkout.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct ItemPrice {
    pub regular: Decimal,
    pub discounted: Decimal,
}

/// Post-delivery return request attached to a line item.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReturnRecord {
    pub quantity: u32,
    pub reason: Option<String>,
    pub description: Option<String>,
    pub images: Vec<String>,
    pub requested_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
}

impl ReturnRecord {
    pub fn new(quantity: u32, reason: Option<String>, description: Option<String>, images: Vec<String>) -> Self {
        Self {
            quantity,
            reason,
            description,
            images,
            requested_at: Utc::now(),
            approved_at: None,
            rejected_at: None,
            rejection_reason: None,
        }
    }
}

/// One product line within an order, independently tracked through the
/// approval and fulfillment phases. Identity within the order is `product_id`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LineItem {
    pub product_id: Uuid,
    pub title: String,
    pub thumbnail: String,
    pub quantity: u32,
    pub price: ItemPrice,
    pub total_price: Decimal,
    pub shop: ShopRef,
    pub status: LineItemStatus,
    pub approval: ApprovalStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decided_by: Option<DecidedBy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracking_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_request: Option<ReturnRecord>,
}

impl LineItem {
    pub fn is_approved(&self) -> bool {
        self.approval == ApprovalStatus::Approved
    }

    pub fn is_decided(&self) -> bool {
        self.approval != ApprovalStatus::Pending
    }
}

/// The order aggregate: one per checkout, never physically deleted.
///
/// `total_items` and `total_amount` are fixed at creation from the cart
/// snapshot; later cancellations and returns surface only through `status`,
/// keeping the financial record immutable.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    pub buyer: BuyerRef,
    pub line_items: Vec<LineItem>,
    pub delivery_address: DeliveryAddress,
    pub total_items: u32,
    pub total_amount: Decimal,
    pub status: OrderStatus,
    pub payment_type: PaymentType,
    pub include: bool,
    /// Optimistic-concurrency token, bumped by the store on every update.
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn new(
        order_number: String,
        buyer: BuyerRef,
        line_items: Vec<LineItem>,
        delivery_address: DeliveryAddress,
        status: OrderStatus,
        payment_type: PaymentType,
        include: bool,
    ) -> Self {
        let now = Utc::now();
        let total_items = line_items.iter().map(|item| item.quantity).sum();
        let total_amount = line_items.iter().map(|item| item.total_price).sum();
        Self {
            id: Uuid::new_v4(),
            order_number,
            buyer,
            line_items,
            delivery_address,
            total_items,
            total_amount,
            status,
            payment_type,
            include,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn line_item(&self, product_id: Uuid) -> Option<&LineItem> {
        self.line_items.iter().find(|item| item.product_id == product_id)
    }

    pub fn line_item_mut(&mut self, product_id: Uuid) -> Option<&mut LineItem> {
        self.line_items.iter_mut().find(|item| item.product_id == product_id)
    }

    /// True once the order aggregate reports fully delivered; fulfillment
    /// mutations are hard-stopped from this point (see fulfillment service).
    pub fn is_delivered(&self) -> bool {
        self.status == OrderStatus::Delivered
    }

    /// Provisional orders are invisible to every listing and lookup.
    pub fn is_provisional(&self) -> bool {
        self.status == OrderStatus::PaymentInitiated
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
