use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::models::order::{LineItemStatus, Order, OrderStatus, ReturnRecord};
use crate::repositories::{update_with, OrderStore};
use crate::services::order_status::refresh_after_fulfillment;
use crate::services::orders::resolve_order;

/// Details a buyer submits when asking to return a delivered item.
#[derive(Clone, Debug, Default)]
pub struct ReturnRequest {
    pub quantity: u32,
    pub reason: Option<String>,
    pub description: Option<String>,
    pub images: Vec<String>,
}

/// The post-delivery return and refund workflow.
///
/// Unlike fulfillment, these operations stay open after the order reports
/// delivered; that is the only point a return can start from.
pub struct ReturnService {
    store: Arc<dyn OrderStore>,
    events: EventSender,
}

impl ReturnService {
    pub fn new(store: Arc<dyn OrderStore>, events: EventSender) -> Self {
        Self { store, events }
    }

    async fn load(&self, key: &str) -> Result<Order, ServiceError> {
        let order = resolve_order(self.store.as_ref(), key).await?;
        if order.is_provisional() {
            return Err(ServiceError::NotFound(format!("Order {key} not found")));
        }
        Ok(order)
    }

    /// Single return-request view for the buyer, the owning shop, or an
    /// admin.
    #[instrument(skip(self, actor))]
    pub async fn return_detail(
        &self,
        actor: &AuthUser,
        key: &str,
        product_id: Uuid,
    ) -> Result<crate::models::order::LineItem, ServiceError> {
        let order = self.load(key).await?;
        let item = order
            .line_item(product_id)
            .ok_or_else(|| ServiceError::NotFound(format!("Line item {product_id} not found")))?;

        let allowed = actor.can_act_on_line_item(item)
            || (actor.role.is_buyer() && order.buyer.id == actor.id);
        if !allowed {
            return Err(ServiceError::Forbidden(
                "Not entitled to this return request".to_string(),
            ));
        }
        if item.return_request.is_none() {
            return Err(ServiceError::NotFound(format!(
                "No return request on {product_id}"
            )));
        }
        Ok(item.clone())
    }

    /// Opens a return request on a delivered line item. Only the buyer who
    /// placed the order may ask.
    #[instrument(skip(self, actor, request))]
    pub async fn request_return(
        &self,
        actor: &AuthUser,
        key: &str,
        product_id: Uuid,
        request: ReturnRequest,
    ) -> Result<Order, ServiceError> {
        let order = self.load(key).await?;
        if !actor.role.is_buyer() || order.buyer.id != actor.id {
            return Err(ServiceError::Forbidden(
                "Only the buyer may request a return".to_string(),
            ));
        }

        let mut status_change: Option<OrderStatus> = None;
        let updated = update_with(self.store.as_ref(), order.id, |order| {
            status_change = None;
            let item = order.line_item_mut(product_id).ok_or_else(|| {
                ServiceError::NotFound(format!("Line item {product_id} not found"))
            })?;

            if request.quantity == 0 || request.quantity > item.quantity {
                return Err(ServiceError::ValidationError(format!(
                    "Return quantity must be between 1 and {}",
                    item.quantity
                )));
            }
            match item.status {
                LineItemStatus::Delivered => {}
                LineItemStatus::ReturnRequested => {
                    return Err(ServiceError::AlreadyInProgress(format!(
                        "Return already requested for {product_id}"
                    )))
                }
                LineItemStatus::Returned | LineItemStatus::Refunded => {
                    return Err(ServiceError::ValidationError(format!(
                        "Line item {product_id} has already been returned"
                    )))
                }
                other => {
                    return Err(ServiceError::InvalidTransition(format!(
                        "Returns require a delivered item, found {other}"
                    )))
                }
            }

            item.status = LineItemStatus::ReturnRequested;
            item.return_request = Some(ReturnRecord::new(
                request.quantity,
                request.reason.clone(),
                request.description.clone(),
                request.images.clone(),
            ));
            status_change = refresh_after_fulfillment(order);
            Ok(())
        })
        .await?;

        self.events
            .send(Event::ReturnRequested {
                order_id: updated.id,
                product_id,
            })
            .await;
        if let Some(status) = status_change {
            self.events
                .send(Event::OrderStatusChanged {
                    order_id: updated.id,
                    status,
                })
                .await;
        }
        info!(order_id = %updated.id, %product_id, "return requested");
        Ok(updated)
    }

    /// Approves an open return request for refund.
    #[instrument(skip(self, actor))]
    pub async fn approve_refund(
        &self,
        actor: &AuthUser,
        key: &str,
        product_id: Uuid,
    ) -> Result<Order, ServiceError> {
        let order = self.load(key).await?;
        let mut status_change: Option<OrderStatus> = None;
        let updated = update_with(self.store.as_ref(), order.id, |order| {
            status_change = None;
            let item = order.line_item_mut(product_id).ok_or_else(|| {
                ServiceError::NotFound(format!("Line item {product_id} not found"))
            })?;
            if !actor.can_act_on_line_item(item) {
                return Err(ServiceError::Forbidden(
                    "Item belongs to another shop".to_string(),
                ));
            }
            if item.status != LineItemStatus::ReturnRequested {
                return Err(ServiceError::InvalidTransition(format!(
                    "No open return request on {product_id}"
                )));
            }

            item.status = LineItemStatus::RefundApproved;
            if let Some(record) = item.return_request.as_mut() {
                record.approved_at = Some(Utc::now());
            }
            status_change = refresh_after_fulfillment(order);
            Ok(())
        })
        .await?;

        self.events
            .send(Event::RefundApproved {
                order_id: updated.id,
                product_id,
            })
            .await;
        if let Some(status) = status_change {
            self.events
                .send(Event::OrderStatusChanged {
                    order_id: updated.id,
                    status,
                })
                .await;
        }
        Ok(updated)
    }

    /// Rejects an open return request. A reason is mandatory; it is stored on
    /// the return record for the buyer to see.
    #[instrument(skip(self, actor))]
    pub async fn reject_refund(
        &self,
        actor: &AuthUser,
        key: &str,
        product_id: Uuid,
        reason: &str,
    ) -> Result<Order, ServiceError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(ServiceError::ValidationError(
                "Rejection reason is required".to_string(),
            ));
        }

        let order = self.load(key).await?;
        let mut status_change: Option<OrderStatus> = None;
        let updated = update_with(self.store.as_ref(), order.id, |order| {
            status_change = None;
            let item = order.line_item_mut(product_id).ok_or_else(|| {
                ServiceError::NotFound(format!("Line item {product_id} not found"))
            })?;
            if !actor.can_act_on_line_item(item) {
                return Err(ServiceError::Forbidden(
                    "Item belongs to another shop".to_string(),
                ));
            }
            if item.status != LineItemStatus::ReturnRequested {
                return Err(ServiceError::InvalidTransition(format!(
                    "No open return request on {product_id}"
                )));
            }

            item.status = LineItemStatus::RefundRejected;
            if let Some(record) = item.return_request.as_mut() {
                record.rejected_at = Some(Utc::now());
                record.rejection_reason = Some(reason.to_string());
            }
            status_change = refresh_after_fulfillment(order);
            Ok(())
        })
        .await?;

        self.events
            .send(Event::RefundRejected {
                order_id: updated.id,
                product_id,
            })
            .await;
        if let Some(status) = status_change {
            self.events
                .send(Event::OrderStatusChanged {
                    order_id: updated.id,
                    status,
                })
                .await;
        }
        Ok(updated)
    }

    /// Settles the refund. Covers both approved returns and refunds opened by
    /// rejecting a prepaid item at approval time.
    #[instrument(skip(self, actor))]
    pub async fn complete_refund(
        &self,
        actor: &AuthUser,
        key: &str,
        product_id: Uuid,
    ) -> Result<Order, ServiceError> {
        let order = self.load(key).await?;
        let mut status_change: Option<OrderStatus> = None;

        let updated = update_with(self.store.as_ref(), order.id, |order| {
            status_change = None;
            let item = order.line_item_mut(product_id).ok_or_else(|| {
                ServiceError::NotFound(format!("Line item {product_id} not found"))
            })?;
            if !actor.can_act_on_line_item(item) {
                return Err(ServiceError::Forbidden(
                    "Item belongs to another shop".to_string(),
                ));
            }
            if !matches!(
                item.status,
                LineItemStatus::RefundApproved | LineItemStatus::RefundInProgress
            ) {
                return Err(ServiceError::InvalidTransition(format!(
                    "Line item {product_id} has no refund to settle"
                )));
            }

            item.status = LineItemStatus::Refunded;
            status_change = refresh_after_fulfillment(order);
            Ok(())
        })
        .await?;

        self.events
            .send(Event::RefundCompleted {
                order_id: updated.id,
                product_id,
            })
            .await;
        if let Some(status) = status_change {
            self.events
                .send(Event::OrderStatusChanged {
                    order_id: updated.id,
                    status,
                })
                .await;
        }
        info!(order_id = %updated.id, %product_id, "refund settled");
        Ok(updated)
    }
}
