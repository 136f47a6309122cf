use std::sync::Arc;

use tracing::{info, instrument};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::models::order::{
    ApprovalStatus, DecidedBy, LineItemStatus, Order, OrderStatus, PaymentType,
};
use crate::repositories::{update_with, OrderStore};
use crate::services::order_status::refresh_after_approval;
use crate::services::orders::resolve_order;

/// Per-shop approval decisions on individual line items.
pub struct ApprovalService {
    store: Arc<dyn OrderStore>,
    events: EventSender,
}

impl ApprovalService {
    pub fn new(store: Arc<dyn OrderStore>, events: EventSender) -> Self {
        Self { store, events }
    }

    async fn load(&self, key: &str) -> Result<Order, ServiceError> {
        let order = resolve_order(self.store.as_ref(), key).await?;
        if order.is_provisional() {
            return Err(ServiceError::NotFound(format!("Order {key} not found")));
        }
        // failed is terminal; a decision would push the rank-0 order back
        // into the live pipeline without payment
        if order.status == OrderStatus::Failed {
            return Err(ServiceError::InvalidTransition(format!(
                "Order {} failed payment and cannot be decided",
                order.order_number
            )));
        }
        Ok(order)
    }

    fn decide(
        actor: &AuthUser,
        order: &mut Order,
        product_id: Uuid,
        decision: ApprovalStatus,
        reason: Option<&str>,
    ) -> Result<(), ServiceError> {
        let payment_type = order.payment_type;
        let item = order
            .line_item_mut(product_id)
            .ok_or_else(|| ServiceError::NotFound(format!("Line item {product_id} not found")))?;

        if !actor.can_act_on_line_item(item) {
            return Err(ServiceError::Forbidden(
                "Item belongs to another shop".to_string(),
            ));
        }
        if item.is_decided() {
            return Err(ServiceError::InvalidTransition(format!(
                "Line item {product_id} is already decided"
            )));
        }

        item.approval = decision;
        item.decided_by = Some(DecidedBy {
            id: actor.id,
            name: actor.name.clone(),
        });
        if decision == ApprovalStatus::Rejected {
            item.rejection_reason = reason.map(str::to_string);
            // a rejected prepaid item owes the buyer money until settled
            item.status = match payment_type {
                PaymentType::CashOnDelivery => LineItemStatus::Rejected,
                PaymentType::OnlinePayment => LineItemStatus::RefundInProgress,
            };
        }
        Ok(())
    }

    #[instrument(skip(self, actor))]
    pub async fn approve(
        &self,
        actor: &AuthUser,
        key: &str,
        product_id: Uuid,
    ) -> Result<Order, ServiceError> {
        let order = self.load(key).await?;
        let mut status_change: Option<OrderStatus> = None;

        let updated = update_with(self.store.as_ref(), order.id, |order| {
            Self::decide(actor, order, product_id, ApprovalStatus::Approved, None)?;
            status_change = refresh_after_approval(order);
            Ok(())
        })
        .await?;

        self.events
            .send(Event::ItemApproved {
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
        info!(order_id = %updated.id, %product_id, "line item approved");
        Ok(updated)
    }

    #[instrument(skip(self, actor))]
    pub async fn reject(
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
            Self::decide(actor, order, product_id, ApprovalStatus::Rejected, Some(reason))?;
            status_change = refresh_after_approval(order);
            Ok(())
        })
        .await?;

        self.events
            .send(Event::ItemRejected {
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
        info!(order_id = %updated.id, %product_id, "line item rejected");
        Ok(updated)
    }
}
