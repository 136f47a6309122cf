use std::sync::Arc;

use tracing::{info, instrument};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::models::order::{LineItemStatus, Order, OrderStatus};
use crate::repositories::{update_with, OrderStore};
use crate::services::order_status::refresh_after_fulfillment;
use crate::services::orders::resolve_order;

/// Legal single-step moves through the fulfillment pipeline. Cancellation is
/// allowed anywhere before delivery; a delivered item can still come back as
/// a direct physical return.
fn step_allowed(from: LineItemStatus, to: LineItemStatus) -> bool {
    use LineItemStatus::*;
    matches!(
        (from, to),
        (Pending, ShipmentPreparation)
            | (Pending, Cancelled)
            | (ShipmentPreparation, Shipped)
            | (ShipmentPreparation, Cancelled)
            | (Shipped, Delivered)
            | (Shipped, Cancelled)
            | (Delivered, Returned)
    )
}

/// Moves approved line items through the shipping pipeline.
pub struct FulfillmentService {
    store: Arc<dyn OrderStore>,
    events: EventSender,
}

impl FulfillmentService {
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

    fn checked_item<'a>(
        actor: &AuthUser,
        order: &'a mut Order,
        product_id: Uuid,
    ) -> Result<&'a mut crate::models::order::LineItem, ServiceError> {
        // a fully delivered order is closed to fulfillment edits
        if order.is_delivered() {
            return Err(ServiceError::InvalidTransition(
                "Order is delivered and can no longer be updated".to_string(),
            ));
        }
        let item = order
            .line_item_mut(product_id)
            .ok_or_else(|| ServiceError::NotFound(format!("Line item {product_id} not found")))?;
        if !actor.can_act_on_line_item(item) {
            return Err(ServiceError::Forbidden(
                "Item belongs to another shop".to_string(),
            ));
        }
        if !item.is_approved() {
            return Err(ServiceError::InvalidTransition(format!(
                "Line item {product_id} is not approved for fulfillment"
            )));
        }
        Ok(item)
    }

    /// Advances one line item to `target`. Re-sending the current state is a
    /// no-op; any other illegal move is a conflict.
    #[instrument(skip(self, actor))]
    pub async fn advance(
        &self,
        actor: &AuthUser,
        key: &str,
        product_id: Uuid,
        target: LineItemStatus,
    ) -> Result<Order, ServiceError> {
        let order = self.load(key).await?;
        let mut status_change: Option<OrderStatus> = None;
        let mut moved = false;

        let updated = update_with(self.store.as_ref(), order.id, |order| {
            status_change = None;
            moved = false;
            let item = Self::checked_item(actor, order, product_id)?;
            if item.status == target {
                return Ok(());
            }
            if !step_allowed(item.status, target) {
                return Err(ServiceError::InvalidTransition(format!(
                    "Line item cannot move from {} to {}",
                    item.status, target
                )));
            }
            item.status = target;
            moved = true;
            status_change = refresh_after_fulfillment(order);
            Ok(())
        })
        .await?;

        if moved {
            self.events
                .send(Event::FulfillmentAdvanced {
                    order_id: updated.id,
                    product_id,
                    status: target,
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
            info!(order_id = %updated.id, %product_id, %target, "line item advanced");
        }
        Ok(updated)
    }

    /// Attaches or replaces the carrier tracking link on a line item.
    #[instrument(skip(self, actor))]
    pub async fn set_tracking(
        &self,
        actor: &AuthUser,
        key: &str,
        product_id: Uuid,
        link: &str,
    ) -> Result<Order, ServiceError> {
        let link = link.trim();
        if link.is_empty() {
            return Err(ServiceError::ValidationError(
                "Tracking link is required".to_string(),
            ));
        }

        let order = self.load(key).await?;
        let updated = update_with(self.store.as_ref(), order.id, |order| {
            let item = Self::checked_item(actor, order, product_id)?;
            item.tracking_link = Some(link.to_string());
            Ok(())
        })
        .await?;

        self.events
            .send(Event::TrackingUpdated {
                order_id: updated.id,
                product_id,
            })
            .await;
        Ok(updated)
    }
}
