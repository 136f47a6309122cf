use std::sync::Arc;

use rand::Rng;
use sha2::{Digest, Sha256};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::auth::{AuthUser, Role};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::models::order::{ApprovalStatus, LineItemStatus, Order, OrderStatus};
use crate::repositories::{update_with, OrderFilter, OrderStore};

/// Public order identifier, e.g. `order_3f2a9c...`. Derived from a random
/// seed so numbers are unguessable and collision-free in practice.
pub fn generate_order_number() -> String {
    let seed: [u8; 16] = rand::thread_rng().gen();
    let digest = Sha256::digest(hex::encode(seed).as_bytes());
    format!("order_{}", &hex::encode(digest)[..20])
}

/// Looks an order up by canonical id or public order number.
pub(crate) async fn resolve_order(
    store: &dyn OrderStore,
    key: &str,
) -> Result<Order, ServiceError> {
    let found = match key.parse::<Uuid>() {
        Ok(id) => store.find(id).await?,
        Err(_) => store.find_by_number(key).await?,
    };
    found.ok_or_else(|| ServiceError::NotFound(format!("Order {key} not found")))
}

/// A page of orders plus the pre-pagination total.
#[derive(Clone, Debug)]
pub struct OrderPage {
    pub orders: Vec<Order>,
    pub total: u64,
}

/// Page selection and the optional order-status filter for listings.
#[derive(Clone, Copy, Debug)]
pub struct ListParams {
    pub page: u64,
    pub per_page: u64,
    pub status: Option<OrderStatus>,
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 20,
            status: None,
        }
    }
}

fn paginate(mut orders: Vec<Order>, params: ListParams) -> OrderPage {
    if let Some(status) = params.status {
        orders.retain(|order| order.status == status);
    }
    let total = orders.len() as u64;
    let start = params.page.saturating_sub(1).saturating_mul(params.per_page) as usize;
    let orders = if start >= orders.len() {
        Vec::new()
    } else {
        orders.drain(start..).take(params.per_page as usize).collect()
    };
    OrderPage { orders, total }
}

/// Keeps only the line items a shop user is entitled to see.
fn scope_to_shop(order: &mut Order, shop_id: Uuid) {
    order.line_items.retain(|item| item.shop.id == shop_id);
}

/// Order lookup and listing, scoped by the caller's role.
pub struct OrderService {
    store: Arc<dyn OrderStore>,
    events: EventSender,
}

impl OrderService {
    pub fn new(store: Arc<dyn OrderStore>, events: EventSender) -> Self {
        Self { store, events }
    }

    /// Provisional orders are visible here; callers decide whether to hide
    /// them.
    pub(crate) async fn resolve(&self, key: &str) -> Result<Order, ServiceError> {
        resolve_order(self.store.as_ref(), key).await
    }

    fn shop_id(actor: &AuthUser) -> Result<Uuid, ServiceError> {
        actor
            .shop_id
            .filter(|_| actor.role == Role::ShopUser)
            .ok_or_else(|| ServiceError::Forbidden("Shop account required".to_string()))
    }

    fn require_admin(actor: &AuthUser) -> Result<(), ServiceError> {
        if actor.is_admin() {
            Ok(())
        } else {
            Err(ServiceError::Forbidden("Admin access required".to_string()))
        }
    }

    /// Single-order view. Buyers see their own orders, shop users the subset
    /// of line items their shop owns, admins everything. Provisional orders
    /// are hidden from everyone.
    #[instrument(skip(self, actor))]
    pub async fn get_order(&self, actor: &AuthUser, key: &str) -> Result<Order, ServiceError> {
        let mut order = self.resolve(key).await?;
        if order.is_provisional() {
            return Err(ServiceError::NotFound(format!("Order {key} not found")));
        }

        match actor.role {
            Role::Admin => Ok(order),
            Role::Customer | Role::SuperCustomer => {
                if order.buyer.id == actor.id {
                    Ok(order)
                } else {
                    Err(ServiceError::Forbidden(
                        "Order belongs to another customer".to_string(),
                    ))
                }
            }
            Role::ShopUser => {
                let shop_id = Self::shop_id(actor)?;
                scope_to_shop(&mut order, shop_id);
                if order.line_items.is_empty() {
                    Err(ServiceError::Forbidden(
                        "Order has no items for this shop".to_string(),
                    ))
                } else {
                    Ok(order)
                }
            }
        }
    }

    /// The caller's own order history, newest first.
    #[instrument(skip(self, actor))]
    pub async fn list_for_buyer(
        &self,
        actor: &AuthUser,
        params: ListParams,
    ) -> Result<OrderPage, ServiceError> {
        let filter = OrderFilter {
            buyer_id: Some(actor.id),
            ..Default::default()
        };
        Ok(paginate(self.store.list(&filter).await?, params))
    }

    /// Orders holding at least one approved item for the caller's shop, with
    /// line items narrowed to that shop.
    #[instrument(skip(self, actor))]
    pub async fn list_for_shop(
        &self,
        actor: &AuthUser,
        params: ListParams,
    ) -> Result<OrderPage, ServiceError> {
        let shop_id = Self::shop_id(actor)?;
        let filter = OrderFilter {
            shop_id: Some(shop_id),
            item_approval: Some(ApprovalStatus::Approved),
            ..Default::default()
        };
        let mut page = paginate(self.store.list(&filter).await?, params);
        for order in &mut page.orders {
            scope_to_shop(order, shop_id);
        }
        Ok(page)
    }

    /// Orders with items still awaiting this shop's approval decision.
    #[instrument(skip(self, actor))]
    pub async fn approval_inbox(
        &self,
        actor: &AuthUser,
        params: ListParams,
    ) -> Result<OrderPage, ServiceError> {
        let shop_id = Self::shop_id(actor)?;
        let filter = OrderFilter {
            shop_id: Some(shop_id),
            item_approval: Some(ApprovalStatus::Pending),
            // failed-payment orders are not actionable work
            exclude_failed: true,
            ..Default::default()
        };
        let mut page = paginate(self.store.list(&filter).await?, params);
        for order in &mut page.orders {
            scope_to_shop(order, shop_id);
        }
        Ok(page)
    }

    /// Orders with open return requests. Shop users see their own shop's
    /// requests; admins see all of them.
    #[instrument(skip(self, actor))]
    pub async fn returns_inbox(
        &self,
        actor: &AuthUser,
        params: ListParams,
    ) -> Result<OrderPage, ServiceError> {
        let shop_id = match actor.role {
            Role::Admin => None,
            Role::ShopUser => Some(Self::shop_id(actor)?),
            _ => {
                return Err(ServiceError::Forbidden(
                    "Shop or admin access required".to_string(),
                ))
            }
        };
        let filter = OrderFilter {
            shop_id,
            item_status: Some(LineItemStatus::ReturnRequested),
            ..Default::default()
        };
        let mut page = paginate(self.store.list(&filter).await?, params);
        if let Some(shop_id) = shop_id {
            for order in &mut page.orders {
                scope_to_shop(order, shop_id);
            }
        }
        Ok(page)
    }

    /// Every non-provisional order; admin only.
    #[instrument(skip(self, actor))]
    pub async fn list_all(
        &self,
        actor: &AuthUser,
        params: ListParams,
    ) -> Result<OrderPage, ServiceError> {
        Self::require_admin(actor)?;
        Ok(paginate(self.store.list(&OrderFilter::default()).await?, params))
    }

    /// Wholesale-tier orders still excluded from processing, for the admin
    /// curation view. Re-included orders leave this list.
    #[instrument(skip(self, actor))]
    pub async fn super_orders(
        &self,
        actor: &AuthUser,
        params: ListParams,
    ) -> Result<OrderPage, ServiceError> {
        Self::require_admin(actor)?;
        let filter = OrderFilter {
            buyer_role: Some(Role::SuperCustomer),
            include: Some(false),
            ..Default::default()
        };
        Ok(paginate(self.store.list(&filter).await?, params))
    }

    /// Admin override for wholesale orders: excluding sets the order
    /// cancelled, re-including restarts it at shipment-preparation. Delivered
    /// orders are immutable.
    #[instrument(skip(self, actor))]
    pub async fn set_include(
        &self,
        actor: &AuthUser,
        key: &str,
        include: bool,
    ) -> Result<Order, ServiceError> {
        Self::require_admin(actor)?;
        let order = self.resolve(key).await?;
        if order.buyer.role != Role::SuperCustomer {
            return Err(ServiceError::ValidationError(
                "Include toggle applies only to wholesale orders".to_string(),
            ));
        }

        let updated = update_with(self.store.as_ref(), order.id, |order| {
            if order.is_delivered() {
                return Err(ServiceError::InvalidTransition(
                    "Delivered orders cannot be changed".to_string(),
                ));
            }
            order.include = include;
            order.status = if include {
                OrderStatus::ShipmentPreparation
            } else {
                OrderStatus::Cancelled
            };
            Ok(())
        })
        .await?;

        self.events
            .send(Event::OrderStatusChanged {
                order_id: updated.id,
                status: updated.status,
            })
            .await;
        info!(order_id = %updated.id, include, "wholesale order include toggled");
        Ok(updated)
    }
}
