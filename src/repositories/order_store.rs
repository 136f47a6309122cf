use async_trait::async_trait;
use dashmap::DashMap;
use tracing::warn;
use uuid::Uuid;

use crate::auth::Role;
use crate::errors::ServiceError;
use crate::models::order::{ApprovalStatus, LineItemStatus, Order, OrderStatus};

/// Listing predicate evaluated by the store. All set fields must match; the
/// item-level fields match when at least one line item satisfies them all.
#[derive(Clone, Debug, Default)]
pub struct OrderFilter {
    pub buyer_id: Option<Uuid>,
    pub buyer_role: Option<Role>,
    pub shop_id: Option<Uuid>,
    pub item_approval: Option<ApprovalStatus>,
    pub item_status: Option<LineItemStatus>,
    /// Curated-order predicate on the wholesale `include` flag.
    pub include: Option<bool>,
    /// Provisional (payment-initiated) orders are hidden unless set.
    pub include_provisional: bool,
    /// Hides failed-payment orders; set by inboxes that only list
    /// actionable work.
    pub exclude_failed: bool,
}

impl OrderFilter {
    fn matches(&self, order: &Order) -> bool {
        if !self.include_provisional && order.is_provisional() {
            return false;
        }
        if self.exclude_failed && order.status == OrderStatus::Failed {
            return false;
        }
        if let Some(include) = self.include {
            if order.include != include {
                return false;
            }
        }
        if let Some(buyer_id) = self.buyer_id {
            if order.buyer.id != buyer_id {
                return false;
            }
        }
        if let Some(role) = self.buyer_role {
            if order.buyer.role != role {
                return false;
            }
        }
        if self.shop_id.is_some() || self.item_approval.is_some() || self.item_status.is_some() {
            let any_item = order.line_items.iter().any(|item| {
                self.shop_id.map_or(true, |id| item.shop.id == id)
                    && self.item_approval.map_or(true, |a| item.approval == a)
                    && self.item_status.map_or(true, |s| item.status == s)
            });
            if !any_item {
                return false;
            }
        }
        true
    }
}

/// Order persistence. Updates are version-checked: the caller hands back the
/// order at the version it read, and the store refuses the write when another
/// writer got there first.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn insert(&self, order: Order) -> Result<Order, ServiceError>;

    async fn find(&self, id: Uuid) -> Result<Option<Order>, ServiceError>;

    async fn find_by_number(&self, order_number: &str) -> Result<Option<Order>, ServiceError>;

    /// Writes the order back, failing with `ConcurrentModification` when the
    /// stored version no longer matches. On success the version is bumped.
    async fn update(&self, order: Order) -> Result<Order, ServiceError>;

    /// All orders matching the filter, newest first.
    async fn list(&self, filter: &OrderFilter) -> Result<Vec<Order>, ServiceError>;
}

const UPDATE_RETRIES: usize = 8;

/// Read-modify-write with bounded retry on version conflicts. The closure
/// must be idempotent; it re-runs against a fresh read after each conflict.
pub async fn update_with<S, F>(store: &S, order_id: Uuid, mut apply: F) -> Result<Order, ServiceError>
where
    S: OrderStore + ?Sized,
    F: FnMut(&mut Order) -> Result<(), ServiceError>,
{
    for attempt in 0..UPDATE_RETRIES {
        let mut order = store
            .find(order_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {order_id} not found")))?;

        apply(&mut order)?;
        order.touch();

        match store.update(order).await {
            Ok(saved) => return Ok(saved),
            Err(ServiceError::ConcurrentModification(_)) if attempt + 1 < UPDATE_RETRIES => {
                warn!(order_id = %order_id, attempt, "version conflict, retrying update");
            }
            Err(e) => return Err(e),
        }
    }

    Err(ServiceError::ConcurrentModification(order_id))
}

/// DashMap-backed store. The shard lock taken by `entry` makes the
/// version compare-and-swap atomic.
#[derive(Default)]
pub struct InMemoryOrderStore {
    orders: DashMap<Uuid, Order>,
    numbers: DashMap<String, Uuid>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn insert(&self, order: Order) -> Result<Order, ServiceError> {
        self.numbers.insert(order.order_number.clone(), order.id);
        self.orders.insert(order.id, order.clone());
        Ok(order)
    }

    async fn find(&self, id: Uuid) -> Result<Option<Order>, ServiceError> {
        Ok(self.orders.get(&id).map(|entry| entry.value().clone()))
    }

    async fn find_by_number(&self, order_number: &str) -> Result<Option<Order>, ServiceError> {
        let Some(id) = self.numbers.get(order_number).map(|entry| *entry) else {
            return Ok(None);
        };
        self.find(id).await
    }

    async fn update(&self, mut order: Order) -> Result<Order, ServiceError> {
        match self.orders.entry(order.id) {
            dashmap::mapref::entry::Entry::Vacant(_) => {
                Err(ServiceError::NotFound(format!("Order {} not found", order.id)))
            }
            dashmap::mapref::entry::Entry::Occupied(mut entry) => {
                if entry.get().version != order.version {
                    return Err(ServiceError::ConcurrentModification(order.id));
                }
                order.version += 1;
                entry.insert(order.clone());
                Ok(order)
            }
        }
    }

    async fn list(&self, filter: &OrderFilter) -> Result<Vec<Order>, ServiceError> {
        let mut matched: Vec<Order> = self
            .orders
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::order::{
        BuyerRef, DeliveryAddress, ItemPrice, LineItem, OrderStatus, PaymentType, ShopRef,
    };
    use rust_decimal_macros::dec;

    fn item(shop_id: Uuid, approval: ApprovalStatus) -> LineItem {
        LineItem {
            product_id: Uuid::new_v4(),
            title: "Widget".to_string(),
            thumbnail: "widget.jpg".to_string(),
            quantity: 1,
            price: ItemPrice {
                regular: dec!(10.00),
                discounted: dec!(10.00),
            },
            total_price: dec!(10.00),
            shop: ShopRef {
                id: shop_id,
                name: "WidgetsCo".to_string(),
                contact: "+919999999999".to_string(),
            },
            status: LineItemStatus::Pending,
            approval,
            decided_by: None,
            rejection_reason: None,
            tracking_link: None,
            return_request: None,
        }
    }

    fn order(buyer_id: Uuid, status: OrderStatus, items: Vec<LineItem>) -> Order {
        Order::new(
            format!("order_{}", Uuid::new_v4().simple()),
            BuyerRef {
                id: buyer_id,
                role: Role::Customer,
                name: "Alice".to_string(),
                email: "alice@example.com".to_string(),
                phone: "+911234567890".to_string(),
            },
            items,
            DeliveryAddress {
                name: "Alice".to_string(),
                phone: "+911234567890".to_string(),
                house: "12A".to_string(),
                street: "Maple Street".to_string(),
                city: "Springfield".to_string(),
                state: "KA".to_string(),
                zip: "560001".to_string(),
            },
            status,
            PaymentType::CashOnDelivery,
            true,
        )
    }

    #[tokio::test]
    async fn find_by_id_and_number() {
        let store = InMemoryOrderStore::new();
        let o = order(Uuid::new_v4(), OrderStatus::Pending, vec![]);
        let id = o.id;
        let number = o.order_number.clone();
        store.insert(o).await.unwrap();

        assert!(store.find(id).await.unwrap().is_some());
        assert_eq!(store.find_by_number(&number).await.unwrap().unwrap().id, id);
        assert!(store.find_by_number("order_missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn stale_update_is_rejected() {
        let store = InMemoryOrderStore::new();
        let o = order(Uuid::new_v4(), OrderStatus::Pending, vec![]);
        let saved = store.insert(o).await.unwrap();

        let first = store.update(saved.clone()).await.unwrap();
        assert_eq!(first.version, saved.version + 1);

        // second writer still holds the old version
        let err = store.update(saved).await.unwrap_err();
        assert!(matches!(err, ServiceError::ConcurrentModification(_)));
    }

    #[tokio::test]
    async fn update_with_retries_past_a_conflict() {
        let store = InMemoryOrderStore::new();
        let o = order(Uuid::new_v4(), OrderStatus::Pending, vec![]);
        let id = o.id;
        store.insert(o).await.unwrap();

        let mut raced = false;
        let updated = update_with(&store, id, |order| {
            if !raced {
                raced = true;
                // simulate a concurrent writer landing between read and write
                let other = order.clone();
                futures::executor::block_on(store.update(other)).unwrap();
            }
            order.status = OrderStatus::ShipmentPreparation;
            Ok(())
        })
        .await
        .unwrap();

        assert_eq!(updated.status, OrderStatus::ShipmentPreparation);
        assert_eq!(updated.version, 2);
    }

    #[tokio::test]
    async fn closure_errors_abort_without_writing() {
        let store = InMemoryOrderStore::new();
        let o = order(Uuid::new_v4(), OrderStatus::Pending, vec![]);
        let id = o.id;
        store.insert(o).await.unwrap();

        let err = update_with(&store, id, |_| {
            Err(ServiceError::ValidationError("nope".to_string()))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::ValidationError(_)));
        assert_eq!(store.find(id).await.unwrap().unwrap().version, 0);
    }

    #[tokio::test]
    async fn filter_hides_provisional_orders() {
        let store = InMemoryOrderStore::new();
        let buyer = Uuid::new_v4();
        store
            .insert(order(buyer, OrderStatus::PaymentInitiated, vec![]))
            .await
            .unwrap();
        store.insert(order(buyer, OrderStatus::Pending, vec![])).await.unwrap();

        let filter = OrderFilter {
            buyer_id: Some(buyer),
            ..Default::default()
        };
        assert_eq!(store.list(&filter).await.unwrap().len(), 1);

        let all = OrderFilter {
            buyer_id: Some(buyer),
            include_provisional: true,
            ..Default::default()
        };
        assert_eq!(store.list(&all).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn filter_excludes_failed_orders_when_asked() {
        let store = InMemoryOrderStore::new();
        let buyer = Uuid::new_v4();
        store.insert(order(buyer, OrderStatus::Failed, vec![])).await.unwrap();
        store.insert(order(buyer, OrderStatus::Pending, vec![])).await.unwrap();

        let history = OrderFilter {
            buyer_id: Some(buyer),
            ..Default::default()
        };
        // failed orders still show up in plain listings
        assert_eq!(store.list(&history).await.unwrap().len(), 2);

        let inbox = OrderFilter {
            buyer_id: Some(buyer),
            exclude_failed: true,
            ..Default::default()
        };
        let listed = store.list(&inbox).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].status, OrderStatus::Pending);
    }

    #[tokio::test]
    async fn filter_matches_the_include_flag() {
        let store = InMemoryOrderStore::new();
        let buyer = Uuid::new_v4();
        let mut excluded = order(buyer, OrderStatus::Pending, vec![]);
        excluded.include = false;
        let excluded_id = excluded.id;
        store.insert(excluded).await.unwrap();
        store.insert(order(buyer, OrderStatus::Pending, vec![])).await.unwrap();

        let filter = OrderFilter {
            include: Some(false),
            ..Default::default()
        };
        let listed = store.list(&filter).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, excluded_id);
    }

    #[tokio::test]
    async fn filter_matches_item_fields_on_one_item() {
        let store = InMemoryOrderStore::new();
        let shop = Uuid::new_v4();
        store
            .insert(order(
                Uuid::new_v4(),
                OrderStatus::PartialPending,
                vec![
                    item(shop, ApprovalStatus::Approved),
                    item(Uuid::new_v4(), ApprovalStatus::Pending),
                ],
            ))
            .await
            .unwrap();

        let approved_for_shop = OrderFilter {
            shop_id: Some(shop),
            item_approval: Some(ApprovalStatus::Approved),
            ..Default::default()
        };
        assert_eq!(store.list(&approved_for_shop).await.unwrap().len(), 1);

        // the same shop has no pending items, so the inbox is empty
        let pending_for_shop = OrderFilter {
            shop_id: Some(shop),
            item_approval: Some(ApprovalStatus::Pending),
            ..Default::default()
        };
        assert!(store.list(&pending_for_shop).await.unwrap().is_empty());
    }
}
