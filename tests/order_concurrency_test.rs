use std::sync::Arc;

use rust_decimal_macros::dec;
use uuid::Uuid;

use bazaar_api::auth::{AuthUser, Role};
use bazaar_api::events::event_channel;
use bazaar_api::models::order::{
    ApprovalStatus, BuyerRef, DeliveryAddress, ItemPrice, LineItem, LineItemStatus, Order,
    OrderStatus, PaymentType, ShopRef,
};
use bazaar_api::repositories::{update_with, InMemoryOrderStore, OrderStore};
use bazaar_api::services::approvals::ApprovalService;
use bazaar_api::services::fulfillment::FulfillmentService;

fn item(shop_id: Uuid, approval: ApprovalStatus, status: LineItemStatus) -> LineItem {
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
        status,
        approval,
        decided_by: None,
        rejection_reason: None,
        tracking_link: None,
        return_request: None,
    }
}

fn order(status: OrderStatus, items: Vec<LineItem>) -> Order {
    Order::new(
        format!("order_{}", Uuid::new_v4().simple()),
        BuyerRef {
            id: Uuid::new_v4(),
            role: Role::Customer,
            name: "Test User".to_string(),
            email: "test@example.com".to_string(),
            phone: "+911234567890".to_string(),
        },
        items,
        DeliveryAddress {
            name: "Test User".to_string(),
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

fn shop_user(shop_id: Uuid) -> AuthUser {
    AuthUser {
        id: Uuid::new_v4(),
        name: "Keeper".to_string(),
        role: Role::ShopUser,
        shop_id: Some(shop_id),
    }
}

fn drain_events() -> bazaar_api::events::EventSender {
    let (events, mut rx) = event_channel(256);
    tokio::spawn(async move { while rx.recv().await.is_some() {} });
    events
}

#[tokio::test]
async fn concurrent_approvals_on_different_items_both_land() {
    let store = Arc::new(InMemoryOrderStore::new());
    let shop = Uuid::new_v4();
    let items = vec![
        item(shop, ApprovalStatus::Pending, LineItemStatus::Pending),
        item(shop, ApprovalStatus::Pending, LineItemStatus::Pending),
    ];
    let products: Vec<Uuid> = items.iter().map(|i| i.product_id).collect();
    let o = order(OrderStatus::Pending, items);
    let id = o.id;
    store.insert(o).await.unwrap();

    let service = Arc::new(ApprovalService::new(store.clone(), drain_events()));
    let actor = shop_user(shop);

    let a = {
        let service = service.clone();
        let actor = actor.clone();
        let key = id.to_string();
        let product = products[0];
        tokio::spawn(async move { service.approve(&actor, &key, product).await })
    };
    let b = {
        let service = service.clone();
        let actor = actor.clone();
        let key = id.to_string();
        let product = products[1];
        tokio::spawn(async move { service.approve(&actor, &key, product).await })
    };
    a.await.unwrap().unwrap();
    b.await.unwrap().unwrap();

    let final_order = store.find(id).await.unwrap().unwrap();
    for product in &products {
        assert_eq!(
            final_order.line_item(*product).unwrap().approval,
            ApprovalStatus::Approved
        );
    }
    // the first decision moved the order to partial-pending; the rank lock
    // keeps the later full-coverage pending candidate from walking it back
    assert_eq!(final_order.status, OrderStatus::PartialPending);
    assert_eq!(final_order.version, 2);
}

#[tokio::test]
async fn concurrent_fulfillment_advances_all_persist() {
    let store = Arc::new(InMemoryOrderStore::new());
    let shop = Uuid::new_v4();
    let items: Vec<LineItem> = (0..8)
        .map(|_| item(shop, ApprovalStatus::Approved, LineItemStatus::Pending))
        .collect();
    let products: Vec<Uuid> = items.iter().map(|i| i.product_id).collect();
    let o = order(OrderStatus::Pending, items);
    let id = o.id;
    store.insert(o).await.unwrap();

    let service = Arc::new(FulfillmentService::new(store.clone(), drain_events()));
    let actor = shop_user(shop);

    let mut handles = Vec::new();
    for product in &products {
        let service = service.clone();
        let actor = actor.clone();
        let key = id.to_string();
        let product = *product;
        handles.push(tokio::spawn(async move {
            service
                .advance(&actor, &key, product, LineItemStatus::ShipmentPreparation)
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let final_order = store.find(id).await.unwrap().unwrap();
    assert_eq!(final_order.version, 8);
    for product in &products {
        assert_eq!(
            final_order.line_item(*product).unwrap().status,
            LineItemStatus::ShipmentPreparation
        );
    }
    assert_eq!(final_order.status, OrderStatus::PartialShipmentPreparation);
}

#[tokio::test]
async fn version_checked_writes_never_lose_an_update() {
    let store = Arc::new(InMemoryOrderStore::new());
    let shop = Uuid::new_v4();
    let single = item(shop, ApprovalStatus::Approved, LineItemStatus::Shipped);
    let product = single.product_id;
    let o = order(OrderStatus::Shipped, vec![single]);
    let id = o.id;
    store.insert(o).await.unwrap();

    let mut handles = Vec::new();
    for i in 0..8u32 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            update_with(store.as_ref(), id, |order| {
                let item = order.line_item_mut(product).unwrap();
                item.tracking_link = Some(format!("https://track.example/{i}"));
                Ok(())
            })
            .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let final_order = store.find(id).await.unwrap().unwrap();
    // every writer's compare-and-swap landed exactly once
    assert_eq!(final_order.version, 8);
    assert!(final_order
        .line_item(product)
        .unwrap()
        .tracking_link
        .is_some());
}
