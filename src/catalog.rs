use async_trait::async_trait;
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::models::order::{DeliveryAddress, ShopRef};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StockStatus {
    InStock,
    OutOfStock,
}

/// Quantity-break price. Tiers are stored in listing order; resolution takes
/// the last tier whose threshold the purchased quantity meets.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PriceTier {
    pub min_quantity: u32,
    pub price: Decimal,
}

/// Catalog view of a product, the subset the order engine needs.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub title: String,
    pub thumbnail: String,
    pub shop: ShopRef,
    pub regular_price: Decimal,
    pub discounted_price: Decimal,
    pub price_tiers: Vec<PriceTier>,
    /// Per-order purchase cap; cart lines at or above this are dropped.
    pub max_quantity: u32,
    pub stock: StockStatus,
    pub deleted: bool,
}

impl Product {
    pub fn is_purchasable(&self) -> bool {
        !self.deleted && self.stock == StockStatus::InStock
    }
}

/// One line of a customer's cart as the directory reports it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: Uuid,
    pub quantity: u32,
}

/// Product lookups against the catalog service.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Fetches a product by id. Missing and soft-deleted products both
    /// surface as `Ok(None)`.
    async fn product(&self, id: Uuid) -> Result<Option<Product>, ServiceError>;
}

/// Customer-profile lookups: cart contents and the delivery address book.
#[async_trait]
pub trait CustomerDirectory: Send + Sync {
    async fn cart(&self, customer_id: Uuid) -> Result<Vec<CartLine>, ServiceError>;

    /// The customer's most recently used delivery address, if any.
    async fn recent_address(&self, customer_id: Uuid) -> Result<Option<DeliveryAddress>, ServiceError>;

    /// Empties the cart once an order has been placed.
    async fn clear_cart(&self, customer_id: Uuid) -> Result<(), ServiceError>;
}

/// In-memory catalog used by tests and the standalone binary.
#[derive(Default)]
pub struct InMemoryCatalog {
    products: DashMap<Uuid, Product>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, product: Product) {
        self.products.insert(product.id, product);
    }

    pub fn remove(&self, id: Uuid) {
        self.products.remove(&id);
    }
}

#[async_trait]
impl Catalog for InMemoryCatalog {
    async fn product(&self, id: Uuid) -> Result<Option<Product>, ServiceError> {
        Ok(self
            .products
            .get(&id)
            .map(|entry| entry.value().clone())
            .filter(|p| !p.deleted))
    }
}

/// In-memory customer directory backing tests and the standalone binary.
#[derive(Default)]
pub struct InMemoryCustomerDirectory {
    carts: DashMap<Uuid, Vec<CartLine>>,
    addresses: DashMap<Uuid, DeliveryAddress>,
}

impl InMemoryCustomerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_cart(&self, customer_id: Uuid, lines: Vec<CartLine>) {
        self.carts.insert(customer_id, lines);
    }

    pub fn set_address(&self, customer_id: Uuid, address: DeliveryAddress) {
        self.addresses.insert(customer_id, address);
    }
}

#[async_trait]
impl CustomerDirectory for InMemoryCustomerDirectory {
    async fn cart(&self, customer_id: Uuid) -> Result<Vec<CartLine>, ServiceError> {
        Ok(self
            .carts
            .get(&customer_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default())
    }

    async fn recent_address(&self, customer_id: Uuid) -> Result<Option<DeliveryAddress>, ServiceError> {
        Ok(self.addresses.get(&customer_id).map(|entry| entry.value().clone()))
    }

    async fn clear_cart(&self, customer_id: Uuid) -> Result<(), ServiceError> {
        self.carts.remove(&customer_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn product(deleted: bool, stock: StockStatus) -> Product {
        Product {
            id: Uuid::new_v4(),
            title: "Widget".to_string(),
            thumbnail: "widget.jpg".to_string(),
            shop: ShopRef {
                id: Uuid::new_v4(),
                name: "WidgetsCo".to_string(),
                contact: "+919999999999".to_string(),
            },
            regular_price: dec!(12.00),
            discounted_price: dec!(10.00),
            price_tiers: vec![],
            max_quantity: 10,
            stock,
            deleted,
        }
    }

    #[tokio::test]
    async fn deleted_products_are_invisible() {
        let catalog = InMemoryCatalog::new();
        let p = product(true, StockStatus::InStock);
        let id = p.id;
        catalog.insert(p);
        assert!(catalog.product(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn out_of_stock_products_are_visible_but_not_purchasable() {
        let catalog = InMemoryCatalog::new();
        let p = product(false, StockStatus::OutOfStock);
        let id = p.id;
        catalog.insert(p);
        let found = catalog.product(id).await.unwrap().unwrap();
        assert!(!found.is_purchasable());
    }

    #[tokio::test]
    async fn clearing_a_cart_leaves_it_empty() {
        let directory = InMemoryCustomerDirectory::new();
        let customer = Uuid::new_v4();
        directory.set_cart(
            customer,
            vec![CartLine {
                product_id: Uuid::new_v4(),
                quantity: 2,
            }],
        );
        assert_eq!(directory.cart(customer).await.unwrap().len(), 1);
        directory.clear_cart(customer).await.unwrap();
        assert!(directory.cart(customer).await.unwrap().is_empty());
    }
}
