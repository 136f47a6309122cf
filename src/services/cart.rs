use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::catalog::{Catalog, CustomerDirectory};
use crate::errors::ServiceError;
use crate::models::order::{
    ApprovalStatus, DeliveryAddress, ItemPrice, LineItem, LineItemStatus,
};
use crate::services::pricing::resolve_unit_price;

/// Priced, validated copy of a cart, ready to become an order.
#[derive(Clone, Debug)]
pub struct CartSnapshot {
    pub line_items: Vec<LineItem>,
    pub delivery_address: DeliveryAddress,
    pub total_amount: Decimal,
}

/// Builds order line items from cart contents. Read-only: neither the cart
/// nor the catalog is modified here.
pub struct CartService {
    catalog: Arc<dyn Catalog>,
    directory: Arc<dyn CustomerDirectory>,
}

impl CartService {
    pub fn new(catalog: Arc<dyn Catalog>, directory: Arc<dyn CustomerDirectory>) -> Self {
        Self { catalog, directory }
    }

    /// Snapshots the customer's cart. Lines whose product is missing, no
    /// longer in stock, or whose quantity reaches the per-order cap are
    /// dropped rather than failing the whole checkout.
    #[instrument(skip(self))]
    pub async fn snapshot(&self, customer_id: Uuid) -> Result<CartSnapshot, ServiceError> {
        let delivery_address = self
            .directory
            .recent_address(customer_id)
            .await?
            .ok_or(ServiceError::NoDeliveryAddress)?;

        let cart = self.directory.cart(customer_id).await?;

        let mut line_items = Vec::with_capacity(cart.len());
        for line in cart {
            let Some(product) = self.catalog.product(line.product_id).await? else {
                debug!(product_id = %line.product_id, "skipping cart line, product unavailable");
                continue;
            };
            if !product.is_purchasable() || line.quantity >= product.max_quantity {
                debug!(product_id = %product.id, "skipping cart line, not purchasable at this quantity");
                continue;
            }

            let unit_price = resolve_unit_price(&product, line.quantity);
            line_items.push(LineItem {
                product_id: product.id,
                title: product.title.clone(),
                thumbnail: product.thumbnail.clone(),
                quantity: line.quantity,
                price: ItemPrice {
                    regular: product.regular_price,
                    discounted: unit_price,
                },
                total_price: unit_price * Decimal::from(line.quantity),
                shop: product.shop.clone(),
                status: LineItemStatus::Pending,
                approval: ApprovalStatus::Pending,
                decided_by: None,
                rejection_reason: None,
                tracking_link: None,
                return_request: None,
            });
        }

        if line_items.is_empty() {
            return Err(ServiceError::EmptyOrder);
        }

        let total_amount = line_items.iter().map(|item| item.total_price).sum();
        Ok(CartSnapshot {
            line_items,
            delivery_address,
            total_amount,
        })
    }
}
