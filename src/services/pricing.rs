use rust_decimal::Decimal;

use crate::catalog::Product;

/// Resolves the effective unit price for a purchase quantity.
///
/// The discounted price applies when set, otherwise the regular price. Price
/// tiers are then scanned in listing order and the last tier whose
/// `min_quantity` the purchase meets overrides the base price.
pub fn resolve_unit_price(product: &Product, quantity: u32) -> Decimal {
    let mut price = if product.discounted_price > Decimal::ZERO {
        product.discounted_price
    } else {
        product.regular_price
    };

    for tier in &product.price_tiers {
        if quantity >= tier.min_quantity {
            price = tier.price;
        }
    }

    price
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{PriceTier, StockStatus};
    use crate::models::order::ShopRef;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn product(discounted: Decimal, tiers: Vec<PriceTier>) -> Product {
        Product {
            id: Uuid::new_v4(),
            title: "Widget".to_string(),
            thumbnail: "widget.jpg".to_string(),
            shop: ShopRef {
                id: Uuid::new_v4(),
                name: "WidgetsCo".to_string(),
                contact: "+919999999999".to_string(),
            },
            regular_price: dec!(20.00),
            discounted_price: discounted,
            price_tiers: tiers,
            max_quantity: 100,
            stock: StockStatus::InStock,
            deleted: false,
        }
    }

    #[test]
    fn discounted_price_wins_over_regular() {
        let p = product(dec!(15.00), vec![]);
        assert_eq!(resolve_unit_price(&p, 1), dec!(15.00));
    }

    #[test]
    fn regular_price_applies_when_no_discount() {
        let p = product(Decimal::ZERO, vec![]);
        assert_eq!(resolve_unit_price(&p, 1), dec!(20.00));
    }

    #[test]
    fn last_matching_tier_wins() {
        let p = product(
            dec!(15.00),
            vec![
                PriceTier {
                    min_quantity: 5,
                    price: dec!(13.00),
                },
                PriceTier {
                    min_quantity: 10,
                    price: dec!(11.00),
                },
            ],
        );
        assert_eq!(resolve_unit_price(&p, 4), dec!(15.00));
        assert_eq!(resolve_unit_price(&p, 5), dec!(13.00));
        assert_eq!(resolve_unit_price(&p, 10), dec!(11.00));
        assert_eq!(resolve_unit_price(&p, 50), dec!(11.00));
    }

    #[test]
    fn threshold_is_inclusive() {
        let p = product(
            dec!(15.00),
            vec![PriceTier {
                min_quantity: 3,
                price: dec!(14.00),
            }],
        );
        assert_eq!(resolve_unit_price(&p, 2), dec!(15.00));
        assert_eq!(resolve_unit_price(&p, 3), dec!(14.00));
    }
}
