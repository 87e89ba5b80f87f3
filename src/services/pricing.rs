use std::sync::Arc;

use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    entities::product::{self, Entity as ProductEntity},
    errors::ServiceError,
    money::Money,
};

/// A cart line as submitted by the client: a product reference and a
/// quantity, nothing more. Prices always come from the catalog.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CartItemInput {
    pub product: Uuid,
    pub quantity: i32,
}

/// Client-declared fees that pass through pricing unchanged (rounded).
#[derive(Debug, Clone, Copy, Default)]
pub struct Fees {
    pub tip: Decimal,
    pub bag_fee: Decimal,
    pub delivery_fee: Decimal,
}

/// A validated, priced line-item snapshot.
#[derive(Debug, Clone)]
pub struct PricedItem {
    pub product_id: Uuid,
    pub name: String,
    pub unit_price: Decimal,
    pub quantity: i32,
    pub image_url: Option<String>,
}

/// The canonical totals for a cart, all rounded to 2 decimals.
#[derive(Debug, Clone)]
pub struct PricedCart {
    pub items: Vec<PricedItem>,
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub tip: Decimal,
    pub bag_fee: Decimal,
    pub delivery_fee: Decimal,
    pub total: Decimal,
}

/// Recomputes cart totals from authoritative catalog prices and compares
/// them against the client-declared amount. Local and side-effect-free; it
/// never talks to the payment gateway.
#[derive(Clone)]
pub struct PricingReconciler {
    db: Arc<DatabaseConnection>,
    tax_rate: Decimal,
}

impl PricingReconciler {
    pub fn new(db: Arc<DatabaseConnection>, tax_rate: Decimal) -> Self {
        Self { db, tax_rate }
    }

    /// Price the cart and fail with `AmountMismatch` when the declared
    /// amount is off by more than one cent. Any unresolvable product
    /// aborts the whole checkout before money moves.
    #[instrument(skip(self, items, fees), fields(lines = items.len(), declared = %declared_amount))]
    pub async fn reconcile(
        &self,
        items: &[CartItemInput],
        fees: &Fees,
        declared_amount: Decimal,
    ) -> Result<PricedCart, ServiceError> {
        validate_lines(items)?;
        validate_fees(fees)?;

        let ids: Vec<Uuid> = items.iter().map(|i| i.product).collect();
        let products = ProductEntity::find()
            .filter(product::Column::Id.is_in(ids))
            .all(&*self.db)
            .await?;

        let mut priced = Vec::with_capacity(items.len());
        for item in items {
            let product = products
                .iter()
                .find(|p| p.id == item.product)
                .ok_or_else(|| ServiceError::ProductNotFound(item.product.to_string()))?;
            let unit_price = Money::from(product.sale_price.unwrap_or(product.price))
                .rounded()
                .amount();
            priced.push(PricedItem {
                product_id: product.id,
                name: product.name.clone(),
                unit_price,
                quantity: item.quantity,
                image_url: product.image_url.clone(),
            });
        }

        let cart = compute_totals(priced, fees, self.tax_rate);
        let declared = Money::from(declared_amount);
        if !Money::from(cart.total).within_one_cent(declared) {
            return Err(ServiceError::AmountMismatch {
                declared: declared_amount,
                computed: cart.total,
            });
        }
        Ok(cart)
    }
}

fn validate_lines(items: &[CartItemInput]) -> Result<(), ServiceError> {
    if items.is_empty() {
        return Err(ServiceError::InvalidCartItems(
            "cart has no items".to_string(),
        ));
    }
    if let Some(bad) = items.iter().find(|i| i.quantity <= 0) {
        return Err(ServiceError::InvalidCartItems(format!(
            "quantity {} for product {}",
            bad.quantity, bad.product
        )));
    }
    Ok(())
}

fn validate_fees(fees: &Fees) -> Result<(), ServiceError> {
    for (name, value) in [
        ("tip", fees.tip),
        ("bagFee", fees.bag_fee),
        ("deliveryFee", fees.delivery_fee),
    ] {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(ServiceError::ValidationError(format!(
                "{} must not be negative",
                name
            )));
        }
    }
    Ok(())
}

/// Deterministic total computation: each line total rounded, subtotal
/// rounded, tax rounded, fees rounded, grand total rounded.
fn compute_totals(items: Vec<PricedItem>, fees: &Fees, tax_rate: Decimal) -> PricedCart {
    let subtotal: Money = items
        .iter()
        .map(|i| Money::from(i.unit_price).times(i.quantity).rounded())
        .sum();
    let subtotal = subtotal.rounded();
    let tax = subtotal.apply_rate(tax_rate).rounded();
    let tip = Money::from(fees.tip).rounded();
    let bag_fee = Money::from(fees.bag_fee).rounded();
    let delivery_fee = Money::from(fees.delivery_fee).rounded();
    let total = (subtotal + tax + tip + bag_fee + delivery_fee).rounded();

    PricedCart {
        items,
        subtotal: subtotal.amount(),
        tax: tax.amount(),
        tip: tip.amount(),
        bag_fee: bag_fee.amount(),
        delivery_fee: delivery_fee.amount(),
        total: total.amount(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn item(price: Decimal, quantity: i32) -> PricedItem {
        PricedItem {
            product_id: Uuid::new_v4(),
            name: "Test product".to_string(),
            unit_price: price,
            quantity,
            image_url: None,
        }
    }

    #[test]
    fn two_units_at_ten_dollars_with_default_tax() {
        let cart = compute_totals(vec![item(dec!(10.00), 2)], &Fees::default(), dec!(0.08));
        assert_eq!(cart.subtotal, dec!(20.00));
        assert_eq!(cart.tax, dec!(1.60));
        assert_eq!(cart.total, dec!(21.60));
    }

    #[test]
    fn fees_are_rounded_and_added_after_tax() {
        let fees = Fees {
            tip: dec!(2.005),
            bag_fee: dec!(0.25),
            delivery_fee: dec!(4.99),
        };
        let cart = compute_totals(vec![item(dec!(10.00), 1)], &fees, dec!(0.08));
        assert_eq!(cart.tip, dec!(2.01));
        assert_eq!(cart.total, dec!(18.05)); // 10.00 + 0.80 + 2.01 + 0.25 + 4.99
    }

    #[test]
    fn totals_are_deterministic() {
        let build = || {
            compute_totals(
                vec![item(dec!(3.33), 3), item(dec!(0.10), 7)],
                &Fees::default(),
                dec!(0.08),
            )
        };
        let (a, b) = (build(), build());
        assert_eq!(a.total, b.total);
        assert_eq!(a.tax, b.tax);
    }

    #[test]
    fn rejects_empty_cart_and_bad_quantities() {
        assert!(matches!(
            validate_lines(&[]),
            Err(ServiceError::InvalidCartItems(_))
        ));
        assert!(matches!(
            validate_lines(&[CartItemInput {
                product: Uuid::new_v4(),
                quantity: 0,
            }]),
            Err(ServiceError::InvalidCartItems(_))
        ));
    }

    #[test]
    fn rejects_negative_fees() {
        let fees = Fees {
            tip: dec!(-1.00),
            ..Fees::default()
        };
        assert!(matches!(
            validate_fees(&fees),
            Err(ServiceError::ValidationError(_))
        ));
    }
}
