//! Cart validation against current stock

use super::error::CheckoutError;
use crate::orders::PricedLine;
use rust_decimal::Decimal;
use shared::models::{CartLine, Product, StockIssue, StockIssueKind};
use std::collections::HashMap;

/// Maximum allowed quantity per line
pub const MAX_QUANTITY: i32 = 9999;
/// Maximum allowed unit price
const MAX_PRICE: Decimal = Decimal::from_parts(1_000_000, 0, 0, false, 0);

/// Cart lines joined with catalog data, plus any stock problems found
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedCart {
    pub lines: Vec<PricedLine>,
    pub issues: Vec<StockIssue>,
}

impl ValidatedCart {
    pub fn is_blocked(&self) -> bool {
        !self.issues.is_empty()
    }
}

/// Validate one cart line's own fields
pub fn validate_cart_line(line: &CartLine) -> Result<(), CheckoutError> {
    if line.quantity <= 0 {
        return Err(CheckoutError::InvalidCart(format!(
            "quantity must be positive, got {} for product {}",
            line.quantity, line.product_id
        )));
    }
    if line.quantity > MAX_QUANTITY {
        return Err(CheckoutError::InvalidCart(format!(
            "quantity exceeds maximum allowed ({MAX_QUANTITY}), got {}",
            line.quantity
        )));
    }
    if let Some(price) = line.unit_price
        && (price.is_sign_negative() || price > MAX_PRICE)
    {
        return Err(CheckoutError::InvalidCart(format!(
            "unit price out of range for product {}: {price}",
            line.product_id
        )));
    }
    Ok(())
}

/// Merge repeated products, keeping the first price snapshot
pub fn merge_lines(cart: &[CartLine]) -> Result<Vec<CartLine>, CheckoutError> {
    let mut merged: Vec<CartLine> = Vec::with_capacity(cart.len());
    let mut index: HashMap<i64, usize> = HashMap::new();
    for line in cart {
        validate_cart_line(line)?;
        match index.get(&line.product_id) {
            Some(&i) => {
                let quantity = merged[i].quantity + line.quantity;
                if quantity > MAX_QUANTITY {
                    return Err(CheckoutError::InvalidCart(format!(
                        "quantity exceeds maximum allowed ({MAX_QUANTITY}) for product {}",
                        line.product_id
                    )));
                }
                merged[i].quantity = quantity;
            }
            None => {
                index.insert(line.product_id, merged.len());
                merged.push(line.clone());
            }
        }
    }
    Ok(merged)
}

/// Classify every line against the quantities just read
///
/// Zero stock is a hard block (`out_of_stock`), positive but short stock a
/// soft one (`insufficient`). Quantities are never reduced silently. Lines
/// are priced from the catalog; a buyer snapshot that no longer matches is
/// reported as `price_changed` so the buyer confirms the new price.
pub fn validate_cart(cart: &[CartLine], products: &[Product]) -> Result<ValidatedCart, CheckoutError> {
    let merged = merge_lines(cart)?;
    let by_id: HashMap<i64, &Product> = products.iter().map(|p| (p.id, p)).collect();

    let mut lines = Vec::with_capacity(merged.len());
    let mut issues = Vec::new();

    for line in merged {
        let product = by_id
            .get(&line.product_id)
            .ok_or(CheckoutError::ProductNotFound(line.product_id))?;

        let available = product.stock_quantity;
        if available <= 0 {
            issues.push(issue(product, &line, StockIssueKind::OutOfStock));
        } else if line.quantity > available {
            issues.push(issue(product, &line, StockIssueKind::Insufficient));
        } else if line.unit_price.is_some_and(|seen| seen != product.price) {
            issues.push(StockIssue {
                current_price: Some(product.price),
                ..issue(product, &line, StockIssueKind::PriceChanged)
            });
        }

        lines.push(PricedLine {
            product_id: product.id,
            name: product.name.clone(),
            seller_id: product.seller_id,
            quantity: line.quantity,
            unit_price: product.price,
        });
    }

    Ok(ValidatedCart { lines, issues })
}

fn issue(product: &Product, line: &CartLine, kind: StockIssueKind) -> StockIssue {
    StockIssue {
        product_id: product.id,
        name: product.name.clone(),
        requested: line.quantity,
        available: product.stock_quantity.max(0),
        kind,
        current_price: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn product(id: i64, stock: i32) -> Product {
        Product {
            id,
            name: format!("Product {id}"),
            seller_id: 3,
            price: dec!(10),
            stock_quantity: stock,
        }
    }

    fn cart_line(product_id: i64, quantity: i32) -> CartLine {
        CartLine {
            product_id,
            quantity,
            unit_price: Some(dec!(10)),
        }
    }

    #[test]
    fn test_classifies_hard_and_soft_blocks() {
        let products = [product(1, 0), product(2, 2), product(3, 10)];
        let cart = [cart_line(1, 1), cart_line(2, 3), cart_line(3, 10)];
        let validated = validate_cart(&cart, &products).unwrap();

        assert!(validated.is_blocked());
        assert_eq!(validated.issues.len(), 2);
        assert_eq!(validated.issues[0].kind, StockIssueKind::OutOfStock);
        assert!(validated.issues[0].is_hard_block());
        assert_eq!(validated.issues[1].kind, StockIssueKind::Insufficient);
        assert_eq!(validated.issues[1].available, 2);
        // Requested quantity is kept as-is
        assert_eq!(validated.lines[1].quantity, 3);
    }

    #[test]
    fn test_lines_priced_from_catalog() {
        let mut cheap = cart_line(1, 2);
        cheap.unit_price = Some(dec!(0.01));
        let validated = validate_cart(&[cheap], &[product(1, 5)]).unwrap();

        assert_eq!(validated.lines[0].unit_price, dec!(10));
        assert_eq!(validated.issues.len(), 1);
        assert_eq!(validated.issues[0].kind, StockIssueKind::PriceChanged);
        assert_eq!(validated.issues[0].current_price, Some(dec!(10)));
        assert!(!validated.issues[0].is_hard_block());

        let mut unseen = cart_line(1, 2);
        unseen.unit_price = None;
        let validated = validate_cart(&[unseen], &[product(1, 5)]).unwrap();
        assert!(!validated.is_blocked());
        assert_eq!(validated.lines[0].unit_price, dec!(10));
    }

    #[test]
    fn test_missing_product() {
        let result = validate_cart(&[cart_line(9, 1)], &[product(1, 5)]);
        assert!(matches!(result, Err(CheckoutError::ProductNotFound(9))));
    }

    #[test]
    fn test_duplicate_lines_are_merged_before_checking() {
        let validated = validate_cart(&[cart_line(1, 2), cart_line(1, 2)], &[product(1, 3)]).unwrap();
        assert_eq!(validated.lines.len(), 1);
        assert_eq!(validated.lines[0].quantity, 4);
        assert_eq!(validated.issues[0].kind, StockIssueKind::Insufficient);
    }

    #[test]
    fn test_rejects_bad_quantities() {
        assert!(validate_cart_line(&cart_line(1, 0)).is_err());
        assert!(validate_cart_line(&cart_line(1, MAX_QUANTITY + 1)).is_err());
        let negative = CartLine {
            product_id: 1,
            quantity: 1,
            unit_price: Some(dec!(-1)),
        };
        assert!(validate_cart_line(&negative).is_err());
    }
}
