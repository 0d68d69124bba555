//! Product Model

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Product entity as seen by the stock engine
///
/// `stock_quantity` is the authoritative sellable quantity. It is only ever
/// changed through conditional updates keyed on a previously observed value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub seller_id: i64,
    pub price: Decimal,
    pub stock_quantity: i32,
}

/// Result of a pure stock read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockCheck {
    pub available: bool,
    pub current_stock: i32,
}

/// Low stock alert entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LowStockAlert {
    pub product_id: i64,
    pub name: String,
    pub seller_id: i64,
    pub stock_quantity: i32,
}

impl From<&Product> for LowStockAlert {
    fn from(p: &Product) -> Self {
        Self {
            product_id: p.id,
            name: p.name.clone(),
            seller_id: p.seller_id,
            stock_quantity: p.stock_quantity,
        }
    }
}
