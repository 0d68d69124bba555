//! Cart input and stock validation results

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One cart line as submitted by the buyer's session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: i64,
    pub quantity: i32,
    /// Price the buyer last saw; the catalog price is charged regardless
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_price: Option<Decimal>,
}

/// Why a cart line cannot be checked out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockIssueKind {
    /// Stock is zero, the line must be removed
    OutOfStock,
    /// Stock is positive but below the requested quantity
    Insufficient,
    /// Catalog price differs from the buyer's snapshot
    PriceChanged,
}

/// A blocking problem on one cart line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockIssue {
    pub product_id: i64,
    pub name: String,
    pub requested: i32,
    pub available: i32,
    pub kind: StockIssueKind,
    /// Catalog price, set for `price_changed`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_price: Option<Decimal>,
}

impl StockIssue {
    /// Hard blocks require removing the line; soft ones a smaller quantity or a new price
    pub fn is_hard_block(&self) -> bool {
        self.kind == StockIssueKind::OutOfStock
    }
}
