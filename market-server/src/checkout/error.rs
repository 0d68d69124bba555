//! Checkout error taxonomy
//!
//! Every kind is decided where it is raised; nothing here inspects messages.

use crate::ledger::LedgerError;
use crate::orders::CommitError;
use crate::payment::PaymentError;
use crate::stock::StockError;
use shared::error::{AppError, ErrorCode};
use shared::models::{StockIssue, StockIssueKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("Not signed in")]
    Unauthenticated,

    #[error("Cart is empty")]
    EmptyCart,

    #[error("Product {0} not found")]
    ProductNotFound(i64),

    #[error("Invalid cart: {0}")]
    InvalidCart(String),

    /// One or more lines cannot be bought as requested
    #[error("{}", blocked_message(.0))]
    Blocked(Vec<StockIssue>),

    /// Stock changed underneath us; retry with a fresh read
    #[error("Stock for product {product_id} changed, please try again")]
    Conflict { product_id: i64 },

    #[error(transparent)]
    Payment(#[from] PaymentError),

    /// Payment succeeded but the verifier could not be asked and policy blocks
    #[error("Payment {reference} could not be verified right now")]
    VerificationUnavailable { reference: String },

    #[error("Order {order_id} was only partially saved")]
    PartialCommit { order_id: i64 },

    #[error(transparent)]
    Stock(StockError),

    #[error(transparent)]
    Commit(CommitError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl CheckoutError {
    /// Whether the buyer may simply try again
    pub fn is_retryable(&self) -> bool {
        match self {
            CheckoutError::Conflict { .. } | CheckoutError::VerificationUnavailable { .. } => true,
            CheckoutError::Payment(e) => matches!(
                e,
                PaymentError::Cancelled { .. }
                    | PaymentError::Declined { .. }
                    | PaymentError::VerifierUnavailable(_)
                    | PaymentError::Provider(_)
            ),
            CheckoutError::Stock(e) => e.is_retryable(),
            CheckoutError::Ledger(LedgerError::Unavailable(_)) => true,
            _ => false,
        }
    }
}

impl From<StockError> for CheckoutError {
    fn from(err: StockError) -> Self {
        match err {
            StockError::NotFound(id) => CheckoutError::ProductNotFound(id),
            StockError::Conflict { product_id } => CheckoutError::Conflict { product_id },
            StockError::Ledger(e) => CheckoutError::Ledger(e),
            other => CheckoutError::Stock(other),
        }
    }
}

impl From<CommitError> for CheckoutError {
    fn from(err: CommitError) -> Self {
        match err {
            CommitError::PartialCommit { order_id, .. } => CheckoutError::PartialCommit { order_id },
            CommitError::Stock(e) => e.into(),
            CommitError::Ledger(e) => CheckoutError::Ledger(e),
            other => CheckoutError::Commit(other),
        }
    }
}

fn blocked_message(issues: &[StockIssue]) -> String {
    let lines: Vec<String> = issues
        .iter()
        .map(|issue| match issue.kind {
            StockIssueKind::OutOfStock => format!("{} is out of stock", issue.name),
            StockIssueKind::Insufficient => {
                format!("{} has only {} left", issue.name, issue.available)
            }
            StockIssueKind::PriceChanged => match issue.current_price {
                Some(price) => format!("{} now costs {price}", issue.name),
                None => format!("{} has a new price", issue.name),
            },
        })
        .collect();
    format!("Please update your cart: {}", lines.join("; "))
}

impl From<CheckoutError> for AppError {
    fn from(err: CheckoutError) -> Self {
        let retryable = err.is_retryable();
        let app = match err {
            CheckoutError::Unauthenticated => AppError::not_authenticated(),
            CheckoutError::EmptyCart => AppError::new(ErrorCode::CartEmpty),
            CheckoutError::ProductNotFound(id) => {
                AppError::new(ErrorCode::ProductNotFound).with_detail("product_id", id)
            }
            CheckoutError::InvalidCart(msg) => AppError::validation(msg),
            CheckoutError::Blocked(ref issues) => {
                let lines = serde_json::to_value(issues).unwrap_or_default();
                AppError::with_message(ErrorCode::CheckoutBlocked, err.to_string())
                    .with_detail("lines", lines)
            }
            CheckoutError::Conflict { product_id } => AppError::stock_conflict(product_id),
            CheckoutError::Payment(e) => e.into(),
            CheckoutError::VerificationUnavailable { reference } => {
                AppError::new(ErrorCode::PaymentVerificationUnavailable)
                    .with_detail("reference", reference)
            }
            CheckoutError::PartialCommit { order_id } => {
                AppError::new(ErrorCode::OrderPartialCommit).with_detail("order_id", order_id)
            }
            CheckoutError::Stock(e) => e.into(),
            CheckoutError::Commit(e) => e.into(),
            CheckoutError::Ledger(e) => e.into(),
        };
        app.with_detail("retryable", retryable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issue(name: &str, kind: StockIssueKind, available: i32) -> StockIssue {
        StockIssue {
            product_id: 1,
            name: name.into(),
            requested: 3,
            available,
            kind,
            current_price: None,
        }
    }

    #[test]
    fn test_blocked_lists_every_line_by_name() {
        let err = CheckoutError::Blocked(vec![
            issue("Kente Scarf", StockIssueKind::OutOfStock, 0),
            issue("Shea Butter", StockIssueKind::Insufficient, 2),
        ]);
        let message = err.to_string();
        assert!(message.contains("Kente Scarf is out of stock"));
        assert!(message.contains("Shea Butter has only 2 left"));

        let app: AppError = err.into();
        assert_eq!(app.code, ErrorCode::CheckoutBlocked);
        let details = app.details.unwrap();
        assert_eq!(details["lines"].as_array().unwrap().len(), 2);
        assert_eq!(details["retryable"], false);
    }

    #[test]
    fn test_payment_cancel_is_retryable() {
        let err = CheckoutError::Payment(PaymentError::Cancelled {
            reference: "R".into(),
        });
        assert!(err.is_retryable());
        let app: AppError = err.into();
        assert_eq!(app.code, ErrorCode::PaymentCancelled);
    }

    #[test]
    fn test_stock_conflict_maps_to_checkout_conflict() {
        let err: CheckoutError = StockError::Conflict { product_id: 4 }.into();
        assert!(matches!(err, CheckoutError::Conflict { product_id: 4 }));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_verification_failure_is_terminal() {
        let err = CheckoutError::Payment(PaymentError::VerificationFailed {
            reference: "R".into(),
            reason: "not paid".into(),
        });
        assert!(!err.is_retryable());
    }
}
