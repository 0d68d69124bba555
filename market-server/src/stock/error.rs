//! Stock error taxonomy

use crate::ledger::LedgerError;
use shared::error::{AppError, ErrorCode};
use shared::models::OrderStatus;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StockError {
    #[error("Product {0} not found")]
    NotFound(i64),

    #[error("Invalid quantity {0}, must be positive")]
    InvalidQuantity(i32),

    /// Soft block: the buyer can lower the quantity
    #[error("Insufficient stock for product {product_id}: requested {requested}, available {current_stock}")]
    Insufficient {
        product_id: i64,
        requested: i32,
        current_stock: i32,
    },

    /// Another writer changed the quantity between read and conditional update
    #[error("Stock for product {product_id} changed concurrently")]
    Conflict { product_id: i64 },

    #[error("Reservation {0} not found")]
    ReservationNotFound(i64),

    #[error("Reservation {0} already expired")]
    ReservationExpired(i64),

    #[error("Order {0} not found")]
    OrderNotFound(i64),

    #[error("Order {0} is already cancelled")]
    OrderAlreadyCancelled(i64),

    #[error("Order {order_id} cannot be cancelled in status {status}")]
    OrderNotCancellable { order_id: i64, status: OrderStatus },

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl StockError {
    /// Whether a fresh attempt may succeed without buyer action
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StockError::Conflict { .. } | StockError::Ledger(LedgerError::Unavailable(_))
        )
    }
}

pub type StockResult<T> = Result<T, StockError>;

impl From<StockError> for AppError {
    fn from(err: StockError) -> Self {
        match err {
            StockError::NotFound(id) => {
                AppError::new(ErrorCode::ProductNotFound).with_detail("product_id", id)
            }
            StockError::InvalidQuantity(q) => {
                AppError::with_message(ErrorCode::ValueOutOfRange, err.to_string())
                    .with_detail("quantity", q)
            }
            StockError::Insufficient {
                product_id,
                requested,
                current_stock,
            } => {
                if current_stock == 0 {
                    AppError::new(ErrorCode::ProductOutOfStock).with_detail("product_id", product_id)
                } else {
                    AppError::insufficient_stock(product_id, requested, current_stock)
                }
            }
            StockError::Conflict { product_id } => AppError::stock_conflict(product_id),
            StockError::ReservationNotFound(id) => {
                AppError::new(ErrorCode::ReservationNotFound).with_detail("reservation_id", id)
            }
            StockError::ReservationExpired(id) => {
                AppError::new(ErrorCode::ReservationExpired).with_detail("reservation_id", id)
            }
            StockError::OrderNotFound(id) => {
                AppError::new(ErrorCode::OrderNotFound).with_detail("order_id", id)
            }
            StockError::OrderAlreadyCancelled(id) => {
                AppError::new(ErrorCode::OrderAlreadyCancelled).with_detail("order_id", id)
            }
            StockError::OrderNotCancellable { order_id, status } => {
                AppError::new(ErrorCode::OrderNotCancellable)
                    .with_detail("order_id", order_id)
                    .with_detail("status", status.as_str())
            }
            StockError::Ledger(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_stock_maps_to_out_of_stock() {
        let err: AppError = StockError::Insufficient {
            product_id: 1,
            requested: 2,
            current_stock: 0,
        }
        .into();
        assert_eq!(err.code, ErrorCode::ProductOutOfStock);

        let err: AppError = StockError::Insufficient {
            product_id: 1,
            requested: 2,
            current_stock: 1,
        }
        .into();
        assert_eq!(err.code, ErrorCode::StockInsufficient);
    }

    #[test]
    fn test_conflict_is_retryable() {
        assert!(StockError::Conflict { product_id: 1 }.is_retryable());
        assert!(!StockError::NotFound(1).is_retryable());
    }
}
