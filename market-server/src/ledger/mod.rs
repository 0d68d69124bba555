//! Ledger Store - the remote record store behind the stock engine
//!
//! Holds `products`, `stock_reservations`, `orders` and `order_items`.
//! Many storefront instances read and write the same rows concurrently, so
//! every stock decrement goes through a conditional update that reports the
//! affected row count. There is no cross-table transaction in this interface
//! on purpose: callers compose multi-step writes as sagas.
//!
//! # Implementations
//!
//! - [`PgLedger`] - PostgreSQL via sqlx (production)
//! - [`MemoryLedger`] - in-process maps with the same semantics (tests, local dev)

pub mod memory;
pub mod postgres;

pub use memory::MemoryLedger;
pub use postgres::PgLedger;

use async_trait::async_trait;
use shared::error::AppError;
use shared::models::{
    NewOrder, NewOrderItem, NewReservation, Order, OrderItem, OrderStatus, PaymentStatus, Product,
    Reservation, ReservationStatus,
};
use std::sync::Arc;
use thiserror::Error;

/// Ledger error types
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Ledger unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for LedgerError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                LedgerError::Unavailable(err.to_string())
            }
            other => LedgerError::Database(other.to_string()),
        }
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        tracing::error!(error = %err, "Ledger error");
        AppError::database(err.to_string())
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Shared handle used by every component
pub type SharedLedger = Arc<dyn LedgerStore>;

#[async_trait]
pub trait LedgerStore: Send + Sync {
    // ── Products ──

    /// Point read by id
    async fn find_product(&self, id: i64) -> LedgerResult<Option<Product>>;

    /// List read filtered by id-set (missing ids are simply absent)
    async fn find_products(&self, ids: &[i64]) -> LedgerResult<Vec<Product>>;

    /// `stock_quantity := new_quantity WHERE stock_quantity = expected`
    ///
    /// Returns the affected row count; 0 means another writer got there first.
    async fn update_stock_if(
        &self,
        id: i64,
        expected: i32,
        new_quantity: i32,
    ) -> LedgerResult<u64>;

    /// Commit-time decrement:
    /// `stock_quantity := expected - quantity WHERE stock_quantity = expected
    ///  AND stock_quantity > quantity - 1`
    async fn decrement_stock_guarded(
        &self,
        id: i64,
        expected: i32,
        quantity: i32,
    ) -> LedgerResult<u64>;

    /// Unconditional increment (release, rollback, expiry)
    async fn increment_stock(&self, id: i64, quantity: i32) -> LedgerResult<()>;

    /// Products at or below `threshold`, lowest stock first
    async fn low_stock_products(&self, threshold: i32) -> LedgerResult<Vec<Product>>;

    // ── Reservations ──

    async fn insert_reservation(&self, reservation: &NewReservation) -> LedgerResult<Reservation>;

    async fn find_reservation(&self, id: i64) -> LedgerResult<Option<Reservation>>;

    /// `pending` reservations whose `expires_at <= now`
    async fn expired_reservations(&self, now: i64) -> LedgerResult<Vec<Reservation>>;

    /// `status := to WHERE id = id AND status = from`, returns affected rows
    async fn transition_reservation(
        &self,
        id: i64,
        from: ReservationStatus,
        to: ReservationStatus,
    ) -> LedgerResult<u64>;

    // ── Orders ──

    /// Next value of the server-side order number sequence, if the store has one
    async fn next_order_sequence(&self) -> LedgerResult<Option<i64>>;

    /// Insert the order header, echoing the stored row
    async fn insert_order(&self, order: &NewOrder) -> LedgerResult<Order>;

    /// Bulk insert of order lines, echoing the stored rows
    async fn insert_order_items(&self, items: &[NewOrderItem]) -> LedgerResult<Vec<OrderItem>>;

    async fn find_order(&self, id: i64) -> LedgerResult<Option<Order>>;

    /// Order committed for a payment reference (references are unique)
    async fn find_order_by_reference(
        &self,
        payment_reference: &str,
    ) -> LedgerResult<Option<Order>>;

    async fn find_order_items(&self, order_id: i64) -> LedgerResult<Vec<OrderItem>>;

    /// Cancel only while the order is still in one of `allowed`.
    /// Returns affected rows so exactly one caller wins the right to release stock.
    async fn cancel_order_if(
        &self,
        id: i64,
        allowed: &[OrderStatus],
        reason: &str,
        cancelled_at: i64,
    ) -> LedgerResult<u64>;

    /// Non-cancelled order headers with zero lines created before `created_before`
    async fn orders_without_items(&self, created_before: i64) -> LedgerResult<Vec<Order>>;

    /// Settle the payment status of a committed order by its payment reference
    async fn update_payment_status(
        &self,
        payment_reference: &str,
        status: PaymentStatus,
        clear_review: bool,
    ) -> LedgerResult<u64>;
}
