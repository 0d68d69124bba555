//! Order Commit Step
//!
//! Settles stock for every line, then writes the order header and its lines
//! as two separate inserts. Any failure returns the stock this attempt took;
//! a header left without lines is voided later by the reconciler.

use super::order_number::OrderNumberGenerator;
use crate::ledger::{LedgerError, SharedLedger};
use crate::stock::{StockError, StockHold, StockHoldMode, StockReservationManager};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::error::{AppError, ErrorCode};
use shared::models::{
    NewOrder, NewOrderItem, Order, OrderItem, OrderStatus, OrderTotals, PaymentMethod,
    PaymentStatus,
};
use shared::util::now_millis;
use std::sync::Arc;
use thiserror::Error;

/// A validated, priced line ready to be written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricedLine {
    pub product_id: i64,
    pub name: String,
    pub seller_id: i64,
    pub quantity: i32,
    pub unit_price: Decimal,
}

impl PricedLine {
    pub fn subtotal(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// Everything needed to persist one checkout attempt
#[derive(Debug, Clone)]
pub struct CommitRequest {
    pub customer_id: i64,
    pub lines: Vec<PricedLine>,
    pub totals: OrderTotals,
    pub shipping_region: String,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub payment_reference: Option<String>,
    pub needs_review: bool,
    /// Holds taken before payment (empty in decrement-on-commit mode)
    pub holds: Vec<StockHold>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommittedOrder {
    pub order: Order,
    pub items: Vec<OrderItem>,
}

#[derive(Debug, Error)]
pub enum CommitError {
    #[error("Order has no lines")]
    Empty,

    #[error(transparent)]
    Stock(#[from] StockError),

    /// Header written, lines not; the header is voided by the reconciler
    #[error("Order {order_id} header written without lines: {source}")]
    PartialCommit { order_id: i64, source: LedgerError },

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl From<CommitError> for AppError {
    fn from(err: CommitError) -> Self {
        match err {
            CommitError::Empty => AppError::new(ErrorCode::OrderEmpty),
            CommitError::Stock(e) => e.into(),
            CommitError::PartialCommit { order_id, .. } => {
                AppError::new(ErrorCode::OrderPartialCommit).with_detail("order_id", order_id)
            }
            CommitError::Ledger(e) => e.into(),
        }
    }
}

/// Stock taken for one line during settlement, returned on failure
#[derive(Debug, Clone, Copy)]
struct Settled {
    product_id: i64,
    quantity: i32,
}

pub struct OrderCommitter {
    ledger: SharedLedger,
    stock: Arc<StockReservationManager>,
    numbers: OrderNumberGenerator,
    mode: StockHoldMode,
}

impl OrderCommitter {
    pub fn new(stock: Arc<StockReservationManager>, mode: StockHoldMode) -> Self {
        Self {
            ledger: stock.ledger().clone(),
            stock,
            numbers: OrderNumberGenerator::new(),
            mode,
        }
    }

    pub fn mode(&self) -> StockHoldMode {
        self.mode
    }

    pub fn order_numbers(&self) -> &OrderNumberGenerator {
        &self.numbers
    }

    /// Persist the order
    ///
    /// Consumes the request's holds: on error every unit taken for this
    /// attempt has been given back (or left to the sweep), callers must not
    /// release them again.
    pub async fn commit(&self, request: CommitRequest) -> Result<CommittedOrder, CommitError> {
        if request.lines.is_empty() {
            return Err(CommitError::Empty);
        }

        let settled = self.settle_stock(&request).await?;

        let new_order = NewOrder {
            order_number: self.numbers.next(self.ledger.as_ref()).await,
            customer_id: request.customer_id,
            seller_id: single_seller(&request.lines),
            totals: request.totals,
            shipping_region: request.shipping_region.clone(),
            payment_method: request.payment_method,
            payment_status: request.payment_status,
            order_status: initial_status(request.payment_status),
            payment_reference: request.payment_reference.clone(),
            needs_review: request.needs_review,
            created_at: now_millis(),
        };

        let order = match self.ledger.insert_order(&new_order).await {
            Ok(order) => order,
            Err(e) => {
                self.return_settled(&settled).await;
                return Err(e.into());
            }
        };

        let new_items: Vec<NewOrderItem> = request
            .lines
            .iter()
            .map(|line| NewOrderItem {
                order_id: order.id,
                product_id: line.product_id,
                seller_id: line.seller_id,
                quantity: line.quantity,
                unit_price: line.unit_price,
                subtotal: line.subtotal(),
            })
            .collect();

        let items = match self.ledger.insert_order_items(&new_items).await {
            Ok(items) => items,
            Err(source) => {
                tracing::error!(
                    target: "audit",
                    order_id = order.id,
                    order_number = %order.order_number,
                    payment_reference = ?order.payment_reference,
                    error = %source,
                    "Order lines failed to persist, header left for reconciliation"
                );
                self.return_settled(&settled).await;
                return Err(CommitError::PartialCommit {
                    order_id: order.id,
                    source,
                });
            }
        };

        tracing::info!(
            target: "audit",
            order_id = order.id,
            order_number = %order.order_number,
            customer_id = order.customer_id,
            total = %order.total_amount,
            payment_method = %order.payment_method,
            payment_status = %order.payment_status,
            needs_review = order.needs_review,
            "Order committed"
        );

        Ok(CommittedOrder { order, items })
    }

    /// Take or confirm stock for every line; all-or-nothing
    async fn settle_stock(&self, request: &CommitRequest) -> Result<Vec<Settled>, CommitError> {
        let mut settled = Vec::with_capacity(request.lines.len());

        let result = match self.mode {
            StockHoldMode::Reserve => self.confirm_holds(&request.holds, &mut settled).await,
            StockHoldMode::DecrementOnCommit => {
                self.decrement_lines(&request.lines, &mut settled).await
            }
        };

        match result {
            Ok(()) => Ok(settled),
            Err(e) => {
                self.return_settled(&settled).await;
                if self.mode == StockHoldMode::Reserve {
                    // Holds not reached yet are still ours to give back
                    let remaining: Vec<StockHold> =
                        request.holds.iter().skip(settled.len() + 1).cloned().collect();
                    self.stock.release_holds(&remaining).await;
                }
                Err(e)
            }
        }
    }

    async fn confirm_holds(
        &self,
        holds: &[StockHold],
        settled: &mut Vec<Settled>,
    ) -> Result<(), CommitError> {
        for hold in holds {
            // Without a bookkeeping row the units are simply still held
            if let Some(reservation_id) = hold.reservation_id {
                match self.stock.confirm_reservation(reservation_id).await {
                    Ok(()) => {}
                    Err(StockError::ReservationExpired(_)) => {
                        // The sweep already returned these units; take them again
                        tracing::warn!(
                            reservation_id,
                            product_id = hold.product_id,
                            "Hold expired before commit, re-taking stock"
                        );
                        self.stock
                            .commit_decrement(hold.product_id, hold.quantity)
                            .await
                            .map_err(|e| match e {
                                StockError::Insufficient { .. } | StockError::Conflict { .. } => {
                                    StockError::ReservationExpired(reservation_id)
                                }
                                other => other,
                            })?;
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            settled.push(Settled {
                product_id: hold.product_id,
                quantity: hold.quantity,
            });
        }
        Ok(())
    }

    async fn decrement_lines(
        &self,
        lines: &[PricedLine],
        settled: &mut Vec<Settled>,
    ) -> Result<(), CommitError> {
        for line in lines {
            self.stock
                .commit_decrement(line.product_id, line.quantity)
                .await?;
            settled.push(Settled {
                product_id: line.product_id,
                quantity: line.quantity,
            });
        }
        Ok(())
    }

    async fn return_settled(&self, settled: &[Settled]) {
        for s in settled.iter().rev() {
            if let Err(e) = self.stock.release_stock(s.product_id, s.quantity).await {
                tracing::error!(
                    target: "audit",
                    product_id = s.product_id,
                    quantity = s.quantity,
                    error = %e,
                    "Failed to return settled stock after commit failure"
                );
            }
        }
    }
}

/// Seller on the header only when every line shares it
fn single_seller(lines: &[PricedLine]) -> Option<i64> {
    let first = lines.first()?.seller_id;
    lines.iter().all(|l| l.seller_id == first).then_some(first)
}

fn initial_status(payment_status: PaymentStatus) -> OrderStatus {
    match payment_status {
        PaymentStatus::Paid => OrderStatus::Confirmed,
        _ => OrderStatus::Pending,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{LedgerStore, MemoryLedger};
    use crate::stock::StockSettings;
    use rust_decimal_macros::dec;
    use shared::models::{Product, ReservationStatus};

    fn setup(mode: StockHoldMode) -> (Arc<MemoryLedger>, Arc<StockReservationManager>, OrderCommitter) {
        let ledger = Arc::new(MemoryLedger::new());
        for (id, seller) in [(1, 10), (2, 10), (3, 20)] {
            ledger.put_product(Product {
                id,
                name: format!("Product {id}"),
                seller_id: seller,
                price: dec!(50.00),
                stock_quantity: 5,
            });
        }
        let stock = Arc::new(StockReservationManager::new(
            ledger.clone(),
            StockSettings::default(),
        ));
        let committer = OrderCommitter::new(stock.clone(), mode);
        (ledger, stock, committer)
    }

    fn line(product_id: i64, seller_id: i64, quantity: i32) -> PricedLine {
        PricedLine {
            product_id,
            name: format!("Product {product_id}"),
            seller_id,
            quantity,
            unit_price: dec!(50.00),
        }
    }

    fn request(lines: Vec<PricedLine>, holds: Vec<StockHold>) -> CommitRequest {
        CommitRequest {
            customer_id: 99,
            lines,
            totals: OrderTotals::default(),
            shipping_region: "Greater Accra".into(),
            payment_method: PaymentMethod::Card,
            payment_status: PaymentStatus::Paid,
            payment_reference: Some("MKT-1-ABC".into()),
            needs_review: false,
            holds,
        }
    }

    #[tokio::test]
    async fn test_reserve_mode_confirms_without_second_decrement() {
        let (ledger, stock, committer) = setup(StockHoldMode::Reserve);
        let hold = stock.reserve_stock(1, 2, 99).await.unwrap();

        let committed = committer
            .commit(request(vec![line(1, 10, 2)], vec![hold.clone()]))
            .await
            .unwrap();

        assert_eq!(ledger.stock_of(1), Some(3));
        assert_eq!(committed.items.len(), 1);
        assert_eq!(committed.items[0].subtotal, dec!(100.00));
        assert_eq!(committed.order.order_status, OrderStatus::Confirmed);
        let reservation = ledger
            .find_reservation(hold.reservation_id.unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reservation.status, ReservationStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_decrement_mode_takes_stock_at_commit() {
        let (ledger, _, committer) = setup(StockHoldMode::DecrementOnCommit);
        committer
            .commit(request(vec![line(1, 10, 2), line(2, 10, 1)], vec![]))
            .await
            .unwrap();
        assert_eq!(ledger.stock_of(1), Some(3));
        assert_eq!(ledger.stock_of(2), Some(4));
    }

    #[tokio::test]
    async fn test_decrement_mode_rolls_back_on_insufficient_line() {
        let (ledger, _, committer) = setup(StockHoldMode::DecrementOnCommit);
        let result = committer
            .commit(request(vec![line(1, 10, 2), line(2, 10, 9)], vec![]))
            .await;

        assert!(matches!(
            result,
            Err(CommitError::Stock(StockError::Insufficient { product_id: 2, .. }))
        ));
        assert_eq!(ledger.stock_of(1), Some(5));
        assert!(ledger.orders().is_empty());
    }

    #[tokio::test]
    async fn test_line_insert_failure_is_partial_commit() {
        let (ledger, _, committer) = setup(StockHoldMode::DecrementOnCommit);
        ledger.fail_order_item_inserts(true);

        let result = committer.commit(request(vec![line(1, 10, 2)], vec![])).await;
        let order_id = match result {
            Err(CommitError::PartialCommit { order_id, .. }) => order_id,
            other => panic!("expected partial commit, got {other:?}"),
        };

        assert_eq!(ledger.stock_of(1), Some(5));
        assert!(ledger.find_order_items(order_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_expired_hold_is_retaken() {
        let (ledger, stock, committer) = setup(StockHoldMode::Reserve);
        let hold = stock.reserve_stock(1, 2, 99).await.unwrap();
        // Sweep claims the hold and gives the units back
        stock.release_hold(&hold).await.unwrap();
        assert_eq!(ledger.stock_of(1), Some(5));

        committer
            .commit(request(vec![line(1, 10, 2)], vec![hold]))
            .await
            .unwrap();
        assert_eq!(ledger.stock_of(1), Some(3));
    }

    #[test]
    fn test_single_seller() {
        assert_eq!(single_seller(&[line(1, 10, 1), line(2, 10, 1)]), Some(10));
        assert_eq!(single_seller(&[line(1, 10, 1), line(3, 20, 1)]), None);
        assert_eq!(single_seller(&[]), None);
    }
}
