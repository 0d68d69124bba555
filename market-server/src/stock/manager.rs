//! Stock Reservation Manager
//!
//! Every decrement of `stock_quantity` is a conditional update keyed on the
//! quantity observed at read time; the ledger is the only serialization
//! point. Reservation rows are bookkeeping for the sweep, the stock itself is
//! already taken when a hold is returned.

use super::error::{StockError, StockResult};
use crate::ledger::SharedLedger;
use serde::{Deserialize, Serialize};
use shared::models::{
    LowStockAlert, NewReservation, Order, OrderStatus, ReservationStatus, StockCheck,
};
use shared::util::now_millis;

/// Reservation hold duration (15 minutes)
pub const DEFAULT_HOLD_MILLIS: i64 = 15 * 60 * 1000;
/// Conditional update attempts per reservation before reporting a conflict
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// When a checkout takes stock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockHoldMode {
    /// Reserve before payment, confirm the reservation at commit
    #[default]
    Reserve,
    /// Validate before payment, decrement (guarded) at commit
    DecrementOnCommit,
}

impl std::str::FromStr for StockHoldMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "reserve" => Ok(Self::Reserve),
            "commit" | "decrement_on_commit" => Ok(Self::DecrementOnCommit),
            other => Err(format!("unknown stock hold mode: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StockSettings {
    pub hold_millis: i64,
    pub max_attempts: u32,
}

impl Default for StockSettings {
    fn default() -> Self {
        Self {
            hold_millis: DEFAULT_HOLD_MILLIS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// Stock taken for one line of one checkout attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockHold {
    pub product_id: i64,
    pub quantity: i32,
    /// `None` when the bookkeeping insert failed
    pub reservation_id: Option<i64>,
    pub remaining_stock: i32,
}

/// One requested line of a batch reservation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveRequest {
    pub product_id: i64,
    pub quantity: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineStatus {
    Reserved,
    /// Reserved, then released because a later line failed
    RolledBack,
    Failed,
    NotAttempted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineResult {
    pub product_id: i64,
    pub quantity: i32,
    pub status: LineStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of `reserve_multiple`
#[derive(Debug, Serialize)]
pub struct BatchReservation {
    pub success: bool,
    /// Holds kept by the caller (empty on failure)
    pub holds: Vec<StockHold>,
    pub failed: Vec<LineResult>,
    pub results: Vec<LineResult>,
    #[serde(skip)]
    pub error: Option<StockError>,
}

impl BatchReservation {
    /// Holds on success, the first line error otherwise
    pub fn into_result(self) -> StockResult<Vec<StockHold>> {
        match self.error {
            None => Ok(self.holds),
            Some(e) => Err(e),
        }
    }
}

/// Result of one expiry sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub expired: usize,
    pub released_units: i64,
    /// Claimed by a concurrent sweeper or confirmation first
    pub skipped: usize,
    pub failed: usize,
}

pub struct StockReservationManager {
    ledger: SharedLedger,
    settings: StockSettings,
}

impl StockReservationManager {
    pub fn new(ledger: SharedLedger, settings: StockSettings) -> Self {
        Self { ledger, settings }
    }

    pub fn ledger(&self) -> &SharedLedger {
        &self.ledger
    }

    pub fn settings(&self) -> StockSettings {
        self.settings
    }

    /// Pure read
    pub async fn check_stock(&self, product_id: i64, quantity: i32) -> StockResult<StockCheck> {
        let product = self
            .ledger
            .find_product(product_id)
            .await?
            .ok_or(StockError::NotFound(product_id))?;
        Ok(StockCheck {
            available: product.stock_quantity >= quantity,
            current_stock: product.stock_quantity,
        })
    }

    /// Reserve with bounded conflict retry, each attempt on a fresh read
    pub async fn reserve_stock(
        &self,
        product_id: i64,
        quantity: i32,
        buyer_id: i64,
    ) -> StockResult<StockHold> {
        validate_quantity(quantity)?;
        let attempts = self.settings.max_attempts.max(1);

        for attempt in 1..=attempts {
            let observed = self.current_stock(product_id).await?;
            match self.try_reserve(product_id, quantity, buyer_id, observed).await {
                Err(StockError::Conflict { .. }) if attempt < attempts => {
                    tracing::debug!(product_id, attempt, "Stock conflict, re-reading");
                    tokio::task::yield_now().await;
                }
                other => return other,
            }
        }
        Err(StockError::Conflict { product_id })
    }

    /// Single reservation attempt against a previously observed quantity
    ///
    /// Fails with `Conflict` if the quantity is no longer `observed`.
    pub async fn try_reserve(
        &self,
        product_id: i64,
        quantity: i32,
        buyer_id: i64,
        observed: i32,
    ) -> StockResult<StockHold> {
        validate_quantity(quantity)?;
        if observed < quantity {
            return Err(StockError::Insufficient {
                product_id,
                requested: quantity,
                current_stock: observed,
            });
        }

        let remaining = observed - quantity;
        let affected = self
            .ledger
            .update_stock_if(product_id, observed, remaining)
            .await?;
        if affected == 0 {
            return Err(StockError::Conflict { product_id });
        }

        let reservation_id = self.record_reservation(product_id, quantity, buyer_id).await;
        tracing::info!(
            product_id,
            quantity,
            buyer_id,
            remaining,
            reservation_id = ?reservation_id,
            "Stock reserved"
        );

        Ok(StockHold {
            product_id,
            quantity,
            reservation_id,
            remaining_stock: remaining,
        })
    }

    /// Unconditional increment
    ///
    /// Not guarded against double release: callers track what they reserved.
    pub async fn release_stock(&self, product_id: i64, quantity: i32) -> StockResult<()> {
        validate_quantity(quantity)?;
        self.ledger.increment_stock(product_id, quantity).await?;
        tracing::info!(product_id, quantity, "Stock released");
        Ok(())
    }

    /// Give back a hold taken by this process
    ///
    /// The reservation record is claimed (`pending → expired`) first so the
    /// sweep cannot release the same units again. Returns whether stock was
    /// released here.
    pub async fn release_hold(&self, hold: &StockHold) -> StockResult<bool> {
        if let Some(reservation_id) = hold.reservation_id {
            let claimed = self
                .ledger
                .transition_reservation(
                    reservation_id,
                    ReservationStatus::Pending,
                    ReservationStatus::Expired,
                )
                .await?;
            if claimed == 0 {
                tracing::warn!(
                    reservation_id,
                    product_id = hold.product_id,
                    "Hold already settled elsewhere, not releasing"
                );
                return Ok(false);
            }
        }
        if let Err(e) = self.release_stock(hold.product_id, hold.quantity).await {
            if let Some(reservation_id) = hold.reservation_id {
                self.unclaim(reservation_id).await;
            }
            return Err(e);
        }
        Ok(true)
    }

    /// Hand a claimed reservation back to the sweep after its release failed
    async fn unclaim(&self, reservation_id: i64) {
        match self
            .ledger
            .transition_reservation(
                reservation_id,
                ReservationStatus::Expired,
                ReservationStatus::Pending,
            )
            .await
        {
            Ok(_) => {
                tracing::warn!(reservation_id, "Stock release failed, reservation left pending for the sweep")
            }
            Err(e) => tracing::error!(
                target: "audit",
                reservation_id,
                error = %e,
                "Stock release failed and reservation could not be reopened"
            ),
        }
    }

    /// Release every hold, logging failures; returns the number released
    pub async fn release_holds(&self, holds: &[StockHold]) -> usize {
        let mut released = 0;
        for hold in holds.iter().rev() {
            match self.release_hold(hold).await {
                Ok(true) => released += 1,
                Ok(false) => {}
                Err(e) => tracing::error!(
                    product_id = hold.product_id,
                    quantity = hold.quantity,
                    error = %e,
                    "Failed to release hold"
                ),
            }
        }
        released
    }

    /// Sequential reservation with compensating releases
    ///
    /// On the first failing line every line reserved earlier in this call is
    /// released and no holds are returned.
    pub async fn reserve_multiple(
        &self,
        items: &[ReserveRequest],
        buyer_id: i64,
    ) -> BatchReservation {
        let mut holds: Vec<StockHold> = Vec::with_capacity(items.len());
        let mut results: Vec<LineResult> = Vec::with_capacity(items.len());
        let mut error = None;

        for item in items {
            if error.is_some() {
                results.push(line(item, LineStatus::NotAttempted, None));
                continue;
            }
            match self
                .reserve_stock(item.product_id, item.quantity, buyer_id)
                .await
            {
                Ok(hold) => {
                    holds.push(hold);
                    results.push(line(item, LineStatus::Reserved, None));
                }
                Err(e) => {
                    results.push(line(item, LineStatus::Failed, Some(e.to_string())));
                    error = Some(e);
                }
            }
        }

        if error.is_none() {
            return BatchReservation {
                success: true,
                holds,
                failed: Vec::new(),
                results,
                error: None,
            };
        }

        let rolled_back = self.release_holds(&holds).await;
        tracing::warn!(
            buyer_id,
            rolled_back,
            "Batch reservation failed, earlier lines released"
        );
        for result in results.iter_mut() {
            if result.status == LineStatus::Reserved {
                result.status = LineStatus::RolledBack;
            }
        }
        let failed = results
            .iter()
            .filter(|r| r.status == LineStatus::Failed)
            .cloned()
            .collect();

        BatchReservation {
            success: false,
            holds: Vec::new(),
            failed,
            results,
            error,
        }
    }

    /// Guarded decrement used when stock is settled at commit time
    ///
    /// `stock_quantity > quantity - 1` is checked by the ledger in the same
    /// statement as the observed-value match.
    pub async fn commit_decrement(&self, product_id: i64, quantity: i32) -> StockResult<i32> {
        validate_quantity(quantity)?;
        let attempts = self.settings.max_attempts.max(1);

        for _ in 0..attempts {
            let observed = self.current_stock(product_id).await?;
            if observed < quantity {
                return Err(StockError::Insufficient {
                    product_id,
                    requested: quantity,
                    current_stock: observed,
                });
            }
            let affected = self
                .ledger
                .decrement_stock_guarded(product_id, observed, quantity)
                .await?;
            if affected == 1 {
                return Ok(observed - quantity);
            }
            tokio::task::yield_now().await;
        }
        Err(StockError::Conflict { product_id })
    }

    /// Release stock held by expired `pending` reservations
    ///
    /// Each reservation is claimed with a conditional status update before
    /// its units are returned, so overlapping sweeps release once.
    pub async fn cleanup_expired_reservations(&self) -> StockResult<SweepReport> {
        let now = now_millis();
        let expired = self.ledger.expired_reservations(now).await?;
        let mut report = SweepReport::default();

        for reservation in expired {
            let claimed = match self
                .ledger
                .transition_reservation(
                    reservation.id,
                    ReservationStatus::Pending,
                    ReservationStatus::Expired,
                )
                .await
            {
                Ok(n) => n,
                Err(e) => {
                    tracing::error!(reservation_id = reservation.id, error = %e, "Failed to expire reservation");
                    report.failed += 1;
                    continue;
                }
            };
            if claimed == 0 {
                report.skipped += 1;
                continue;
            }

            match self
                .ledger
                .increment_stock(reservation.product_id, reservation.quantity)
                .await
            {
                Ok(()) => {
                    report.expired += 1;
                    report.released_units += i64::from(reservation.quantity);
                }
                Err(e) => {
                    tracing::error!(
                        target: "audit",
                        reservation_id = reservation.id,
                        product_id = reservation.product_id,
                        quantity = reservation.quantity,
                        error = %e,
                        "Reservation expired but stock release failed"
                    );
                    self.unclaim(reservation.id).await;
                    report.failed += 1;
                }
            }
        }

        if report.expired > 0 || report.failed > 0 {
            tracing::info!(
                expired = report.expired,
                released_units = report.released_units,
                skipped = report.skipped,
                failed = report.failed,
                "Reservation sweep finished"
            );
        }
        Ok(report)
    }

    /// `pending → confirmed`; confirming twice is a no-op
    pub async fn confirm_reservation(&self, reservation_id: i64) -> StockResult<()> {
        let affected = self
            .ledger
            .transition_reservation(
                reservation_id,
                ReservationStatus::Pending,
                ReservationStatus::Confirmed,
            )
            .await?;
        if affected == 1 {
            return Ok(());
        }

        let reservation = self
            .ledger
            .find_reservation(reservation_id)
            .await?
            .ok_or(StockError::ReservationNotFound(reservation_id))?;
        match reservation.status {
            ReservationStatus::Confirmed => Ok(()),
            ReservationStatus::Expired => Err(StockError::ReservationExpired(reservation_id)),
            // Raced back to pending is impossible; report as a retryable conflict
            ReservationStatus::Pending => Err(StockError::Conflict {
                product_id: reservation.product_id,
            }),
        }
    }

    /// Cancel an order and release stock for each of its lines
    ///
    /// Only the caller whose status flip succeeds releases stock.
    pub async fn cancel_order(&self, order_id: i64, reason: &str) -> StockResult<Order> {
        let order = self
            .ledger
            .find_order(order_id)
            .await?
            .ok_or(StockError::OrderNotFound(order_id))?;

        let affected = self
            .ledger
            .cancel_order_if(order_id, &OrderStatus::CANCELLABLE, reason, now_millis())
            .await?;
        if affected == 0 {
            let status = self
                .ledger
                .find_order(order_id)
                .await?
                .map(|o| o.order_status)
                .unwrap_or(order.order_status);
            return Err(match status {
                OrderStatus::Cancelled => StockError::OrderAlreadyCancelled(order_id),
                status => StockError::OrderNotCancellable { order_id, status },
            });
        }

        let items = self.ledger.find_order_items(order_id).await?;
        for item in &items {
            if let Err(e) = self.release_stock(item.product_id, item.quantity).await {
                tracing::error!(
                    target: "audit",
                    order_id,
                    product_id = item.product_id,
                    quantity = item.quantity,
                    error = %e,
                    "Order cancelled but stock release failed"
                );
            }
        }
        tracing::info!(
            target: "audit",
            order_id,
            order_number = %order.order_number,
            lines = items.len(),
            reason,
            "Order cancelled"
        );

        self.ledger
            .find_order(order_id)
            .await?
            .ok_or(StockError::OrderNotFound(order_id))
    }

    /// Products at or below `threshold`, lowest stock first
    pub async fn get_low_stock_alerts(&self, threshold: i32) -> StockResult<Vec<LowStockAlert>> {
        let products = self.ledger.low_stock_products(threshold).await?;
        Ok(products.iter().map(LowStockAlert::from).collect())
    }

    async fn current_stock(&self, product_id: i64) -> StockResult<i32> {
        self.ledger
            .find_product(product_id)
            .await?
            .map(|p| p.stock_quantity)
            .ok_or(StockError::NotFound(product_id))
    }

    async fn record_reservation(&self, product_id: i64, quantity: i32, buyer_id: i64) -> Option<i64> {
        let created_at = now_millis();
        let reservation = NewReservation {
            product_id,
            customer_id: buyer_id,
            quantity,
            created_at,
            expires_at: created_at.saturating_add(self.settings.hold_millis),
        };
        match self.ledger.insert_reservation(&reservation).await {
            Ok(row) => Some(row.id),
            Err(e) => {
                tracing::warn!(product_id, buyer_id, error = %e, "Failed to record reservation");
                None
            }
        }
    }
}

fn validate_quantity(quantity: i32) -> StockResult<()> {
    if quantity <= 0 {
        return Err(StockError::InvalidQuantity(quantity));
    }
    Ok(())
}

fn line(item: &ReserveRequest, status: LineStatus, error: Option<String>) -> LineResult {
    LineResult {
        product_id: item.product_id,
        quantity: item.quantity,
        status,
        error,
    }
}
