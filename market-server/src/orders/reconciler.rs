//! Order Reconciler - voids headers left without lines
//!
//! A commit that dies between the header insert and the line insert leaves
//! an order with zero lines. After a grace period (longer than any in-flight
//! commit) such headers are cancelled with reason `partial_commit` and an
//! audit record is written so paid attempts can be refunded by hand.

use crate::ledger::{LedgerResult, SharedLedger};
use shared::models::{OrderStatus, PaymentStatus};
use shared::util::now_millis;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const PARTIAL_COMMIT_REASON: &str = "partial_commit";

pub struct OrderReconciler {
    ledger: SharedLedger,
    grace: Duration,
}

impl OrderReconciler {
    pub fn new(ledger: SharedLedger, grace: Duration) -> Self {
        Self { ledger, grace }
    }

    /// One pass; returns the number of headers voided
    pub async fn reconcile_once(&self) -> LedgerResult<usize> {
        let now = now_millis();
        let cutoff = now - i64::try_from(self.grace.as_millis()).unwrap_or(i64::MAX);
        let orphans = self.ledger.orders_without_items(cutoff).await?;
        let mut voided = 0;

        for order in orphans {
            let affected = self
                .ledger
                .cancel_order_if(order.id, &OrderStatus::CANCELLABLE, PARTIAL_COMMIT_REASON, now)
                .await?;
            if affected == 0 {
                continue;
            }
            voided += 1;

            let refund_review = order.payment_status == PaymentStatus::Paid
                || (order.payment_status == PaymentStatus::Pending && order.needs_review);
            tracing::warn!(
                target: "audit",
                order_id = order.id,
                order_number = %order.order_number,
                customer_id = order.customer_id,
                payment_reference = ?order.payment_reference,
                payment_status = %order.payment_status,
                total = %order.total_amount,
                refund_review,
                "Voided order header without lines"
            );
        }

        Ok(voided)
    }

    pub async fn run(self, interval: Duration, shutdown: CancellationToken) {
        tracing::info!(
            interval_secs = interval.as_secs(),
            grace_secs = self.grace.as_secs(),
            "Order reconciler started"
        );
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.reconcile_once().await {
                        Ok(0) => {}
                        Ok(n) => tracing::info!(voided = n, "Reconciled partial commits"),
                        Err(e) => tracing::error!(error = %e, "Order reconciliation failed"),
                    }
                }
                _ = shutdown.cancelled() => {
                    tracing::info!("Order reconciler received shutdown signal");
                    return;
                }
            }
        }
    }
}
