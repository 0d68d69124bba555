//! Reservation Sweeper - periodic expiry of stale holds

use super::manager::StockReservationManager;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub struct ReservationSweeper {
    manager: Arc<StockReservationManager>,
    interval: Duration,
    shutdown: CancellationToken,
}

impl ReservationSweeper {
    pub fn new(
        manager: Arc<StockReservationManager>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            manager,
            interval,
            shutdown,
        }
    }

    /// Sweep on every tick until shutdown (first tick fires immediately)
    pub async fn run(self) {
        tracing::info!(interval_secs = self.interval.as_secs(), "Reservation sweeper started");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.manager.cleanup_expired_reservations().await {
                        tracing::error!(error = %e, "Reservation sweep failed");
                    }
                }
                _ = self.shutdown.cancelled() => {
                    tracing::info!("Reservation sweeper received shutdown signal");
                    return;
                }
            }
        }
    }
}
