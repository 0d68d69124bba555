//! Checkout outcomes of paid attempts, keyed by payment reference
//!
//! The storefront polls an attempt until it is terminal; a terminal outcome
//! is handed out once. Entries nobody collects are evicted after a TTL.

use crate::checkout::CheckoutReceipt;
use dashmap::DashMap;
use shared::error::AppError;
use shared::util::now_millis;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Where an asynchronous checkout attempt currently stands
#[derive(Debug, Clone)]
pub enum CheckoutOutcome {
    /// Waiting for the buyer, the verifier or the commit
    Processing,
    Completed(CheckoutReceipt),
    Failed(AppError),
}

#[derive(Debug, Clone)]
struct Entry {
    outcome: CheckoutOutcome,
    updated_at: i64,
}

#[derive(Debug, Default)]
pub struct CheckoutOutcomes {
    entries: DashMap<String, Entry>,
}

impl CheckoutOutcomes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, reference: &str, outcome: CheckoutOutcome) {
        self.set_at(reference, outcome, now_millis());
    }

    fn set_at(&self, reference: &str, outcome: CheckoutOutcome, updated_at: i64) {
        self.entries.insert(
            reference.to_string(),
            Entry {
                outcome,
                updated_at,
            },
        );
    }

    /// `None` when unknown, `Some(true)` while the attempt is still running
    pub fn is_processing(&self, reference: &str) -> Option<bool> {
        self.entries
            .get(reference)
            .map(|e| matches!(e.outcome, CheckoutOutcome::Processing))
    }

    /// Remove and return a terminal outcome; running attempts stay put
    pub fn take_terminal(&self, reference: &str) -> Option<CheckoutOutcome> {
        self.entries
            .remove_if(reference, |_, e| {
                !matches!(e.outcome, CheckoutOutcome::Processing)
            })
            .map(|(_, e)| e.outcome)
    }

    /// Remove whatever is stored, running or not
    pub fn remove(&self, reference: &str) -> Option<CheckoutOutcome> {
        self.entries.remove(reference).map(|(_, e)| e.outcome)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop entries not updated within `ttl`; returns how many went
    pub fn evict_stale(&self, now: i64, ttl: Duration) -> usize {
        let cutoff = now.saturating_sub(i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX));
        let before = self.entries.len();
        self.entries.retain(|_, e| e.updated_at >= cutoff);
        before.saturating_sub(self.entries.len())
    }

    /// Evict on every tick until shutdown
    pub async fn run_eviction(
        self: Arc<Self>,
        interval: Duration,
        ttl: Duration,
        shutdown: CancellationToken,
    ) {
        tracing::info!(
            interval_secs = interval.as_secs(),
            ttl_secs = ttl.as_secs(),
            "Checkout outcome eviction started"
        );
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let evicted = self.evict_stale(now_millis(), ttl);
                    if evicted > 0 {
                        tracing::info!(evicted, remaining = self.len(), "Evicted uncollected checkout outcomes");
                    }
                }
                _ = shutdown.cancelled() => {
                    tracing::info!("Checkout outcome eviction received shutdown signal");
                    return;
                }
            }
        }
    }
}
