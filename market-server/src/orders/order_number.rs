//! Order number generation
//!
//! Server sequence preferred (`ORD-000123`); when the ledger has no sequence
//! or the call fails, a local number `ORD-{millis}-{counter}{random}` is used.
//! The process-wide counter keeps local numbers unique within one millisecond.

use crate::ledger::LedgerStore;
use shared::util::{now_millis, random_suffix};
use std::sync::atomic::{AtomicU32, Ordering};

const PREFIX: &str = "ORD";
const COUNTER_MODULO: u32 = 10_000;

#[derive(Debug, Default)]
pub struct OrderNumberGenerator {
    counter: AtomicU32,
}

impl OrderNumberGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn next(&self, ledger: &dyn LedgerStore) -> String {
        match ledger.next_order_sequence().await {
            Ok(Some(seq)) => format!("{PREFIX}-{seq:06}"),
            Ok(None) => self.local(),
            Err(e) => {
                tracing::warn!(error = %e, "Order sequence unavailable, using local order number");
                self.local()
            }
        }
    }

    /// Timestamp-derived number, no round-trip
    pub fn local(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) % COUNTER_MODULO;
        format!("{PREFIX}-{}-{n:04}{}", now_millis(), random_suffix(3))
    }
}
