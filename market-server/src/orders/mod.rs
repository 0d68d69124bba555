//! Order persistence: commit step, numbering and reconciliation

pub mod commit;
pub mod order_number;
pub mod reconciler;

pub use commit::{CommitError, CommitRequest, CommittedOrder, OrderCommitter, PricedLine};
pub use order_number::OrderNumberGenerator;
pub use reconciler::{OrderReconciler, PARTIAL_COMMIT_REASON};
