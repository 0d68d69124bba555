//! Data models
//!
//! Shared between market-server and the storefront frontend (via API).
//! IDs are ledger-assigned `i64`, timestamps are Unix milliseconds.

pub mod cart;
pub mod order;
pub mod product;
pub mod reservation;

// Re-exports
pub use cart::*;
pub use order::*;
pub use product::*;
pub use reservation::*;
