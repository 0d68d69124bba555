//! Market Server - stock reservation and checkout consistency engine
//!
//! Keeps a multi-seller marketplace from overselling while many storefront
//! instances check out against the same ledger.
//!
//! # Module layout
//!
//! ```text
//! market-server/src/
//! ├── ledger/     # LedgerStore trait, PostgreSQL and in-memory stores
//! ├── stock/      # conditional-update reservations, sweep
//! ├── orders/     # order numbers, commit saga, reconciler
//! ├── payment/    # provider UI, server-side verification, Paystack
//! ├── checkout/   # validation, pricing, orchestrator state machine
//! ├── core/       # config, server state, background tasks
//! ├── api/        # HTTP routes and handlers
//! └── utils/      # logging
//! ```

pub mod api;
pub mod checkout;
pub mod core;
pub mod ledger;
pub mod orders;
pub mod payment;
pub mod stock;
pub mod utils;

pub use checkout::{CheckoutError, CheckoutOrchestrator};
pub use core::{BackgroundTasks, Config, ServerState};
pub use ledger::{LedgerStore, MemoryLedger, PgLedger, SharedLedger};
pub use orders::OrderCommitter;
pub use payment::PaymentGatewayAdapter;
pub use stock::StockReservationManager;
pub use utils::logger::{cleanup_old_logs, init_logger_with_file};
