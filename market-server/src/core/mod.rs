//! Core module - configuration, shared state and background tasks
//!
//! - [`Config`] - environment configuration
//! - [`ServerState`] - handles shared by every handler
//! - [`CheckoutOutcomes`] - results of paid attempts awaiting collection
//! - [`BackgroundTasks`] - sweeper, reconciler and eviction lifecycle

pub mod config;
pub mod outcomes;
pub mod state;
pub mod tasks;

pub use config::Config;
pub use outcomes::{CheckoutOutcome, CheckoutOutcomes};
pub use state::ServerState;
pub use tasks::{BackgroundTasks, TaskKind};
