//! Shared types for the marketplace checkout engine
//!
//! Common types used by market-server and its API clients: error codes,
//! response envelope, domain models and small utilities.

pub mod error;
pub mod models;
pub mod util;

// Re-exports
pub use axum::Json;
pub use http;
pub use serde::{Deserialize, Serialize};
