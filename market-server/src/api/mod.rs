//! API routes
//!
//! - [`health`] - liveness and ledger check
//! - [`stock`] - stock reads, reservations, sweep, low-stock alerts
//! - [`checkout`] - quote, checkout attempts and their outcome
//! - [`orders`] - order lookup and cancellation
//! - [`payments`] - provider callback/webhook and server-side verification

pub mod bearer;
pub mod checkout;
pub mod customer;
pub mod health;
pub mod orders;
pub mod payments;
pub mod stock;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::core::ServerState;

pub use customer::CurrentCustomer;

/// Every route, without middleware or state
pub fn build_router() -> Router<ServerState> {
    Router::new()
        .merge(health::router())
        .merge(stock::router())
        .merge(checkout::router())
        .merge(orders::router())
        .merge(payments::router())
}

/// Router with tower-http middleware and state applied
pub fn build_app(state: ServerState) -> Router {
    build_router()
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
