//! Checkout routes
//!
//! | Path | Method | Description |
//! |------|--------|-------------|
//! | /api/checkout/quote | POST | Validate and price a cart |
//! | /api/checkout | POST | Start a checkout attempt |
//! | /api/checkout/{reference} | GET | Outcome of a card/mobile-money attempt |
//!
//! Cash on delivery completes within the request. Paid methods answer `202`
//! with the provider's authorization URL once the payment window is open;
//! the storefront then polls the outcome by payment reference.

mod handler;

use axum::{
    Router,
    routing::{get, post},
};

use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new().nest("/api/checkout", routes())
}

fn routes() -> Router<ServerState> {
    Router::new()
        .route("/", post(handler::start))
        .route("/quote", post(handler::quote))
        .route("/{reference}", get(handler::outcome))
}
