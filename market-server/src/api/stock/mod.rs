//! Stock routes
//!
//! | Path | Method | Description |
//! |------|--------|-------------|
//! | /api/stock/{product_id} | GET | Pure stock read (`?quantity=`) |
//! | /api/stock/reserve | POST | Reserve one line for the current buyer |
//! | /api/stock/reserve-multiple | POST | Reserve a cart, all or nothing |
//! | /api/stock/reservations/{id}/release | POST | Give back the buyer's own pending hold |
//! | /api/stock/reservations/{id}/confirm | POST | Confirm the buyer's own pending hold |
//! | /api/stock/sweep | POST | Run one expiry sweep now (operator bearer token) |
//! | /api/stock/low | GET | Low-stock alerts (`?threshold=`) |

mod handler;

use axum::{
    Router,
    routing::{get, post},
};

use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new().nest("/api/stock", routes())
}

fn routes() -> Router<ServerState> {
    Router::new()
        .route("/low", get(handler::low_stock))
        .route("/reserve", post(handler::reserve))
        .route("/reserve-multiple", post(handler::reserve_multiple))
        .route("/sweep", post(handler::sweep))
        .route("/reservations/{id}/release", post(handler::release_reservation))
        .route("/reservations/{id}/confirm", post(handler::confirm_reservation))
        .route("/{product_id}", get(handler::check))
}
