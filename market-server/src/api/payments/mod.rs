//! Payment routes
//!
//! | Path | Method | Description |
//! |------|--------|-------------|
//! | /api/payments/callback | GET | Provider redirect after the buyer paid |
//! | /api/payments/{reference}/cancel | POST | Buyer closed the payment window |
//! | /api/payments/verify | POST | Server-side verification (bearer token) |
//! | /api/payments/webhook | POST | Provider webhook (HMAC-SHA512 signed, raw body) |

mod handler;

use axum::{
    Router,
    routing::{get, post},
};

use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new().nest("/api/payments", routes())
}

fn routes() -> Router<ServerState> {
    Router::new()
        .route("/callback", get(handler::callback))
        .route("/verify", post(handler::verify))
        .route("/webhook", post(handler::webhook))
        .route("/{reference}/cancel", post(handler::cancel))
}
