//! Checkout API Handlers

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use shared::error::{ApiResponse, AppError, AppResult};
use shared::models::{CartLine, PaymentMethod};
use std::time::Duration;

use crate::api::CurrentCustomer;
use crate::checkout::{CheckoutReceipt, CheckoutSession};
use crate::core::{CheckoutOutcome, ServerState};

/// How long the request waits for the provider to open the payment window
const AUTHORIZATION_WAIT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
pub struct QuoteRequest {
    pub email: String,
    pub cart: Vec<CartLine>,
    pub shipping_region: String,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub email: String,
    pub cart: Vec<CartLine>,
    pub shipping_region: String,
    pub payment_method: PaymentMethod,
}

/// Answer for a paid checkout whose payment window is open
#[derive(Debug, Serialize)]
pub struct PaymentStarted {
    pub reference: String,
    pub authorization_url: String,
}

#[derive(Debug, Serialize)]
pub struct OutcomeResponse {
    pub reference: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt: Option<CheckoutReceipt>,
}

/// Validate and price without taking stock
pub async fn quote(
    State(state): State<ServerState>,
    customer: CurrentCustomer,
    Json(body): Json<QuoteRequest>,
) -> AppResult<ApiResponse<CheckoutSession>> {
    let session = state
        .checkout
        .initialize(customer.0, &body.email, body.cart, &body.shipping_region)
        .await?;
    Ok(ApiResponse::success(session))
}

pub async fn start(
    State(state): State<ServerState>,
    customer: CurrentCustomer,
    Json(body): Json<CheckoutRequest>,
) -> Result<Response, AppError> {
    let mut session = state
        .checkout
        .initialize(customer.0, &body.email, body.cart, &body.shipping_region)
        .await?;

    if body.payment_method.is_cash_on_delivery() {
        let receipt = state
            .checkout
            .checkout(&mut session, body.payment_method, None)
            .await?;
        return Ok((StatusCode::CREATED, ApiResponse::success(receipt)).into_response());
    }

    let reference = state.checkout.payments().new_reference();
    let authorization = state.payment_callbacks.watch_authorization(&reference);
    state.checkouts.set(&reference, CheckoutOutcome::Processing);

    let method = body.payment_method;
    let task_state = state.clone();
    let task_reference = reference.clone();
    let mut attempt = tokio::spawn(async move {
        let result = task_state
            .checkout
            .checkout(&mut session, method, Some(task_reference.clone()))
            .await;
        let outcome = match result {
            Ok(receipt) => CheckoutOutcome::Completed(receipt),
            Err(e) => {
                tracing::info!(reference = %task_reference, error = %e, "Checkout attempt failed");
                CheckoutOutcome::Failed(e.into())
            }
        };
        task_state.checkouts.set(&task_reference, outcome);
    });

    tokio::select! {
        url = authorization => match url {
            Ok(authorization_url) => Ok((
                StatusCode::ACCEPTED,
                ApiResponse::success(PaymentStarted { reference, authorization_url }),
            )
                .into_response()),
            Err(_) => Err(AppError::internal("payment window was not opened")),
        },
        joined = &mut attempt => {
            state.payment_callbacks.unwatch_authorization(&reference);
            if let Err(e) = joined {
                tracing::error!(reference = %reference, error = ?e, "Checkout task panicked");
            }
            // Failed before the payment window opened
            match state.checkouts.remove(&reference) {
                Some(CheckoutOutcome::Failed(err)) => Err(err),
                Some(CheckoutOutcome::Completed(receipt)) => {
                    Ok((StatusCode::CREATED, ApiResponse::success(receipt)).into_response())
                }
                _ => Err(AppError::internal("checkout ended without an outcome")),
            }
        }
        _ = tokio::time::sleep(AUTHORIZATION_WAIT) => {
            // The attempt keeps running and may still open the window
            state.payment_callbacks.unwatch_authorization(&reference);
            Err(AppError::with_message(
                shared::error::ErrorCode::TimeoutError,
                "payment provider did not respond in time",
            )
            .with_detail("reference", reference))
        }
    }
}

/// Terminal outcomes are handed out once; uncollected ones are evicted
pub async fn outcome(
    State(state): State<ServerState>,
    Path(reference): Path<String>,
) -> AppResult<ApiResponse<OutcomeResponse>> {
    let processing = state
        .checkouts
        .is_processing(&reference)
        .ok_or_else(|| AppError::not_found(format!("checkout {reference}")))?;
    if processing {
        return Ok(ApiResponse::success(OutcomeResponse {
            reference,
            status: "processing",
            receipt: None,
        }));
    }

    match state.checkouts.take_terminal(&reference) {
        Some(CheckoutOutcome::Completed(receipt)) => Ok(ApiResponse::success(OutcomeResponse {
            reference,
            status: "completed",
            receipt: Some(receipt),
        })),
        Some(CheckoutOutcome::Failed(err)) => Err(err),
        // Raced with another poll; report as still running
        _ => Ok(ApiResponse::success(OutcomeResponse {
            reference,
            status: "processing",
            receipt: None,
        })),
    }
}
