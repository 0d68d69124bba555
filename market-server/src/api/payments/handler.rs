//! Payment API Handlers

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::{Deserialize, Serialize};
use shared::error::{ApiResponse, AppError, AppResult};
use shared::models::PaymentStatus;

use crate::api::bearer::require_bearer;
use crate::core::ServerState;
use crate::payment::paystack::verify_webhook_signature;
use crate::payment::{
    CallbackStatus, OrderContext, PaymentCallback, VerificationRequest, VerificationResult,
};

const SIGNATURE_HEADER: &str = "x-paystack-signature";

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub reference: Option<String>,
    /// Paystack sends the reference twice; either is accepted
    pub trxref: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CallbackAck {
    pub reference: String,
    /// Whether a checkout attempt was waiting for this reference
    pub delivered: bool,
}

/// Buyer returned from the hosted page
///
/// Only wakes the waiting attempt; success is still verified server-side.
pub async fn callback(
    State(state): State<ServerState>,
    Query(query): Query<CallbackQuery>,
) -> AppResult<ApiResponse<CallbackAck>> {
    let reference = query
        .reference
        .or(query.trxref)
        .ok_or_else(|| AppError::validation("reference is required"))?;
    let delivered = state.payment_callbacks.complete(PaymentCallback {
        reference: reference.clone(),
        status: CallbackStatus::Success,
    });
    tracing::info!(reference = %reference, delivered, "Payment callback received");
    Ok(ApiResponse::success(CallbackAck {
        reference,
        delivered,
    }))
}

/// Buyer closed the payment window
pub async fn cancel(
    State(state): State<ServerState>,
    Path(reference): Path<String>,
) -> AppResult<ApiResponse<CallbackAck>> {
    let delivered = state.payment_callbacks.abandon(&reference);
    tracing::info!(reference = %reference, delivered, "Payment window closed by buyer");
    Ok(ApiResponse::success(CallbackAck {
        reference,
        delivered,
    }))
}

/// Server-side verification, called by storefront instances
pub async fn verify(
    State(state): State<ServerState>,
    headers: HeaderMap,
    Json(request): Json<VerificationRequest>,
) -> AppResult<ApiResponse<VerificationResult>> {
    if let Err(e) = require_bearer(&headers, &state.config.payment_verify_token) {
        crate::security_log!(
            WARN,
            "verify_token_rejected",
            reference = %request.reference,
            customer_id = request.order_context.customer_id
        );
        return Err(e);
    }

    let result = state.verifier.verify(&request).await?;
    tracing::info!(
        target: "audit",
        reference = %result.reference,
        verified = result.verified,
        status = %result.status,
        customer_id = request.order_context.customer_id,
        amount = %request.amount,
        "Payment verification answered"
    );
    Ok(ApiResponse::success(result))
}

/// Provider webhook
///
/// Must receive the raw body for HMAC verification.
pub async fn webhook(
    State(state): State<ServerState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if let Err(reason) =
        verify_webhook_signature(&body, signature, &state.config.paystack_secret_key)
    {
        crate::security_log!(WARN, "webhook_signature_invalid", reason = reason);
        return StatusCode::BAD_REQUEST;
    }

    let event: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to parse webhook JSON");
            return StatusCode::BAD_REQUEST;
        }
    };
    let event_type = event["event"].as_str().unwrap_or_default();
    let Some(reference) = event["data"]["reference"].as_str().map(String::from) else {
        tracing::debug!(event_type, "Webhook event without reference");
        return StatusCode::OK;
    };
    tracing::info!(event_type, reference = %reference, "Received payment webhook");

    match event_type {
        "charge.success" => {
            state.payment_callbacks.complete(PaymentCallback {
                reference: reference.clone(),
                status: CallbackStatus::Success,
            });
            settle_provisional(&state, &reference).await
        }
        "charge.failed" => {
            state.payment_callbacks.complete(PaymentCallback {
                reference,
                status: CallbackStatus::Failed {
                    reason: event["data"]["gateway_response"].as_str().map(String::from),
                },
            });
            StatusCode::OK
        }
        _ => {
            tracing::debug!(event_type, "Unhandled webhook event type");
            StatusCode::OK
        }
    }
}

/// Verify and settle an order committed while the verifier was unreachable
async fn settle_provisional(state: &ServerState, reference: &str) -> StatusCode {
    let order = match state.ledger.find_order_by_reference(reference).await {
        Ok(Some(order)) if order.needs_review && order.payment_status == PaymentStatus::Pending => {
            order
        }
        Ok(_) => return StatusCode::OK,
        Err(e) => {
            tracing::error!(reference, error = %e, "Ledger error while settling webhook");
            // Provider retries non-2xx deliveries
            return StatusCode::INTERNAL_SERVER_ERROR;
        }
    };

    let request = VerificationRequest {
        reference: reference.to_string(),
        amount: order.total_amount,
        order_context: OrderContext {
            customer_id: order.customer_id,
            line_count: 0,
            shipping_region: order.shipping_region.clone(),
        },
    };
    let verified = match state.verifier.verify(&request).await {
        Ok(result) => result.verified,
        Err(e) => {
            tracing::warn!(reference, error = %e, "Provisional order still unverified");
            return StatusCode::SERVICE_UNAVAILABLE;
        }
    };
    if !verified {
        tracing::warn!(
            target: "audit",
            order_id = order.id,
            reference,
            "Provisional order failed verification, left for review"
        );
        return StatusCode::OK;
    }

    match state
        .ledger
        .update_payment_status(reference, PaymentStatus::Paid, true)
        .await
    {
        Ok(_) => {
            tracing::info!(
                target: "audit",
                order_id = order.id,
                order_number = %order.order_number,
                reference,
                "Provisional order verified and marked paid"
            );
            StatusCode::OK
        }
        Err(e) => {
            tracing::error!(reference, error = %e, "Failed to settle provisional order");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
