//! Payment verifiers
//!
//! [`HttpPaymentVerifier`] runs in the storefront and calls the
//! server-controlled verification endpoint. [`PaystackVerifier`] is what that
//! endpoint runs: it asks the provider and cross-checks the amount.

use super::error::{PaymentError, PaymentResult};
use super::paystack::{to_minor_units, PaystackClient};
use super::{PaymentVerifier, VerificationRequest, VerificationResult};
use async_trait::async_trait;
use shared::error::ApiResponse;
use std::time::Duration;

const VERIFY_TIMEOUT: Duration = Duration::from_secs(20);

/// Calls `POST {url}` with a bearer token
pub struct HttpPaymentVerifier {
    client: reqwest::Client,
    url: String,
    token: String,
}

impl HttpPaymentVerifier {
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(VERIFY_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            url: url.into(),
            token: token.into(),
        }
    }
}

#[async_trait]
impl PaymentVerifier for HttpPaymentVerifier {
    async fn verify(&self, request: &VerificationRequest) -> PaymentResult<VerificationResult> {
        let resp = self
            .client
            .post(&self.url)
            .bearer_auth(&self.token)
            .json(request)
            .send()
            .await
            .map_err(|e| PaymentError::VerifierUnavailable(e.to_string()))?;

        let status = resp.status();
        if status.is_server_error() {
            return Err(PaymentError::VerifierUnavailable(format!(
                "verification endpoint returned {status}"
            )));
        }

        let body: ApiResponse<VerificationResult> = resp
            .json()
            .await
            .map_err(|e| PaymentError::VerifierUnavailable(format!("unreadable response: {e}")))?;

        match body.data {
            Some(result) if status.is_success() => Ok(result),
            _ => Err(PaymentError::VerificationFailed {
                reference: request.reference.clone(),
                reason: body.message,
            }),
        }
    }
}

/// Verifies directly against Paystack
pub struct PaystackVerifier {
    paystack: PaystackClient,
}

impl PaystackVerifier {
    pub fn new(paystack: PaystackClient) -> Self {
        Self { paystack }
    }
}

#[async_trait]
impl PaymentVerifier for PaystackVerifier {
    async fn verify(&self, request: &VerificationRequest) -> PaymentResult<VerificationResult> {
        let tx = self.paystack.verify_transaction(&request.reference).await?;
        let expected_minor = to_minor_units(request.amount);
        let amount_matches = tx.amount_minor == expected_minor;
        let verified = tx.is_success() && amount_matches && tx.reference == request.reference;

        if tx.is_success() && !amount_matches {
            tracing::warn!(
                target: "security",
                reference = %request.reference,
                expected_minor,
                paid_minor = tx.amount_minor,
                customer_id = request.order_context.customer_id,
                "Paid amount does not match order total"
            );
        }
        tracing::info!(
            target: "audit",
            reference = %request.reference,
            provider_status = %tx.status,
            verified,
            "Payment verified with provider"
        );

        Ok(VerificationResult {
            reference: tx.reference,
            verified,
            status: tx.status,
            gateway_response: tx.gateway_response,
            raw: tx.raw,
        })
    }
}
