//! Payment Gateway Adapter

use super::error::{PaymentError, PaymentResult};
use super::reference::generate_reference;
use super::{
    CallbackStatus, OrderContext, PaymentRequest, PaymentUi, PaymentVerifier,
    VerificationRequest, VerificationResult,
};
use rust_decimal::Decimal;
use std::sync::Arc;

pub struct PaymentGatewayAdapter {
    ui: Arc<dyn PaymentUi>,
    verifier: Arc<dyn PaymentVerifier>,
    reference_prefix: String,
}

impl PaymentGatewayAdapter {
    pub fn new(
        ui: Arc<dyn PaymentUi>,
        verifier: Arc<dyn PaymentVerifier>,
        reference_prefix: impl Into<String>,
    ) -> Self {
        Self {
            ui,
            verifier,
            reference_prefix: reference_prefix.into(),
        }
    }

    /// Fresh reference for one payment attempt
    pub fn new_reference(&self) -> String {
        generate_reference(&self.reference_prefix)
    }

    /// Open the payment window and wait for the buyer
    ///
    /// Returns the reference the provider reported success for. Buyer
    /// cancellation and provider decline are distinct errors.
    pub async fn initiate_payment(&self, request: &PaymentRequest) -> PaymentResult<String> {
        tracing::info!(
            reference = %request.reference,
            amount = %request.amount,
            channels = ?request.channels,
            "Initiating payment"
        );
        let callback = self.ui.open(request).await?;

        if callback.reference != request.reference {
            tracing::warn!(
                target: "security",
                expected = %request.reference,
                received = %callback.reference,
                "Payment callback reference mismatch"
            );
            return Err(PaymentError::Provider(
                "callback reference does not match payment attempt".into(),
            ));
        }

        match callback.status {
            CallbackStatus::Success => Ok(callback.reference),
            CallbackStatus::Cancelled => {
                tracing::info!(reference = %callback.reference, "Payment cancelled by buyer");
                Err(PaymentError::Cancelled {
                    reference: callback.reference,
                })
            }
            CallbackStatus::Failed { reason } => {
                tracing::info!(reference = %callback.reference, reason = ?reason, "Payment declined");
                Err(PaymentError::Declined { reason })
            }
        }
    }

    /// Ask the server-side verifier whether `reference` is really paid
    pub async fn verify_payment(
        &self,
        reference: &str,
        amount: Decimal,
        order_context: OrderContext,
    ) -> PaymentResult<VerificationResult> {
        let request = VerificationRequest {
            reference: reference.to_string(),
            amount,
            order_context,
        };
        let result = self.verifier.verify(&request).await?;
        tracing::info!(
            target: "audit",
            reference,
            verified = result.verified,
            status = %result.status,
            "Payment verification result"
        );
        Ok(result)
    }
}
