//! Payment error types

use shared::error::{AppError, ErrorCode};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PaymentError {
    /// Buyer closed or abandoned the payment window
    #[error("Payment {reference} was cancelled by the buyer")]
    Cancelled { reference: String },

    #[error("Payment declined: {}", reason.as_deref().unwrap_or("no reason given"))]
    Declined { reason: Option<String> },

    /// Verifier answered, and the answer is "not paid"
    #[error("Payment {reference} could not be verified: {reason}")]
    VerificationFailed { reference: String, reason: String },

    /// Verifier could not be reached or errored
    #[error("Payment verifier unavailable: {0}")]
    VerifierUnavailable(String),

    #[error("Payment provider error: {0}")]
    Provider(String),

    #[error("Invalid webhook signature: {0}")]
    SignatureInvalid(&'static str),
}

pub type PaymentResult<T> = Result<T, PaymentError>;

impl From<PaymentError> for AppError {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::Cancelled { reference } => {
                AppError::new(ErrorCode::PaymentCancelled).with_detail("reference", reference)
            }
            PaymentError::Declined { reason } => AppError::payment_declined(reason),
            PaymentError::VerificationFailed { reference, reason } => {
                AppError::with_message(ErrorCode::PaymentVerificationFailed, reason)
                    .with_detail("reference", reference)
            }
            PaymentError::VerifierUnavailable(msg) => {
                tracing::warn!(error = %msg, "Payment verifier unavailable");
                AppError::new(ErrorCode::PaymentVerificationUnavailable)
            }
            PaymentError::Provider(msg) => AppError::with_message(ErrorCode::PaymentFailed, msg),
            PaymentError::SignatureInvalid(reason) => {
                AppError::with_message(ErrorCode::PaymentSignatureInvalid, reason)
            }
        }
    }
}
