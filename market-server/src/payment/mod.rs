//! Payment Gateway integration
//!
//! The provider UI is never trusted to confirm success: every claimed
//! success is re-checked by a server-side verification call before an order
//! may be committed.
//!
//! - [`PaymentUi`] - opens the provider's payment window, yields a callback
//! - [`PaymentVerifier`] - server-side verification of a reference
//! - [`PaymentGatewayAdapter`] - the two combined, used by checkout

pub mod adapter;
pub mod error;
pub mod hosted;
pub mod paystack;
pub mod reference;
pub mod verifier;

pub use adapter::PaymentGatewayAdapter;
pub use error::{PaymentError, PaymentResult};
pub use hosted::{CallbackRegistry, HostedCheckout};
pub use paystack::PaystackClient;
pub use verifier::{HttpPaymentVerifier, PaystackVerifier};

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// What the payment window is opened with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub email: String,
    pub amount: Decimal,
    pub reference: String,
    pub channels: Vec<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CallbackStatus {
    /// Provider reports success; still subject to verification
    Success,
    Failed { reason: Option<String> },
    Cancelled,
}

/// Provider callback for one payment attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentCallback {
    pub reference: String,
    #[serde(flatten)]
    pub status: CallbackStatus,
}

/// Context forwarded to the verifier for amount and ownership checks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderContext {
    pub customer_id: i64,
    pub line_count: usize,
    pub shipping_region: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationRequest {
    pub reference: String,
    pub amount: Decimal,
    pub order_context: OrderContext,
}

/// Verifier answer; only `verified = true` authorizes a commit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub reference: String,
    pub verified: bool,
    /// Provider transaction status (`success`, `failed`, `abandoned`, ...)
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway_response: Option<String>,
    #[serde(default)]
    pub raw: serde_json::Value,
}

/// Opens the provider's payment UI and waits for its callback
#[async_trait]
pub trait PaymentUi: Send + Sync {
    async fn open(&self, request: &PaymentRequest) -> PaymentResult<PaymentCallback>;
}

/// Server-side verification of a payment reference
#[async_trait]
pub trait PaymentVerifier: Send + Sync {
    async fn verify(&self, request: &VerificationRequest) -> PaymentResult<VerificationResult>;
}
