//! Checkout: validation, pricing and the payment → verify → commit flow

pub mod error;
pub mod orchestrator;
pub mod pricing;
pub mod validation;

pub use error::CheckoutError;
pub use orchestrator::{
    CheckoutOrchestrator, CheckoutReceipt, CheckoutSession, CheckoutState, VerificationFallback,
};
pub use pricing::{ShippingRates, VAT_RATE, calculate_totals};
pub use validation::{ValidatedCart, validate_cart};
