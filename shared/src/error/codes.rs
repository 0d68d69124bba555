//! Unified error codes for the marketplace checkout engine
//!
//! This module defines all error codes used across market-server and the
//! storefront frontend. Error codes are organized by category:
//! - 0xxx: General errors
//! - 1xxx: Authentication errors
//! - 4xxx: Order errors
//! - 5xxx: Payment errors
//! - 6xxx: Product / stock errors
//! - 9xxx: System errors

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unified error code enum
///
/// All error codes are represented as u16 values for efficient serialization
/// and cross-language compatibility (Rust, TypeScript, etc.)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
#[repr(u16)]
pub enum ErrorCode {
    // ==================== 0xxx: General ====================
    /// Operation completed successfully
    Success = 0,
    /// Unknown error
    Unknown = 1,
    /// Validation failed
    ValidationFailed = 2,
    /// Resource not found
    NotFound = 3,
    /// Resource already exists
    AlreadyExists = 4,
    /// Invalid request
    InvalidRequest = 5,
    /// Value out of range
    ValueOutOfRange = 8,

    // ==================== 1xxx: Auth ====================
    /// Buyer is not authenticated
    NotAuthenticated = 1001,

    // ==================== 4xxx: Order ====================
    /// Order not found
    OrderNotFound = 4001,
    /// Order has already been cancelled
    OrderAlreadyCancelled = 4004,
    /// Order has no line items
    OrderEmpty = 4007,
    /// Order can no longer be cancelled (shipped/delivered)
    OrderNotCancellable = 4008,
    /// Order header written but line items missing
    OrderPartialCommit = 4010,
    /// Cart is empty
    CartEmpty = 4011,

    // ==================== 5xxx: Payment ====================
    /// Payment declined / failed at the provider
    PaymentFailed = 5001,
    /// Verified amount does not match the order total
    PaymentInsufficientAmount = 5002,
    /// Invalid payment method
    PaymentInvalidMethod = 5003,
    /// Buyer closed the payment window
    PaymentCancelled = 5006,
    /// Server-side verification rejected the payment
    PaymentVerificationFailed = 5007,
    /// Server-side verification endpoint unreachable
    PaymentVerificationUnavailable = 5008,
    /// Webhook signature invalid
    PaymentSignatureInvalid = 5009,

    // ==================== 6xxx: Product / Stock ====================
    /// Product not found
    ProductNotFound = 6001,
    /// Product has invalid price
    ProductInvalidPrice = 6002,
    /// Product is out of stock
    ProductOutOfStock = 6003,
    /// Requested quantity exceeds available stock
    StockInsufficient = 6004,
    /// Stock changed concurrently, retry with a fresh read
    StockConflict = 6005,
    /// Reservation not found
    ReservationNotFound = 6010,
    /// Reservation expired before it could be confirmed
    ReservationExpired = 6011,
    /// Checkout blocked by stock issues
    CheckoutBlocked = 6012,

    // ==================== 9xxx: System ====================
    /// Internal server error
    InternalError = 9001,
    /// Database error
    DatabaseError = 9002,
    /// Network error
    NetworkError = 9003,
    /// Operation timeout
    TimeoutError = 9004,
    /// Configuration error
    ConfigError = 9005,
}

impl ErrorCode {
    /// Get the numeric code value
    #[inline]
    pub const fn code(&self) -> u16 {
        *self as u16
    }

    /// Check if this is a success code
    #[inline]
    pub const fn is_success(&self) -> bool {
        matches!(self, ErrorCode::Success)
    }

    /// Whether the buyer can simply retry the same action
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorCode::StockConflict
                | ErrorCode::PaymentCancelled
                | ErrorCode::PaymentVerificationUnavailable
                | ErrorCode::NetworkError
                | ErrorCode::TimeoutError
        )
    }

    /// Get the developer-facing English message for this error code
    pub const fn message(&self) -> &'static str {
        match self {
            // General
            ErrorCode::Success => "Operation completed successfully",
            ErrorCode::Unknown => "An unknown error occurred",
            ErrorCode::ValidationFailed => "Validation failed",
            ErrorCode::NotFound => "Resource not found",
            ErrorCode::AlreadyExists => "Resource already exists",
            ErrorCode::InvalidRequest => "Invalid request",
            ErrorCode::ValueOutOfRange => "Value is out of range",

            // Auth
            ErrorCode::NotAuthenticated => "Buyer is not authenticated",

            // Order
            ErrorCode::OrderNotFound => "Order not found",
            ErrorCode::OrderAlreadyCancelled => "Order has already been cancelled",
            ErrorCode::OrderEmpty => "Order is empty",
            ErrorCode::OrderNotCancellable => "Order can no longer be cancelled",
            ErrorCode::OrderPartialCommit => "Order was only partially recorded",
            ErrorCode::CartEmpty => "Cart is empty",

            // Payment
            ErrorCode::PaymentFailed => "Payment was declined",
            ErrorCode::PaymentInsufficientAmount => "Paid amount does not match order total",
            ErrorCode::PaymentInvalidMethod => "Invalid payment method",
            ErrorCode::PaymentCancelled => "Payment was cancelled",
            ErrorCode::PaymentVerificationFailed => "Payment could not be verified",
            ErrorCode::PaymentVerificationUnavailable => {
                "Payment verification is temporarily unavailable"
            }
            ErrorCode::PaymentSignatureInvalid => "Payment webhook signature is invalid",

            // Product / Stock
            ErrorCode::ProductNotFound => "Product not found",
            ErrorCode::ProductInvalidPrice => "Product has invalid price",
            ErrorCode::ProductOutOfStock => "Product is out of stock",
            ErrorCode::StockInsufficient => "Not enough stock for the requested quantity",
            ErrorCode::StockConflict => "Stock changed while reserving, please try again",
            ErrorCode::ReservationNotFound => "Reservation not found",
            ErrorCode::ReservationExpired => "Reservation has expired",
            ErrorCode::CheckoutBlocked => "Some items in the cart are unavailable",

            // System
            ErrorCode::InternalError => "Internal server error",
            ErrorCode::DatabaseError => "Database error",
            ErrorCode::NetworkError => "Network error",
            ErrorCode::TimeoutError => "Operation timed out",
            ErrorCode::ConfigError => "Configuration error",
        }
    }
}

impl From<ErrorCode> for u16 {
    #[inline]
    fn from(code: ErrorCode) -> Self {
        code.code()
    }
}

/// Error when converting from an invalid u16 to ErrorCode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidErrorCode(pub u16);

impl fmt::Display for InvalidErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid error code: {}", self.0)
    }
}

impl std::error::Error for InvalidErrorCode {}

impl TryFrom<u16> for ErrorCode {
    type Error = InvalidErrorCode;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            // General
            0 => Ok(ErrorCode::Success),
            1 => Ok(ErrorCode::Unknown),
            2 => Ok(ErrorCode::ValidationFailed),
            3 => Ok(ErrorCode::NotFound),
            4 => Ok(ErrorCode::AlreadyExists),
            5 => Ok(ErrorCode::InvalidRequest),
            8 => Ok(ErrorCode::ValueOutOfRange),

            // Auth
            1001 => Ok(ErrorCode::NotAuthenticated),

            // Order
            4001 => Ok(ErrorCode::OrderNotFound),
            4004 => Ok(ErrorCode::OrderAlreadyCancelled),
            4007 => Ok(ErrorCode::OrderEmpty),
            4008 => Ok(ErrorCode::OrderNotCancellable),
            4010 => Ok(ErrorCode::OrderPartialCommit),
            4011 => Ok(ErrorCode::CartEmpty),

            // Payment
            5001 => Ok(ErrorCode::PaymentFailed),
            5002 => Ok(ErrorCode::PaymentInsufficientAmount),
            5003 => Ok(ErrorCode::PaymentInvalidMethod),
            5006 => Ok(ErrorCode::PaymentCancelled),
            5007 => Ok(ErrorCode::PaymentVerificationFailed),
            5008 => Ok(ErrorCode::PaymentVerificationUnavailable),
            5009 => Ok(ErrorCode::PaymentSignatureInvalid),

            // Product / Stock
            6001 => Ok(ErrorCode::ProductNotFound),
            6002 => Ok(ErrorCode::ProductInvalidPrice),
            6003 => Ok(ErrorCode::ProductOutOfStock),
            6004 => Ok(ErrorCode::StockInsufficient),
            6005 => Ok(ErrorCode::StockConflict),
            6010 => Ok(ErrorCode::ReservationNotFound),
            6011 => Ok(ErrorCode::ReservationExpired),
            6012 => Ok(ErrorCode::CheckoutBlocked),

            // System
            9001 => Ok(ErrorCode::InternalError),
            9002 => Ok(ErrorCode::DatabaseError),
            9003 => Ok(ErrorCode::NetworkError),
            9004 => Ok(ErrorCode::TimeoutError),
            9005 => Ok(ErrorCode::ConfigError),

            _ => Err(InvalidErrorCode(value)),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_values() {
        assert_eq!(ErrorCode::Success.code(), 0);
        assert_eq!(ErrorCode::NotFound.code(), 3);
        assert_eq!(ErrorCode::NotAuthenticated.code(), 1001);
        assert_eq!(ErrorCode::OrderNotFound.code(), 4001);
        assert_eq!(ErrorCode::OrderPartialCommit.code(), 4010);
        assert_eq!(ErrorCode::PaymentFailed.code(), 5001);
        assert_eq!(ErrorCode::PaymentCancelled.code(), 5006);
        assert_eq!(ErrorCode::PaymentVerificationFailed.code(), 5007);
        assert_eq!(ErrorCode::ProductOutOfStock.code(), 6003);
        assert_eq!(ErrorCode::StockInsufficient.code(), 6004);
        assert_eq!(ErrorCode::StockConflict.code(), 6005);
        assert_eq!(ErrorCode::InternalError.code(), 9001);
    }

    #[test]
    fn test_is_success() {
        assert!(ErrorCode::Success.is_success());
        assert!(!ErrorCode::Unknown.is_success());
        assert!(!ErrorCode::StockConflict.is_success());
    }

    #[test]
    fn test_retryable_codes() {
        assert!(ErrorCode::StockConflict.is_retryable());
        assert!(ErrorCode::PaymentCancelled.is_retryable());
        assert!(ErrorCode::PaymentVerificationUnavailable.is_retryable());
        assert!(!ErrorCode::StockInsufficient.is_retryable());
        assert!(!ErrorCode::PaymentVerificationFailed.is_retryable());
    }

    #[test]
    fn test_try_from_every_known_code() {
        let codes = [
            ErrorCode::Success,
            ErrorCode::ValueOutOfRange,
            ErrorCode::NotAuthenticated,
            ErrorCode::CartEmpty,
            ErrorCode::PaymentSignatureInvalid,
            ErrorCode::CheckoutBlocked,
            ErrorCode::ConfigError,
        ];
        for code in codes {
            assert_eq!(ErrorCode::try_from(code.code()), Ok(code));
        }
    }

    #[test]
    fn test_try_from_invalid() {
        assert_eq!(ErrorCode::try_from(999), Err(InvalidErrorCode(999)));
        assert_eq!(ErrorCode::try_from(7001), Err(InvalidErrorCode(7001)));
    }

    #[test]
    fn test_serialize_as_number() {
        assert_eq!(serde_json::to_string(&ErrorCode::StockConflict).unwrap(), "6005");
        let code: ErrorCode = serde_json::from_str("5006").unwrap();
        assert_eq!(code, ErrorCode::PaymentCancelled);
        assert!(serde_json::from_str::<ErrorCode>("10000").is_err());
    }

    #[test]
    fn test_display_and_message() {
        assert_eq!(format!("{}", ErrorCode::OrderNotFound), "4001");
        assert_eq!(ErrorCode::OrderNotFound.message(), "Order not found");
        assert_eq!(
            format!("{}", InvalidErrorCode(999)),
            "invalid error code: 999"
        );
    }
}
