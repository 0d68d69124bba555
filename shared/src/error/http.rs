//! HTTP status code mapping for error codes

use super::codes::ErrorCode;
use http::StatusCode;

impl ErrorCode {
    /// Get the appropriate HTTP status code for this error code
    pub fn http_status(&self) -> StatusCode {
        match self {
            // Success
            Self::Success => StatusCode::OK,

            // 404 Not Found
            Self::NotFound
            | Self::OrderNotFound
            | Self::ProductNotFound
            | Self::ReservationNotFound => StatusCode::NOT_FOUND,

            // 409 Conflict (stock moved underneath the buyer, or state already changed)
            Self::AlreadyExists
            | Self::OrderAlreadyCancelled
            | Self::OrderNotCancellable
            | Self::ProductOutOfStock
            | Self::StockInsufficient
            | Self::StockConflict
            | Self::ReservationExpired
            | Self::CheckoutBlocked => StatusCode::CONFLICT,

            // 401 Unauthorized
            Self::NotAuthenticated | Self::PaymentSignatureInvalid => StatusCode::UNAUTHORIZED,

            // 402 Payment Required
            Self::PaymentFailed
            | Self::PaymentInsufficientAmount
            | Self::PaymentVerificationFailed => StatusCode::PAYMENT_REQUIRED,

            // 503 Service Unavailable (transient errors, client can retry)
            Self::PaymentVerificationUnavailable | Self::NetworkError | Self::TimeoutError => {
                StatusCode::SERVICE_UNAVAILABLE
            }

            // 500 Internal Server Error
            Self::InternalError
            | Self::DatabaseError
            | Self::ConfigError
            | Self::OrderPartialCommit => StatusCode::INTERNAL_SERVER_ERROR,

            // 400 Bad Request (default for validation/business errors)
            _ => StatusCode::BAD_REQUEST,
        }
    }
}
