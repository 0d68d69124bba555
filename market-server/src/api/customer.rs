//! Buyer identity of a request
//!
//! The storefront's session layer authenticates the buyer and forwards the
//! id in `x-customer-id`. A missing or malformed header means "not signed
//! in"; operations that need a buyer reject that themselves.

use axum::extract::FromRequestParts;
use http::request::Parts;
use std::convert::Infallible;

pub const CUSTOMER_HEADER: &str = "x-customer-id";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentCustomer(pub Option<i64>);

impl<S: Send + Sync> FromRequestParts<S> for CurrentCustomer {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = parts
            .headers
            .get(CUSTOMER_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<i64>().ok())
            .filter(|id| *id > 0);
        Ok(CurrentCustomer(id))
    }
}

impl CurrentCustomer {
    pub fn require(self) -> shared::error::AppResult<i64> {
        self.0.ok_or_else(shared::error::AppError::not_authenticated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Request;

    async fn extract(header: Option<&str>) -> CurrentCustomer {
        let mut builder = Request::builder();
        if let Some(value) = header {
            builder = builder.header(CUSTOMER_HEADER, value);
        }
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        CurrentCustomer::from_request_parts(&mut parts, &()).await.unwrap()
    }

    #[tokio::test]
    async fn test_reads_customer_header() {
        assert_eq!(extract(Some("42")).await, CurrentCustomer(Some(42)));
        assert_eq!(extract(Some("abc")).await, CurrentCustomer(None));
        assert_eq!(extract(Some("-3")).await, CurrentCustomer(None));
        assert_eq!(extract(None).await, CurrentCustomer(None));
        assert!(extract(None).await.require().is_err());
    }
}
