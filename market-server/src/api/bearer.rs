//! Bearer token check for server-to-server and operator routes

use axum::http::HeaderMap;
use shared::error::{AppError, AppResult};
use subtle::ConstantTimeEq;

/// Require `Authorization: Bearer <expected>`; compared in constant time
pub fn require_bearer(headers: &HeaderMap, expected: &str) -> AppResult<()> {
    let presented = headers
        .get(http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or_default();
    if token_matches(presented, expected) {
        Ok(())
    } else {
        Err(AppError::not_authenticated())
    }
}

fn token_matches(presented: &str, expected: &str) -> bool {
    !expected.is_empty() && bool::from(presented.as_bytes().ct_eq(expected.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn headers(value: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(v) = value {
            headers.insert(http::header::AUTHORIZATION, HeaderValue::from_str(v).unwrap());
        }
        headers
    }

    #[test]
    fn test_accepts_exact_token_only() {
        assert!(require_bearer(&headers(Some("Bearer s3cret")), "s3cret").is_ok());
        assert!(require_bearer(&headers(Some("Bearer s3cre")), "s3cret").is_err());
        assert!(require_bearer(&headers(Some("Bearer s3cret2")), "s3cret").is_err());
        assert!(require_bearer(&headers(Some("s3cret")), "s3cret").is_err());
        assert!(require_bearer(&headers(None), "s3cret").is_err());
    }

    #[test]
    fn test_empty_expected_token_never_matches() {
        assert!(!token_matches("", ""));
    }
}
