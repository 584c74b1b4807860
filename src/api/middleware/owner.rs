//! Caller identity from the `X-Owner-Id` header.
//!
//! The upstream auth layer sets the header after validating the caller.
//! Routes that read or compare stored summaries are wrapped in
//! [`require_owner`]; `/analyze` reads the header optionally through
//! [`owner_from_headers`].

use axum::http::{HeaderMap, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::api::error::ApiError;
use crate::api::types::{OwnerContext, OWNER_HEADER};

/// Longest accepted owner id.
const MAX_OWNER_LEN: usize = 128;

/// Trimmed, non-empty owner id from the request headers.
pub fn owner_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get(OWNER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty() && v.len() <= MAX_OWNER_LEN)
        .map(str::to_string)
}

/// Reject requests without a caller identity; inject [`OwnerContext`]
/// for downstream handlers otherwise.
pub async fn require_owner(mut req: Request<axum::body::Body>, next: Next) -> Response {
    let Some(owner_id) = owner_from_headers(req.headers()) else {
        tracing::debug!(path = %req.uri().path(), "Request without owner identity");
        return ApiError::Unauthorized.into_response();
    };

    req.extensions_mut().insert(OwnerContext { owner_id });
    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn reads_trimmed_owner() {
        let mut headers = HeaderMap::new();
        headers.insert(OWNER_HEADER, HeaderValue::from_static("  alice "));
        assert_eq!(owner_from_headers(&headers).as_deref(), Some("alice"));
    }

    #[test]
    fn blank_or_missing_owner_is_none() {
        let mut headers = HeaderMap::new();
        assert!(owner_from_headers(&headers).is_none());
        headers.insert(OWNER_HEADER, HeaderValue::from_static("   "));
        assert!(owner_from_headers(&headers).is_none());
    }

    #[test]
    fn oversized_owner_is_rejected() {
        let mut headers = HeaderMap::new();
        let long = "a".repeat(MAX_OWNER_LEN + 1);
        headers.insert(OWNER_HEADER, HeaderValue::from_str(&long).unwrap());
        assert!(owner_from_headers(&headers).is_none());
    }
}
