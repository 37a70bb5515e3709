//! API key authentication.
//!
//! Keys are compared as SHA-256 digests with a constant-time fold, so the
//! comparison time depends on neither the key length nor the first mismatch.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use sha2::{Digest, Sha256};

use crate::http::response::ApiError;
use crate::http::server::AppState;

/// Header carrying the API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// SHA-256 digest of a key.
pub fn digest(key: &str) -> [u8; 32] {
    Sha256::digest(key.as_bytes()).into()
}

/// Constant-time digest equality.
pub fn digests_match(a: &[u8; 32], b: &[u8; 32]) -> bool {
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Reject requests without a matching `X-API-Key` when a key is configured.
pub async fn require_api_key(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let Some(expected) = state.api_key else {
        return next.run(request).await;
    };

    let presented = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok());

    match presented {
        Some(key) if digests_match(&digest(key), &expected) => next.run(request).await,
        _ => {
            tracing::warn!(path = %request.uri().path(), "Rejected request with missing or invalid API key");
            ApiError::unauthorized().into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_comparison() {
        let key = digest("s3cret");
        assert!(digests_match(&key, &digest("s3cret")));
        assert!(!digests_match(&key, &digest("s3cret ")));
        assert!(!digests_match(&key, &digest("")));
    }
}
