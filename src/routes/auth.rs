use std::sync::Arc;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::AppError;
use crate::AppState;

type HmacSha256 = Hmac<Sha256>;

/// Bearer token from the `Authorization` header, if present and non-empty.
pub fn bearer_token(parts: &Parts) -> Option<&str> {
    let header = parts
        .headers
        .get(http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())?;

    if header.len() < 7 || !header[..7].eq_ignore_ascii_case("bearer ") {
        return None;
    }

    let token = header[7..].trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

/// Compare a presented token with the configured secret in constant time.
///
/// Both sides are run through HMAC-SHA256 keyed by the secret and the tags
/// are compared with `verify_slice`, so neither the content nor the length
/// of the secret leaks through timing. An empty secret never matches.
pub fn tokens_match(provided: &str, expected: &str) -> bool {
    if expected.is_empty() {
        return false;
    }

    let Ok(mut expected_mac) = HmacSha256::new_from_slice(expected.as_bytes()) else {
        return false;
    };
    expected_mac.update(expected.as_bytes());
    let expected_tag = expected_mac.finalize().into_bytes();

    let Ok(mut mac) = HmacSha256::new_from_slice(expected.as_bytes()) else {
        return false;
    };
    mac.update(provided.as_bytes());
    mac.verify_slice(&expected_tag).is_ok()
}

/// Caller presented the admin API token.
pub struct AdminAuth;

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AdminAuth {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let Some(expected) = state.config.admin.api_token.as_deref() else {
            return Err(AppError::ServiceUnavailable(
                "Admin API is not configured".to_string(),
            ));
        };

        let token = bearer_token(parts).ok_or_else(|| {
            tracing::debug!("Missing or malformed Authorization header on admin route");
            AppError::Unauthorized
        })?;

        if !tokens_match(token, expected) {
            tracing::debug!("Rejected admin request with an invalid token");
            return Err(AppError::Unauthorized);
        }

        Ok(AdminAuth)
    }
}
