use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::db::models::User;
use crate::error::AppError;
use crate::services::AuthService;
use crate::AppState;

fn bearer_token(headers: &axum::http::HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Compares `provided` with `expected` in constant time by checking both
/// HMAC tags under the expected key with `verify_slice`.
fn keys_match(provided: &str, expected: &str) -> bool {
    let tag = |value: &str| {
        Hmac::<Sha256>::new_from_slice(expected.as_bytes()).map(|mut mac| {
            mac.update(value.as_bytes());
            mac
        })
    };
    match (tag(provided), tag(expected)) {
        (Ok(provided), Ok(expected)) => provided
            .verify_slice(&expected.finalize().into_bytes())
            .is_ok(),
        _ => false,
    }
}

/// Guards `/admin` routes with the configured admin API key.
pub async fn admin_auth(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    match bearer_token(req.headers()) {
        Some(key) if keys_match(key, &state.config.admin_api_key) => Ok(next.run(req).await),
        Some(_) => {
            tracing::warn!(uri = %req.uri(), "Rejected admin request with wrong key");
            Err(AppError::Unauthorized("Invalid admin API key".to_string()))
        }
        None => Err(AppError::Unauthorized("Missing admin API key".to_string())),
    }
}

/// The authenticated caller, resolved from `Authorization: Bearer <token>`.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user: User,
    pub token: String,
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)
            .ok_or_else(|| AppError::Unauthorized("Missing bearer token".to_string()))?
            .to_string();

        let user = AuthService::new(state.db.clone()).authenticate(&token).await?;
        Ok(CurrentUser { user, token })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderMap;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, value.parse().unwrap());
        headers
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token(&headers("Bearer abc123")), Some("abc123"));
        assert_eq!(bearer_token(&headers("Basic abc123")), None);
        assert_eq!(bearer_token(&headers("Bearer ")), None);
        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }

    #[test]
    fn test_admin_key_comparison() {
        assert!(keys_match("admin-key-0123", "admin-key-0123"));
        assert!(!keys_match("admin-key-0124", "admin-key-0123"));
        assert!(!keys_match("admin-key", "admin-key-0123"));
        assert!(!keys_match("", "admin-key-0123"));
    }
}
