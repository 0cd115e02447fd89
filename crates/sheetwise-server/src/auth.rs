//! Request identity extractors
//!
//! User identity is asserted by the fronting web application through the
//! `x-user-id` header. Admin calls carry a shared secret in `x-admin-token`.

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use sheetwise_core::UserId;

use crate::ServerState;
use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

/// The user a request acts for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentUser(pub UserId);

#[async_trait::async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<UserId>().ok())
            .map(CurrentUser)
            .ok_or(ApiError::Unauthenticated)
    }
}

/// Proof that the caller presented the configured admin token.
#[derive(Debug, Clone, Copy)]
pub struct AdminAccess;

#[async_trait::async_trait]
impl FromRequestParts<Arc<ServerState>> for AdminAccess {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<ServerState>) -> Result<Self, Self::Rejection> {
        let expected = state.admin_token.as_deref().ok_or(ApiError::AdminDisabled)?;
        let presented = parts
            .headers
            .get(ADMIN_TOKEN_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or(ApiError::Forbidden)?;

        if tokens_match(presented.as_bytes(), expected.as_bytes()) {
            Ok(AdminAccess)
        } else {
            Err(ApiError::Forbidden)
        }
    }
}

/// Compare without short-circuiting on the first differing byte.
fn tokens_match(presented: &[u8], expected: &[u8]) -> bool {
    presented.len() == expected.len() && presented.iter().zip(expected).fold(0u8, |acc, (a, b)| acc | (a ^ b)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract_user(header: Option<&str>) -> Result<CurrentUser, ApiError> {
        let mut builder = Request::builder().uri("/api/account");
        if let Some(value) = header {
            builder = builder.header(USER_ID_HEADER, value);
        }
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        CurrentUser::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn test_user_header() {
        assert_eq!(extract_user(Some("42")).await.unwrap(), CurrentUser(UserId(42)));
        assert_eq!(extract_user(Some(" 7 ")).await.unwrap(), CurrentUser(UserId(7)));
        assert!(matches!(extract_user(Some("alice")).await, Err(ApiError::Unauthenticated)));
        assert!(matches!(extract_user(None).await, Err(ApiError::Unauthenticated)));
    }

    #[test]
    fn test_tokens_match() {
        assert!(tokens_match(b"secret", b"secret"));
        assert!(!tokens_match(b"secret", b"secreT"));
        assert!(!tokens_match(b"secret", b"secret2"));
    }
}
