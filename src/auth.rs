/// Authentication extractor for protected routes
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};

use crate::{context::AppContext, error::AuthError, token::TokenError};

/// Caller identity proven by a bearer access token
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub account_id: i64,
}

/// Pull the bearer token out of the Authorization header
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

#[async_trait]
impl FromRequestParts<AppContext> for AuthContext {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let token =
            extract_bearer_token(&parts.headers).ok_or(AuthError::InvalidAccessToken)?;

        let account_id = state.codec.verify_access_token(token).map_err(|e| match e {
            TokenError::Expired => AuthError::AccessTokenExpired,
            TokenError::Invalid => AuthError::InvalidAccessToken,
        })?;

        Ok(AuthContext { account_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer abc123token"),
        );
        assert_eq!(extract_bearer_token(&headers), Some("abc123token"));

        let mut bare = HeaderMap::new();
        bare.insert(header::AUTHORIZATION, HeaderValue::from_static("abc123token"));
        assert_eq!(extract_bearer_token(&bare), None);

        assert_eq!(extract_bearer_token(&HeaderMap::new()), None);
    }
}
