/// Unified error types for Keygate
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::StoreError;

/// Main error type for the service
#[derive(Error, Debug)]
pub enum AuthError {
    /// A registration collided with an existing active account
    #[error("email already exists")]
    EmailExists,

    /// No active account matched the lookup
    #[error("user not found")]
    UserNotFound,

    /// Login password did not match the stored digest
    #[error("invalid password")]
    InvalidPassword,

    /// Current-password check failed on a credential mutation
    #[error("current password is incorrect")]
    IncorrectPassword,

    /// Access token failed signature or claim checks
    #[error("invalid access token")]
    InvalidAccessToken,

    /// Access token is past its expiry
    #[error("access token expired")]
    AccessTokenExpired,

    /// Refresh token failed signature or claim checks
    #[error("invalid refresh token")]
    InvalidRefreshToken,

    /// No stored grant matched the refresh token (revoked or rotated away)
    #[error("refresh token not found")]
    RefreshTokenNotFound,

    /// Stored refresh grant is past its expiry
    #[error("refresh token expired")]
    RefreshTokenExpired,

    /// Password-reset token is absent, expired, or already consumed
    #[error("invalid, expired, or already used token")]
    InvalidResetToken,

    /// No profile row for the account
    #[error("profile not found")]
    ProfileNotFound,

    /// Phone number belongs to another account
    #[error("phone number already in use")]
    PhoneInUse,

    /// Malformed input rejected at the boundary
    #[error("validation error: {0}")]
    Validation(String),

    /// Outbound email delivery failed
    #[error("email delivery failed: {0}")]
    Email(String),

    /// Password hashing failed
    #[error("password hashing failed: {0}")]
    Hash(String),

    /// Storage layer errors
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Everything else
    #[error("internal error: {0}")]
    Internal(String),
}

/// Error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

/// Convert AuthError to an HTTP response
impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            // Reported identically so callers cannot probe which half failed
            AuthError::UserNotFound | AuthError::InvalidPassword => (
                StatusCode::UNAUTHORIZED,
                "InvalidCredentials",
                "invalid credentials".to_string(),
            ),
            AuthError::IncorrectPassword => (
                StatusCode::UNAUTHORIZED,
                "IncorrectPassword",
                self.to_string(),
            ),
            AuthError::EmailExists => (StatusCode::CONFLICT, "EmailExists", self.to_string()),
            AuthError::PhoneInUse => (StatusCode::CONFLICT, "PhoneInUse", self.to_string()),
            AuthError::InvalidAccessToken | AuthError::AccessTokenExpired => (
                StatusCode::UNAUTHORIZED,
                "InvalidAccessToken",
                self.to_string(),
            ),
            AuthError::InvalidRefreshToken
            | AuthError::RefreshTokenNotFound
            | AuthError::RefreshTokenExpired => (
                StatusCode::UNAUTHORIZED,
                "InvalidRefreshToken",
                self.to_string(),
            ),
            AuthError::InvalidResetToken => (
                StatusCode::BAD_REQUEST,
                "InvalidResetToken",
                self.to_string(),
            ),
            AuthError::ProfileNotFound => {
                (StatusCode::NOT_FOUND, "NotFound", self.to_string())
            }
            AuthError::Validation(_) => {
                (StatusCode::BAD_REQUEST, "InvalidRequest", self.to_string())
            }
            AuthError::Store(_)
            | AuthError::Email(_)
            | AuthError::Hash(_)
            | AuthError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "InternalServerError",
                "internal server error".to_string(), // Don't leak details
            ),
        };

        let body = Json(ErrorBody {
            error: error_code.to_string(),
            message,
        });

        (status, body).into_response()
    }
}

/// Result type alias for service operations
pub type AuthResult<T> = Result<T, AuthError>;
