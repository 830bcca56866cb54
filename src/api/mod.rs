/// HTTP API surface
///
/// Thin mapping layer only; all lifecycle behavior lives in the account
/// manager.
mod auth;
mod profile;

use axum::{
    routing::{get, post},
    Router,
};
use chrono::NaiveDate;

use crate::{context::AppContext, error::AuthError, store::GenderCode};

/// Build the API route table
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/refresh", post(auth::refresh))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/email/recover", post(auth::find_email))
        .route("/auth/password/forgot", post(auth::forgot_password))
        .route("/auth/password/reset", post(auth::reset_password))
        .route(
            "/profile",
            get(profile::get_profile)
                .put(profile::update_profile)
                .delete(profile::delete_account),
        )
        .route("/profile/password", post(profile::change_password))
}

pub(crate) fn parse_birth_date(value: &str) -> Result<NaiveDate, AuthError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| AuthError::Validation("birthDate must be YYYY-MM-DD".to_string()))
}

pub(crate) fn parse_gender(code: &str) -> Result<GenderCode, AuthError> {
    GenderCode::from_code(code)
        .ok_or_else(|| AuthError::Validation(format!("unknown gender code {code:?}")))
}

/// E.164: leading '+', 8-15 digits, no leading zero
pub(crate) fn validate_phone(phone: &str) -> Result<(), AuthError> {
    let digits = phone.strip_prefix('+').unwrap_or("");
    if digits.len() < 8
        || digits.len() > 15
        || digits.starts_with('0')
        || !digits.chars().all(|c| c.is_ascii_digit())
    {
        return Err(AuthError::Validation(
            "phoneNumber must be an E.164 number".to_string(),
        ));
    }
    Ok(())
}
