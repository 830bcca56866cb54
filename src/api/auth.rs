/// Handlers for registration, login, token refresh, and recovery flows
use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use validator::Validate;

use crate::{
    account::{LoginSession, NewRegistration, RegisteredAccount, TokenPair},
    auth::AuthContext,
    context::AppContext,
    error::{AuthError, AuthResult},
};

use super::{parse_birth_date, parse_gender, validate_phone};

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
    #[validate(length(min = 1, max = 64))]
    pub name: String,
    #[validate(length(equal = 10))]
    pub birth_date: String,
    pub gender_code: String,
    pub phone_number: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoutRequest {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FindEmailRequest {
    pub phone_number: String,
}

#[derive(Debug, Serialize)]
pub struct FindEmailResponse {
    pub email: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ForgotPasswordRequest {
    #[validate(email)]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub token: String,
    #[validate(length(min = 8, max = 128))]
    pub new_password: String,
}

pub async fn register(
    State(ctx): State<AppContext>,
    Json(req): Json<RegisterRequest>,
) -> AuthResult<(StatusCode, Json<RegisteredAccount>)> {
    req.validate()
        .map_err(|e| AuthError::Validation(e.to_string()))?;
    validate_phone(&req.phone_number)?;

    let registration = NewRegistration {
        birth_date: parse_birth_date(&req.birth_date)?,
        gender: parse_gender(&req.gender_code)?,
        email: req.email,
        password: req.password,
        name: req.name,
        phone_number: req.phone_number,
    };
    let created = ctx.accounts.register(registration).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn login(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    Json(req): Json<LoginRequest>,
) -> AuthResult<Json<LoginSession>> {
    req.validate()
        .map_err(|e| AuthError::Validation(e.to_string()))?;

    let device_tag = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown");
    let session = ctx.accounts.login(&req.email, &req.password, device_tag).await?;
    Ok(Json(session))
}

pub async fn refresh(
    State(ctx): State<AppContext>,
    Json(req): Json<RefreshRequest>,
) -> AuthResult<Json<TokenPair>> {
    let pair = ctx.accounts.refresh_session(&req.refresh_token).await?;
    Ok(Json(pair))
}

pub async fn logout(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Json(req): Json<LogoutRequest>,
) -> AuthResult<Json<Value>> {
    ctx.accounts.logout(auth.account_id, &req.refresh_token).await?;
    Ok(Json(json!({ "success": true })))
}

pub async fn find_email(
    State(ctx): State<AppContext>,
    Json(req): Json<FindEmailRequest>,
) -> AuthResult<Json<FindEmailResponse>> {
    validate_phone(&req.phone_number)?;
    let email = ctx.accounts.find_email(&req.phone_number).await.map_err(
        |e| match e {
            // Absence renders as a plain not-found, nothing more specific
            AuthError::UserNotFound => AuthError::ProfileNotFound,
            other => other,
        },
    )?;
    Ok(Json(FindEmailResponse { email }))
}

pub async fn forgot_password(
    State(ctx): State<AppContext>,
    Json(req): Json<ForgotPasswordRequest>,
) -> AuthResult<Json<Value>> {
    req.validate()
        .map_err(|e| AuthError::Validation(e.to_string()))?;

    // Uniform response whether or not the address exists
    if let Err(err) = ctx.accounts.forgot_password(&req.email).await {
        match err {
            AuthError::UserNotFound => {}
            other => tracing::error!(error = %other, "forgot password failed"),
        }
    }
    Ok(Json(json!({ "message": "password reset email sent" })))
}

pub async fn reset_password(
    State(ctx): State<AppContext>,
    Json(req): Json<ResetPasswordRequest>,
) -> AuthResult<Json<Value>> {
    req.validate()
        .map_err(|e| AuthError::Validation(e.to_string()))?;
    ctx.accounts.reset_password(&req.token, &req.new_password).await?;
    Ok(Json(json!({ "message": "password reset successful" })))
}
