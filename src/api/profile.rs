/// Handlers for profile reads and mutations
use axum::{extract::State, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use validator::Validate;

use crate::{
    account::{ProfileChanges, ProfileView},
    auth::AuthContext,
    context::AppContext,
    error::{AuthError, AuthResult},
};

use super::{parse_birth_date, parse_gender, validate_phone};

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 64))]
    pub name: String,
    #[validate(length(equal = 10))]
    pub birth_date: String,
    pub gender_code: String,
    pub phone_number: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    #[validate(length(min = 8, max = 128))]
    pub old_password: String,
    #[validate(length(min = 8, max = 128))]
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteAccountRequest {
    pub current_password: String,
}

pub async fn get_profile(
    State(ctx): State<AppContext>,
    auth: AuthContext,
) -> AuthResult<Json<ProfileView>> {
    let view = ctx.accounts.get_profile(auth.account_id).await?;
    Ok(Json(view))
}

pub async fn update_profile(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Json(req): Json<UpdateProfileRequest>,
) -> AuthResult<Json<ProfileView>> {
    req.validate()
        .map_err(|e| AuthError::Validation(e.to_string()))?;
    validate_phone(&req.phone_number)?;

    let changes = ProfileChanges {
        birth_date: parse_birth_date(&req.birth_date)?,
        gender: parse_gender(&req.gender_code)?,
        name: req.name,
        phone_number: req.phone_number,
    };
    let view = ctx.accounts.update_profile(auth.account_id, changes).await?;
    Ok(Json(view))
}

pub async fn change_password(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Json(req): Json<ChangePasswordRequest>,
) -> AuthResult<Json<Value>> {
    req.validate()
        .map_err(|e| AuthError::Validation(e.to_string()))?;
    ctx.accounts
        .change_password(auth.account_id, &req.old_password, &req.new_password)
        .await?;
    Ok(Json(json!({ "message": "password changed" })))
}

pub async fn delete_account(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Json(req): Json<DeleteAccountRequest>,
) -> AuthResult<Json<Value>> {
    ctx.accounts
        .delete_account(auth.account_id, &req.current_password)
        .await?;
    Ok(Json(json!({ "message": "account deleted" })))
}
