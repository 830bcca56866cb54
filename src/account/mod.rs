/// Account and session lifecycle
///
/// Handles registration, authentication, token rotation, password
/// recovery, and profile management.

mod manager;

pub use manager::AccountManager;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::store::GenderCode;

/// Registration input, already validated and parsed at the boundary
#[derive(Debug, Clone)]
pub struct NewRegistration {
    pub email: String,
    pub password: String,
    pub name: String,
    pub birth_date: NaiveDate,
    pub gender: GenderCode,
    pub phone_number: String,
}

/// Summary returned after a successful registration
///
/// Never carries the password digest.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredAccount {
    pub email: String,
    pub name: String,
    pub birth_date: String,
    pub gender_code: String,
    pub phone_number: String,
}

/// Tokens and identity returned by a successful login
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginSession {
    pub account_id: i64,
    pub email: String,
    pub access_token: String,
    pub refresh_token: String,
}

/// Rotated token pair returned by a refresh
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Profile joined with its account's email
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileView {
    pub email: String,
    pub name: String,
    pub birth_date: String,
    pub gender_code: String,
    pub phone_number: String,
}

/// Profile fields a caller may overwrite
#[derive(Debug, Clone)]
pub struct ProfileChanges {
    pub name: String,
    pub birth_date: NaiveDate,
    pub gender: GenderCode,
    pub phone_number: String,
}
