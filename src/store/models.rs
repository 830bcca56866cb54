/// Persisted records for accounts, profiles, and token grants
use chrono::{DateTime, NaiveDate, Utc};

/// Account record
#[derive(Debug, Clone)]
pub struct Account {
    pub id: i64,
    pub email: String,
    pub password_digest: String,
    pub provider: String,
    pub provider_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set when the account is soft-deleted; null means active
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Gender code for a profile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenderCode {
    Male,
    Female,
    Other,
    NonBinary,
    Unspecified,
}

impl GenderCode {
    pub fn as_code(&self) -> &'static str {
        match self {
            GenderCode::Male => "M",
            GenderCode::Female => "F",
            GenderCode::Other => "O",
            GenderCode::NonBinary => "N",
            GenderCode::Unspecified => "U",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "M" => Some(GenderCode::Male),
            "F" => Some(GenderCode::Female),
            "O" => Some(GenderCode::Other),
            "N" => Some(GenderCode::NonBinary),
            "U" => Some(GenderCode::Unspecified),
            _ => None,
        }
    }
}

/// Profile record, one-to-one with an account
#[derive(Debug, Clone)]
pub struct Profile {
    pub id: i64,
    pub account_id: i64,
    pub name: String,
    pub birth_date: NaiveDate,
    pub gender: GenderCode,
    /// E.164 phone number, unique across all profiles
    pub phone_number: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Persisted refresh-token grant
#[derive(Debug, Clone)]
pub struct RefreshTokenRecord {
    pub id: i64,
    pub account_id: i64,
    pub token: String,
    pub device_tag: String,
    pub created_at: DateTime<Utc>,
    pub expired_at: DateTime<Utc>,
}

/// Single-use password-reset grant, at most one per account
#[derive(Debug, Clone)]
pub struct PasswordResetTokenRecord {
    pub id: i64,
    pub account_id: i64,
    pub token: String,
    pub expired_at: DateTime<Utc>,
    pub used: bool,
}

/// Fields for a new account row
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub email: String,
    pub password_digest: String,
    pub provider: String,
}

/// Fields for a new profile row
#[derive(Debug, Clone)]
pub struct NewProfile {
    pub account_id: i64,
    pub name: String,
    pub birth_date: NaiveDate,
    pub gender: GenderCode,
    pub phone_number: String,
}

/// Fields for a new refresh-token grant
#[derive(Debug, Clone)]
pub struct NewRefreshToken {
    pub account_id: i64,
    pub token: String,
    pub device_tag: String,
    pub expired_at: DateTime<Utc>,
}
