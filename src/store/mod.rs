/// Storage contract for accounts, profiles, and token grants
///
/// Two interchangeable backends satisfy this contract: a PostgreSQL pool
/// for full deployments and an embedded SQLite file for small installs
/// and tests. Multi-step flows drive their writes through a [`StoreTx`]
/// handle so the caller owns the atomicity boundary; point lookups return
/// `None` rather than an error so callers can branch on absence.

mod models;
pub mod postgres;
pub mod sqlite;

pub use models::{
    Account, GenderCode, NewAccount, NewProfile, NewRefreshToken, PasswordResetTokenRecord,
    Profile, RefreshTokenRecord,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("malformed row: {0}")]
    Malformed(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A transaction handle
///
/// Writes become visible at `commit`; dropping the handle without
/// committing discards them, on any exit path.
#[async_trait]
pub trait StoreTx: Send {
    async fn find_account_by_email(&mut self, email: &str) -> StoreResult<Option<Account>>;
    async fn find_account_by_id(&mut self, id: i64) -> StoreResult<Option<Account>>;
    async fn insert_account(&mut self, account: &NewAccount) -> StoreResult<i64>;
    async fn update_password(&mut self, account_id: i64, password_digest: &str) -> StoreResult<()>;
    async fn soft_delete_account(&mut self, account_id: i64) -> StoreResult<()>;

    async fn insert_profile(&mut self, profile: &NewProfile) -> StoreResult<i64>;
    async fn find_profile_by_account(&mut self, account_id: i64) -> StoreResult<Option<Profile>>;
    async fn find_profile_by_phone(&mut self, phone_number: &str) -> StoreResult<Option<Profile>>;
    async fn update_profile(&mut self, profile: &Profile) -> StoreResult<()>;

    async fn insert_refresh_token(&mut self, token: &NewRefreshToken) -> StoreResult<()>;
    async fn delete_refresh_tokens_for_device(
        &mut self,
        account_id: i64,
        device_tag: &str,
    ) -> StoreResult<u64>;
    async fn delete_all_refresh_tokens(&mut self, account_id: i64) -> StoreResult<u64>;

    async fn upsert_password_reset_token(
        &mut self,
        account_id: i64,
        token: &str,
        expired_at: DateTime<Utc>,
    ) -> StoreResult<()>;
    async fn find_password_reset_token(
        &mut self,
        token: &str,
    ) -> StoreResult<Option<PasswordResetTokenRecord>>;
    async fn mark_password_reset_token_used(&mut self, token: &str) -> StoreResult<()>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;
    async fn rollback(self: Box<Self>) -> StoreResult<()>;
}

/// Pool-level storage contract
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Open a transaction; all writes inside it commit or roll back together
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>>;

    async fn find_account_by_id(&self, id: i64) -> StoreResult<Option<Account>>;
    async fn find_account_by_email(&self, email: &str) -> StoreResult<Option<Account>>;

    async fn find_profile_by_account(&self, account_id: i64) -> StoreResult<Option<Profile>>;
    async fn find_profile_by_phone(&self, phone_number: &str) -> StoreResult<Option<Profile>>;

    async fn insert_refresh_token(&self, token: &NewRefreshToken) -> StoreResult<()>;
    async fn find_refresh_token(
        &self,
        account_id: i64,
        device_tag: &str,
        token: &str,
    ) -> StoreResult<Option<RefreshTokenRecord>>;
    /// Delete one grant by (account, token); returns the number of rows removed
    async fn delete_refresh_token(&self, account_id: i64, token: &str) -> StoreResult<u64>;
    async fn delete_all_refresh_tokens(&self, account_id: i64) -> StoreResult<u64>;
}
