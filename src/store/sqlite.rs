/// SQLite-backed session store
///
/// Embedded backend for small installs and tests. Uses runtime queries and
/// bootstraps its own schema on connect.
use std::path::Path;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteExecutor, SqliteJournalMode, SqlitePoolOptions, SqliteRow,
};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};

use super::{
    Account, GenderCode, NewAccount, NewProfile, NewRefreshToken, PasswordResetTokenRecord,
    Profile, RefreshTokenRecord, SessionStore, StoreError, StoreResult, StoreTx,
};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS accounts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        email TEXT UNIQUE NOT NULL,
        password_digest TEXT NOT NULL,
        provider TEXT NOT NULL DEFAULT 'local',
        provider_id TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        deleted_at TEXT
    )",
    "CREATE TABLE IF NOT EXISTS profiles (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        account_id INTEGER NOT NULL UNIQUE REFERENCES accounts(id) ON DELETE CASCADE,
        name TEXT NOT NULL,
        birth_date TEXT NOT NULL,
        gender_code TEXT NOT NULL,
        phone_number TEXT UNIQUE NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS refresh_tokens (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        account_id INTEGER NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
        token TEXT NOT NULL,
        device_tag TEXT NOT NULL,
        created_at TEXT NOT NULL,
        expired_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS password_reset_tokens (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        account_id INTEGER NOT NULL UNIQUE REFERENCES accounts(id) ON DELETE CASCADE,
        token TEXT NOT NULL,
        expired_at TEXT NOT NULL,
        used INTEGER NOT NULL DEFAULT 0
    )",
];

/// Session store over an embedded SQLite database
pub struct SqliteSessionStore {
    pool: SqlitePool,
}

impl SqliteSessionStore {
    /// Open (or create) a database file and bootstrap the schema
    pub async fn connect(path: &Path) -> StoreResult<Self> {
        let pool = SqlitePool::connect_with(
            SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
                .foreign_keys(true)
                .busy_timeout(StdDuration::from_secs(5)),
        )
        .await?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// In-memory database on a single pinned connection, for tests
    pub async fn memory() -> StoreResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(SqliteConnectOptions::new().in_memory(true).foreign_keys(true))
            .await?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> StoreResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(SqliteStoreTx { tx }))
    }

    async fn find_account_by_id(&self, id: i64) -> StoreResult<Option<Account>> {
        find_account_by_id(&self.pool, id).await
    }

    async fn find_account_by_email(&self, email: &str) -> StoreResult<Option<Account>> {
        find_account_by_email(&self.pool, email).await
    }

    async fn find_profile_by_account(&self, account_id: i64) -> StoreResult<Option<Profile>> {
        find_profile_by_account(&self.pool, account_id).await
    }

    async fn find_profile_by_phone(&self, phone_number: &str) -> StoreResult<Option<Profile>> {
        find_profile_by_phone(&self.pool, phone_number).await
    }

    async fn insert_refresh_token(&self, token: &NewRefreshToken) -> StoreResult<()> {
        insert_refresh_token(&self.pool, token).await
    }

    async fn find_refresh_token(
        &self,
        account_id: i64,
        device_tag: &str,
        token: &str,
    ) -> StoreResult<Option<RefreshTokenRecord>> {
        let row = sqlx::query(
            "SELECT id, account_id, token, device_tag, created_at, expired_at
             FROM refresh_tokens
             WHERE account_id = ?1 AND device_tag = ?2 AND token = ?3",
        )
        .bind(account_id)
        .bind(device_tag)
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(refresh_token_from_row).transpose()
    }

    async fn delete_refresh_token(&self, account_id: i64, token: &str) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE account_id = ?1 AND token = ?2")
            .bind(account_id)
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_all_refresh_tokens(&self, account_id: i64) -> StoreResult<u64> {
        delete_all_refresh_tokens(&self.pool, account_id).await
    }
}

/// Transaction handle over a pooled SQLite connection
struct SqliteStoreTx {
    tx: Transaction<'static, Sqlite>,
}

#[async_trait]
impl StoreTx for SqliteStoreTx {
    async fn find_account_by_email(&mut self, email: &str) -> StoreResult<Option<Account>> {
        find_account_by_email(&mut *self.tx, email).await
    }

    async fn find_account_by_id(&mut self, id: i64) -> StoreResult<Option<Account>> {
        find_account_by_id(&mut *self.tx, id).await
    }

    async fn insert_account(&mut self, account: &NewAccount) -> StoreResult<i64> {
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO accounts (email, password_digest, provider, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(&account.email)
        .bind(&account.password_digest)
        .bind(&account.provider)
        .bind(now)
        .bind(now)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.last_insert_rowid())
    }

    async fn update_password(&mut self, account_id: i64, password_digest: &str) -> StoreResult<()> {
        sqlx::query("UPDATE accounts SET password_digest = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(password_digest)
            .bind(Utc::now())
            .bind(account_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn soft_delete_account(&mut self, account_id: i64) -> StoreResult<()> {
        sqlx::query("UPDATE accounts SET deleted_at = ?1 WHERE id = ?2")
            .bind(Utc::now())
            .bind(account_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn insert_profile(&mut self, profile: &NewProfile) -> StoreResult<i64> {
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO profiles (account_id, name, birth_date, gender_code, phone_number, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(profile.account_id)
        .bind(&profile.name)
        .bind(profile.birth_date)
        .bind(profile.gender.as_code())
        .bind(&profile.phone_number)
        .bind(now)
        .bind(now)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.last_insert_rowid())
    }

    async fn find_profile_by_account(&mut self, account_id: i64) -> StoreResult<Option<Profile>> {
        find_profile_by_account(&mut *self.tx, account_id).await
    }

    async fn find_profile_by_phone(&mut self, phone_number: &str) -> StoreResult<Option<Profile>> {
        find_profile_by_phone(&mut *self.tx, phone_number).await
    }

    async fn update_profile(&mut self, profile: &Profile) -> StoreResult<()> {
        sqlx::query(
            "UPDATE profiles
             SET name = ?1, birth_date = ?2, gender_code = ?3, phone_number = ?4, updated_at = ?5
             WHERE id = ?6",
        )
        .bind(&profile.name)
        .bind(profile.birth_date)
        .bind(profile.gender.as_code())
        .bind(&profile.phone_number)
        .bind(profile.updated_at)
        .bind(profile.id)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn insert_refresh_token(&mut self, token: &NewRefreshToken) -> StoreResult<()> {
        insert_refresh_token(&mut *self.tx, token).await
    }

    async fn delete_refresh_tokens_for_device(
        &mut self,
        account_id: i64,
        device_tag: &str,
    ) -> StoreResult<u64> {
        let result =
            sqlx::query("DELETE FROM refresh_tokens WHERE account_id = ?1 AND device_tag = ?2")
                .bind(account_id)
                .bind(device_tag)
                .execute(&mut *self.tx)
                .await?;
        Ok(result.rows_affected())
    }

    async fn delete_all_refresh_tokens(&mut self, account_id: i64) -> StoreResult<u64> {
        delete_all_refresh_tokens(&mut *self.tx, account_id).await
    }

    async fn upsert_password_reset_token(
        &mut self,
        account_id: i64,
        token: &str,
        expired_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO password_reset_tokens (account_id, token, expired_at, used)
             VALUES (?1, ?2, ?3, 0)
             ON CONFLICT (account_id)
             DO UPDATE SET token = excluded.token, expired_at = excluded.expired_at, used = 0",
        )
        .bind(account_id)
        .bind(token)
        .bind(expired_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn find_password_reset_token(
        &mut self,
        token: &str,
    ) -> StoreResult<Option<PasswordResetTokenRecord>> {
        let row = sqlx::query(
            "SELECT id, account_id, token, expired_at, used
             FROM password_reset_tokens
             WHERE token = ?1",
        )
        .bind(token)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(|row| {
            Ok(PasswordResetTokenRecord {
                id: row.try_get("id")?,
                account_id: row.try_get("account_id")?,
                token: row.try_get("token")?,
                expired_at: row.try_get("expired_at")?,
                used: row.try_get("used")?,
            })
        })
        .transpose()
    }

    async fn mark_password_reset_token_used(&mut self, token: &str) -> StoreResult<()> {
        sqlx::query("UPDATE password_reset_tokens SET used = 1 WHERE token = ?1")
            .bind(token)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

// Query bodies shared between the pool and transaction paths.

async fn find_account_by_id<'e, E>(ex: E, id: i64) -> StoreResult<Option<Account>>
where
    E: SqliteExecutor<'e>,
{
    let row = sqlx::query(
        "SELECT id, email, password_digest, provider, provider_id, created_at, updated_at, deleted_at
         FROM accounts
         WHERE id = ?1 AND deleted_at IS NULL",
    )
    .bind(id)
    .fetch_optional(ex)
    .await?;
    row.as_ref().map(account_from_row).transpose()
}

async fn find_account_by_email<'e, E>(ex: E, email: &str) -> StoreResult<Option<Account>>
where
    E: SqliteExecutor<'e>,
{
    let row = sqlx::query(
        "SELECT id, email, password_digest, provider, provider_id, created_at, updated_at, deleted_at
         FROM accounts
         WHERE email = ?1 AND deleted_at IS NULL",
    )
    .bind(email)
    .fetch_optional(ex)
    .await?;
    row.as_ref().map(account_from_row).transpose()
}

async fn find_profile_by_account<'e, E>(ex: E, account_id: i64) -> StoreResult<Option<Profile>>
where
    E: SqliteExecutor<'e>,
{
    let row = sqlx::query(
        "SELECT id, account_id, name, birth_date, gender_code, phone_number, created_at, updated_at
         FROM profiles
         WHERE account_id = ?1",
    )
    .bind(account_id)
    .fetch_optional(ex)
    .await?;
    row.as_ref().map(profile_from_row).transpose()
}

async fn find_profile_by_phone<'e, E>(ex: E, phone_number: &str) -> StoreResult<Option<Profile>>
where
    E: SqliteExecutor<'e>,
{
    let row = sqlx::query(
        "SELECT id, account_id, name, birth_date, gender_code, phone_number, created_at, updated_at
         FROM profiles
         WHERE phone_number = ?1",
    )
    .bind(phone_number)
    .fetch_optional(ex)
    .await?;
    row.as_ref().map(profile_from_row).transpose()
}

async fn insert_refresh_token<'e, E>(ex: E, token: &NewRefreshToken) -> StoreResult<()>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query(
        "INSERT INTO refresh_tokens (account_id, token, device_tag, created_at, expired_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )
    .bind(token.account_id)
    .bind(&token.token)
    .bind(&token.device_tag)
    .bind(Utc::now())
    .bind(token.expired_at)
    .execute(ex)
    .await?;
    Ok(())
}

async fn delete_all_refresh_tokens<'e, E>(ex: E, account_id: i64) -> StoreResult<u64>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query("DELETE FROM refresh_tokens WHERE account_id = ?1")
        .bind(account_id)
        .execute(ex)
        .await?;
    Ok(result.rows_affected())
}

fn account_from_row(row: &SqliteRow) -> StoreResult<Account> {
    Ok(Account {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        password_digest: row.try_get("password_digest")?,
        provider: row.try_get("provider")?,
        provider_id: row.try_get("provider_id")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        deleted_at: row.try_get("deleted_at")?,
    })
}

fn profile_from_row(row: &SqliteRow) -> StoreResult<Profile> {
    let code: String = row.try_get("gender_code")?;
    let gender = GenderCode::from_code(&code)
        .ok_or_else(|| StoreError::Malformed(format!("unknown gender code {code:?}")))?;
    Ok(Profile {
        id: row.try_get("id")?,
        account_id: row.try_get("account_id")?,
        name: row.try_get("name")?,
        birth_date: row.try_get("birth_date")?,
        gender,
        phone_number: row.try_get("phone_number")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn refresh_token_from_row(row: &SqliteRow) -> StoreResult<RefreshTokenRecord> {
    Ok(RefreshTokenRecord {
        id: row.try_get("id")?,
        account_id: row.try_get("account_id")?,
        token: row.try_get("token")?,
        device_tag: row.try_get("device_tag")?,
        created_at: row.try_get("created_at")?,
        expired_at: row.try_get("expired_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn new_account(email: &str) -> NewAccount {
        NewAccount {
            email: email.to_string(),
            password_digest: "digest".to_string(),
            provider: "local".to_string(),
        }
    }

    fn new_profile(account_id: i64, phone: &str) -> NewProfile {
        NewProfile {
            account_id,
            name: "Tester".to_string(),
            birth_date: NaiveDate::from_ymd_opt(1990, 1, 1).unwrap(),
            gender: GenderCode::Unspecified,
            phone_number: phone.to_string(),
        }
    }

    #[tokio::test]
    async fn file_backed_store_persists_across_connections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keygate.db");

        {
            let store = SqliteSessionStore::connect(&path).await.unwrap();
            let mut tx = store.begin().await.unwrap();
            tx.insert_account(&new_account("durable@example.com")).await.unwrap();
            tx.commit().await.unwrap();
        }

        let store = SqliteSessionStore::connect(&path).await.unwrap();
        assert!(store
            .find_account_by_email("durable@example.com")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn committed_account_round_trips() {
        let store = SqliteSessionStore::memory().await.unwrap();
        let mut tx = store.begin().await.unwrap();
        let id = tx.insert_account(&new_account("a@example.com")).await.unwrap();
        tx.insert_profile(&new_profile(id, "+821012345678")).await.unwrap();
        tx.commit().await.unwrap();

        let account = store.find_account_by_email("a@example.com").await.unwrap().unwrap();
        assert_eq!(account.id, id);
        assert_eq!(account.provider, "local");
        assert!(account.deleted_at.is_none());

        let profile = store.find_profile_by_account(id).await.unwrap().unwrap();
        assert_eq!(profile.phone_number, "+821012345678");
        assert_eq!(profile.gender, GenderCode::Unspecified);
    }

    #[tokio::test]
    async fn dropped_transaction_rolls_back() {
        let store = SqliteSessionStore::memory().await.unwrap();
        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_account(&new_account("gone@example.com")).await.unwrap();
            // dropped without commit
        }
        assert!(store
            .find_account_by_email("gone@example.com")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn duplicate_email_insert_errors() {
        let store = SqliteSessionStore::memory().await.unwrap();
        let mut tx = store.begin().await.unwrap();
        tx.insert_account(&new_account("dup@example.com")).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let err = tx.insert_account(&new_account("dup@example.com")).await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn duplicate_phone_insert_errors() {
        let store = SqliteSessionStore::memory().await.unwrap();
        let mut tx = store.begin().await.unwrap();
        let first = tx.insert_account(&new_account("one@example.com")).await.unwrap();
        tx.insert_profile(&new_profile(first, "+821011112222")).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let second = tx.insert_account(&new_account("two@example.com")).await.unwrap();
        let err = tx.insert_profile(&new_profile(second, "+821011112222")).await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn soft_deleted_account_is_invisible() {
        let store = SqliteSessionStore::memory().await.unwrap();
        let mut tx = store.begin().await.unwrap();
        let id = tx.insert_account(&new_account("bye@example.com")).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.soft_delete_account(id).await.unwrap();
        tx.commit().await.unwrap();

        assert!(store.find_account_by_id(id).await.unwrap().is_none());
        assert!(store
            .find_account_by_email("bye@example.com")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn reset_token_upsert_replaces_prior_grant() {
        let store = SqliteSessionStore::memory().await.unwrap();
        let mut tx = store.begin().await.unwrap();
        let id = tx.insert_account(&new_account("reset@example.com")).await.unwrap();
        let expires = Utc::now() + Duration::minutes(30);
        tx.upsert_password_reset_token(id, "token-one", expires).await.unwrap();
        tx.mark_password_reset_token_used("token-one").await.unwrap();
        tx.upsert_password_reset_token(id, "token-two", expires).await.unwrap();

        assert!(tx.find_password_reset_token("token-one").await.unwrap().is_none());
        let record = tx.find_password_reset_token("token-two").await.unwrap().unwrap();
        assert_eq!(record.account_id, id);
        assert!(!record.used);
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn refresh_token_delete_reports_rows() {
        let store = SqliteSessionStore::memory().await.unwrap();
        let mut tx = store.begin().await.unwrap();
        let id = tx.insert_account(&new_account("rt@example.com")).await.unwrap();
        tx.commit().await.unwrap();

        let grant = NewRefreshToken {
            account_id: id,
            token: "opaque-token".to_string(),
            device_tag: "browser".to_string(),
            expired_at: Utc::now() + Duration::days(7),
        };
        store.insert_refresh_token(&grant).await.unwrap();

        let found = store
            .find_refresh_token(id, "browser", "opaque-token")
            .await
            .unwrap();
        assert!(found.is_some());

        assert_eq!(store.delete_refresh_token(id, "opaque-token").await.unwrap(), 1);
        assert_eq!(store.delete_refresh_token(id, "opaque-token").await.unwrap(), 0);
    }
}
