/// PostgreSQL-backed session store
///
/// Full relational backend. Same contract and schema as the embedded
/// backend, with engine-native types.
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgExecutor, PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};

use super::{
    Account, GenderCode, NewAccount, NewProfile, NewRefreshToken, PasswordResetTokenRecord,
    Profile, RefreshTokenRecord, SessionStore, StoreError, StoreResult, StoreTx,
};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS accounts (
        id BIGSERIAL PRIMARY KEY,
        email VARCHAR(255) UNIQUE NOT NULL,
        password_digest VARCHAR(255) NOT NULL,
        provider VARCHAR(50) NOT NULL DEFAULT 'local',
        provider_id VARCHAR(255),
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL,
        deleted_at TIMESTAMPTZ
    )",
    "CREATE TABLE IF NOT EXISTS profiles (
        id BIGSERIAL PRIMARY KEY,
        account_id BIGINT NOT NULL UNIQUE REFERENCES accounts(id) ON DELETE CASCADE,
        name VARCHAR(255) NOT NULL,
        birth_date DATE NOT NULL,
        gender_code VARCHAR(1) NOT NULL,
        phone_number VARCHAR(20) UNIQUE NOT NULL,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS refresh_tokens (
        id BIGSERIAL PRIMARY KEY,
        account_id BIGINT NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
        token VARCHAR(512) NOT NULL,
        device_tag VARCHAR(255) NOT NULL,
        created_at TIMESTAMPTZ NOT NULL,
        expired_at TIMESTAMPTZ NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS password_reset_tokens (
        id BIGSERIAL PRIMARY KEY,
        account_id BIGINT NOT NULL UNIQUE REFERENCES accounts(id) ON DELETE CASCADE,
        token VARCHAR(512) NOT NULL,
        expired_at TIMESTAMPTZ NOT NULL,
        used BOOLEAN NOT NULL DEFAULT FALSE
    )",
];

/// Session store over a PostgreSQL connection pool
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    /// Connect to the database and bootstrap the schema
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let pool = PgPoolOptions::new().max_connections(10).connect(url).await?;
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

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgStoreTx { tx }))
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
             WHERE account_id = $1 AND device_tag = $2 AND token = $3",
        )
        .bind(account_id)
        .bind(device_tag)
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(refresh_token_from_row).transpose()
    }

    async fn delete_refresh_token(&self, account_id: i64, token: &str) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE account_id = $1 AND token = $2")
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

/// Transaction handle over a pooled PostgreSQL connection
struct PgStoreTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PgStoreTx {
    async fn find_account_by_email(&mut self, email: &str) -> StoreResult<Option<Account>> {
        find_account_by_email(&mut *self.tx, email).await
    }

    async fn find_account_by_id(&mut self, id: i64) -> StoreResult<Option<Account>> {
        find_account_by_id(&mut *self.tx, id).await
    }

    async fn insert_account(&mut self, account: &NewAccount) -> StoreResult<i64> {
        let now = Utc::now();
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO accounts (email, password_digest, provider, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING id",
        )
        .bind(&account.email)
        .bind(&account.password_digest)
        .bind(&account.provider)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(id)
    }

    async fn update_password(&mut self, account_id: i64, password_digest: &str) -> StoreResult<()> {
        sqlx::query("UPDATE accounts SET password_digest = $1, updated_at = $2 WHERE id = $3")
            .bind(password_digest)
            .bind(Utc::now())
            .bind(account_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn soft_delete_account(&mut self, account_id: i64) -> StoreResult<()> {
        sqlx::query("UPDATE accounts SET deleted_at = $1 WHERE id = $2")
            .bind(Utc::now())
            .bind(account_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn insert_profile(&mut self, profile: &NewProfile) -> StoreResult<i64> {
        let now = Utc::now();
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO profiles (account_id, name, birth_date, gender_code, phone_number, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING id",
        )
        .bind(profile.account_id)
        .bind(&profile.name)
        .bind(profile.birth_date)
        .bind(profile.gender.as_code())
        .bind(&profile.phone_number)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(id)
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
             SET name = $1, birth_date = $2, gender_code = $3, phone_number = $4, updated_at = $5
             WHERE id = $6",
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
            sqlx::query("DELETE FROM refresh_tokens WHERE account_id = $1 AND device_tag = $2")
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
             VALUES ($1, $2, $3, FALSE)
             ON CONFLICT (account_id)
             DO UPDATE SET token = EXCLUDED.token, expired_at = EXCLUDED.expired_at, used = FALSE",
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
             WHERE token = $1",
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
        sqlx::query("UPDATE password_reset_tokens SET used = TRUE WHERE token = $1")
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
    E: PgExecutor<'e>,
{
    let row = sqlx::query(
        "SELECT id, email, password_digest, provider, provider_id, created_at, updated_at, deleted_at
         FROM accounts
         WHERE id = $1 AND deleted_at IS NULL",
    )
    .bind(id)
    .fetch_optional(ex)
    .await?;
    row.as_ref().map(account_from_row).transpose()
}

async fn find_account_by_email<'e, E>(ex: E, email: &str) -> StoreResult<Option<Account>>
where
    E: PgExecutor<'e>,
{
    let row = sqlx::query(
        "SELECT id, email, password_digest, provider, provider_id, created_at, updated_at, deleted_at
         FROM accounts
         WHERE email = $1 AND deleted_at IS NULL",
    )
    .bind(email)
    .fetch_optional(ex)
    .await?;
    row.as_ref().map(account_from_row).transpose()
}

async fn find_profile_by_account<'e, E>(ex: E, account_id: i64) -> StoreResult<Option<Profile>>
where
    E: PgExecutor<'e>,
{
    let row = sqlx::query(
        "SELECT id, account_id, name, birth_date, gender_code, phone_number, created_at, updated_at
         FROM profiles
         WHERE account_id = $1",
    )
    .bind(account_id)
    .fetch_optional(ex)
    .await?;
    row.as_ref().map(profile_from_row).transpose()
}

async fn find_profile_by_phone<'e, E>(ex: E, phone_number: &str) -> StoreResult<Option<Profile>>
where
    E: PgExecutor<'e>,
{
    let row = sqlx::query(
        "SELECT id, account_id, name, birth_date, gender_code, phone_number, created_at, updated_at
         FROM profiles
         WHERE phone_number = $1",
    )
    .bind(phone_number)
    .fetch_optional(ex)
    .await?;
    row.as_ref().map(profile_from_row).transpose()
}

async fn insert_refresh_token<'e, E>(ex: E, token: &NewRefreshToken) -> StoreResult<()>
where
    E: PgExecutor<'e>,
{
    sqlx::query(
        "INSERT INTO refresh_tokens (account_id, token, device_tag, created_at, expired_at)
         VALUES ($1, $2, $3, $4, $5)",
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
    E: PgExecutor<'e>,
{
    let result = sqlx::query("DELETE FROM refresh_tokens WHERE account_id = $1")
        .bind(account_id)
        .execute(ex)
        .await?;
    Ok(result.rows_affected())
}

fn account_from_row(row: &PgRow) -> StoreResult<Account> {
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

fn profile_from_row(row: &PgRow) -> StoreResult<Profile> {
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

fn refresh_token_from_row(row: &PgRow) -> StoreResult<RefreshTokenRecord> {
    Ok(RefreshTokenRecord {
        id: row.try_get("id")?,
        account_id: row.try_get("account_id")?,
        token: row.try_get("token")?,
        device_tag: row.try_get("device_tag")?,
        created_at: row.try_get("created_at")?,
        expired_at: row.try_get("expired_at")?,
    })
}
