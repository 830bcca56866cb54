/// Session lifecycle orchestration
///
/// Every multi-step mutation runs inside one store transaction; a handle
/// dropped before commit rolls its writes back, so no flow can leave the
/// account and profile aggregates half-written.
use std::sync::Arc;

use chrono::{Duration, Utc};

use crate::{
    account::{
        LoginSession, NewRegistration, ProfileChanges, ProfileView, RegisteredAccount, TokenPair,
    },
    error::{AuthError, AuthResult},
    mailer::PasswordResetNotifier,
    password,
    store::{NewAccount, NewProfile, NewRefreshToken, Profile, SessionStore},
    token::{TokenCodec, TokenError, REFRESH_TOKEN_TTL_DAYS},
    util,
};

/// Reset links stay valid for half an hour.
const RESET_TOKEN_TTL_MINUTES: i64 = 30;

/// Account manager service
pub struct AccountManager {
    store: Arc<dyn SessionStore>,
    codec: Arc<TokenCodec>,
    notifier: Arc<dyn PasswordResetNotifier>,
    public_url: String,
}

impl AccountManager {
    pub fn new(
        store: Arc<dyn SessionStore>,
        codec: Arc<TokenCodec>,
        notifier: Arc<dyn PasswordResetNotifier>,
        public_url: String,
    ) -> Self {
        Self {
            store,
            codec,
            notifier,
            public_url,
        }
    }

    /// Register a new account with its profile
    pub async fn register(&self, req: NewRegistration) -> AuthResult<RegisteredAccount> {
        let mut tx = self.store.begin().await?;

        // The duplicate check runs inside the transaction, so two
        // concurrent registrations cannot both pass it before either
        // commits.
        if tx.find_account_by_email(&req.email).await?.is_some() {
            tracing::warn!(email = %req.email, "register: email exists");
            return Err(AuthError::EmailExists);
        }

        let digest = password::hash(&req.password)?;
        let account_id = tx
            .insert_account(&NewAccount {
                email: req.email.clone(),
                password_digest: digest,
                provider: "local".to_string(),
            })
            .await?;
        tx.insert_profile(&NewProfile {
            account_id,
            name: req.name.clone(),
            birth_date: req.birth_date,
            gender: req.gender,
            phone_number: req.phone_number.clone(),
        })
        .await?;
        tx.commit().await?;

        tracing::info!(account_id, email = %req.email, "register: success");
        Ok(RegisteredAccount {
            email: req.email,
            name: req.name,
            birth_date: req.birth_date.format("%Y-%m-%d").to_string(),
            gender_code: req.gender.as_code().to_string(),
            phone_number: req.phone_number,
        })
    }

    /// Authenticate and open a session for a device
    pub async fn login(
        &self,
        email: &str,
        password_plain: &str,
        device_tag: &str,
    ) -> AuthResult<LoginSession> {
        let account = self
            .store
            .find_account_by_email(email)
            .await?
            .ok_or_else(|| {
                tracing::warn!(email = %email, "login: user not found");
                AuthError::UserNotFound
            })?;

        if !password::verify(password_plain, &account.password_digest) {
            tracing::warn!(email = %email, "login: invalid password");
            return Err(AuthError::InvalidPassword);
        }

        let access_token = self.mint_access(account.id)?;
        let refresh_token = self.mint_refresh(account.id, device_tag)?;

        // Replacing the device's old grant and inserting the new one
        // commit together, keeping at most one live record per
        // (account, device).
        let mut tx = self.store.begin().await?;
        tx.delete_refresh_tokens_for_device(account.id, device_tag)
            .await?;
        tx.insert_refresh_token(&NewRefreshToken {
            account_id: account.id,
            token: refresh_token.clone(),
            device_tag: device_tag.to_string(),
            expired_at: Utc::now() + Duration::days(REFRESH_TOKEN_TTL_DAYS),
        })
        .await?;
        tx.commit().await?;

        tracing::info!(account_id = account.id, "login: success");
        Ok(LoginSession {
            account_id: account.id,
            email: account.email,
            access_token,
            refresh_token,
        })
    }

    /// Rotate a refresh token and mint a fresh access token
    ///
    /// The presented token is single-use: the winner of a concurrent race
    /// consumes the stored grant and the loser observes it gone.
    pub async fn refresh_session(&self, refresh_token: &str) -> AuthResult<TokenPair> {
        let (account_id, device_tag) =
            self.codec
                .verify_refresh_token(refresh_token)
                .map_err(|e| {
                    tracing::warn!(error = %e, "refresh: token verification failed");
                    match e {
                        TokenError::Expired => AuthError::RefreshTokenExpired,
                        TokenError::Invalid => AuthError::InvalidRefreshToken,
                    }
                })?;

        let record = self
            .store
            .find_refresh_token(account_id, &device_tag, refresh_token)
            .await?
            .ok_or_else(|| {
                tracing::warn!(account_id, "refresh: token not found");
                AuthError::RefreshTokenNotFound
            })?;

        if record.expired_at <= Utc::now() {
            self.store
                .delete_refresh_token(account_id, refresh_token)
                .await?;
            tracing::warn!(account_id, "refresh: token expired");
            return Err(AuthError::RefreshTokenExpired);
        }

        // The delete doubles as the consume step; zero rows means a
        // concurrent refresh already spent this token.
        if self
            .store
            .delete_refresh_token(account_id, refresh_token)
            .await?
            == 0
        {
            return Err(AuthError::RefreshTokenNotFound);
        }

        let new_refresh = self.mint_refresh(account_id, &device_tag)?;
        self.store
            .insert_refresh_token(&NewRefreshToken {
                account_id,
                token: new_refresh.clone(),
                device_tag,
                expired_at: Utc::now() + Duration::days(REFRESH_TOKEN_TTL_DAYS),
            })
            .await?;
        let access_token = self.mint_access(account_id)?;

        tracing::info!(account_id, "refresh: success");
        Ok(TokenPair {
            access_token,
            refresh_token: new_refresh,
        })
    }

    /// Revoke one device grant
    ///
    /// Succeeds even when the token was absent or already revoked, so
    /// callers cannot probe token validity through logout.
    pub async fn logout(&self, account_id: i64, refresh_token: &str) -> AuthResult<()> {
        self.store
            .delete_refresh_token(account_id, refresh_token)
            .await?;
        Ok(())
    }

    /// Recover a masked email address by phone number
    pub async fn find_email(&self, phone_number: &str) -> AuthResult<String> {
        let profile = self
            .store
            .find_profile_by_phone(phone_number)
            .await?
            .ok_or_else(|| {
                tracing::warn!(phone = %phone_number, "find email: profile not found");
                AuthError::UserNotFound
            })?;
        let account = self
            .store
            .find_account_by_id(profile.account_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;
        Ok(util::mask_email(&account.email))
    }

    /// Issue a password-reset token and email its link
    ///
    /// The token row only becomes durable if the mail went out; a failed
    /// send rolls it back with the transaction.
    pub async fn forgot_password(&self, email: &str) -> AuthResult<()> {
        let mut tx = self.store.begin().await?;
        let account = tx.find_account_by_email(email).await?.ok_or_else(|| {
            tracing::warn!(email = %email, "forgot password: user not found");
            AuthError::UserNotFound
        })?;

        let token = util::generate_reset_token();
        let expired_at = Utc::now() + Duration::minutes(RESET_TOKEN_TTL_MINUTES);
        tx.upsert_password_reset_token(account.id, &token, expired_at)
            .await?;

        let reset_link = format!("{}/reset-password?token={}", self.public_url, token);
        if let Err(err) = self
            .notifier
            .send_password_reset(email, &reset_link, RESET_TOKEN_TTL_MINUTES)
            .await
        {
            tracing::error!(account_id = account.id, error = %err, "forgot password: send failed");
            if let Err(rb_err) = tx.rollback().await {
                // A rollback failure must not mask the send failure
                tracing::warn!(error = %rb_err, "forgot password: rollback failed");
            }
            return Err(err);
        }

        tx.commit().await?;
        tracing::info!(account_id = account.id, "forgot password: reset email sent");
        Ok(())
    }

    /// Set a new password using a reset token
    pub async fn reset_password(&self, token: &str, new_password: &str) -> AuthResult<()> {
        let mut tx = self.store.begin().await?;
        let record = tx
            .find_password_reset_token(token)
            .await?
            .ok_or(AuthError::InvalidResetToken)?;
        if record.used || record.expired_at <= Utc::now() {
            tracing::warn!(account_id = record.account_id, "reset password: token expired or used");
            return Err(AuthError::InvalidResetToken);
        }

        let digest = password::hash(new_password)?;
        tx.update_password(record.account_id, &digest).await?;
        // Consumed tokens are flagged, never deleted.
        tx.mark_password_reset_token_used(token).await?;
        tx.commit().await?;

        tracing::info!(account_id = record.account_id, "reset password: success");
        Ok(())
    }

    /// Change password after verifying the current one
    ///
    /// Purges every refresh grant; all devices must log in again.
    pub async fn change_password(
        &self,
        account_id: i64,
        current_password: &str,
        new_password: &str,
    ) -> AuthResult<()> {
        let mut tx = self.store.begin().await?;
        let account = tx
            .find_account_by_id(account_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;
        if !password::verify(current_password, &account.password_digest) {
            tracing::warn!(account_id, "change password: current password incorrect");
            return Err(AuthError::IncorrectPassword);
        }

        let digest = password::hash(new_password)?;
        tx.update_password(account_id, &digest).await?;
        tx.delete_all_refresh_tokens(account_id).await?;
        tx.commit().await?;

        tracing::info!(account_id, "change password: success");
        Ok(())
    }

    /// Fetch the caller's profile joined with the account email
    pub async fn get_profile(&self, account_id: i64) -> AuthResult<ProfileView> {
        let profile = self
            .store
            .find_profile_by_account(account_id)
            .await?
            .ok_or(AuthError::ProfileNotFound)?;
        let account = self
            .store
            .find_account_by_id(account_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;
        Ok(profile_view(&account.email, &profile))
    }

    /// Overwrite the caller's mutable profile fields
    pub async fn update_profile(
        &self,
        account_id: i64,
        changes: ProfileChanges,
    ) -> AuthResult<ProfileView> {
        let mut tx = self.store.begin().await?;
        let mut profile = tx
            .find_profile_by_account(account_id)
            .await?
            .ok_or(AuthError::ProfileNotFound)?;

        if let Some(existing) = tx.find_profile_by_phone(&changes.phone_number).await? {
            if existing.account_id != account_id {
                tracing::warn!(account_id, "update profile: phone already in use");
                return Err(AuthError::PhoneInUse);
            }
        }

        profile.name = changes.name;
        profile.birth_date = changes.birth_date;
        profile.gender = changes.gender;
        profile.phone_number = changes.phone_number;
        profile.updated_at = Utc::now();
        tx.update_profile(&profile).await?;

        let account = tx
            .find_account_by_id(account_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;
        tx.commit().await?;

        tracing::info!(account_id, "update profile: success");
        Ok(profile_view(&account.email, &profile))
    }

    /// Soft-delete the account after verifying the password
    ///
    /// The profile row is left intact; only the account is marked deleted
    /// and its refresh grants are purged.
    pub async fn delete_account(&self, account_id: i64, current_password: &str) -> AuthResult<()> {
        let account = self
            .store
            .find_account_by_id(account_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;
        if !password::verify(current_password, &account.password_digest) {
            tracing::warn!(account_id, "delete account: current password incorrect");
            return Err(AuthError::IncorrectPassword);
        }

        let mut tx = self.store.begin().await?;
        tx.soft_delete_account(account_id).await?;
        tx.delete_all_refresh_tokens(account_id).await?;
        tx.commit().await?;

        tracing::info!(account_id, "delete account: success");
        Ok(())
    }

    fn mint_access(&self, account_id: i64) -> AuthResult<String> {
        self.codec
            .mint_access_token(account_id)
            .map_err(|e| AuthError::Internal(format!("access token minting failed: {e}")))
    }

    fn mint_refresh(&self, account_id: i64, device_tag: &str) -> AuthResult<String> {
        self.codec
            .mint_refresh_token(account_id, device_tag)
            .map_err(|e| AuthError::Internal(format!("refresh token minting failed: {e}")))
    }
}

fn profile_view(email: &str, profile: &Profile) -> ProfileView {
    ProfileView {
        email: email.to_string(),
        name: profile.name.clone(),
        birth_date: profile.birth_date.format("%Y-%m-%d").to_string(),
        gender_code: profile.gender.as_code().to_string(),
        phone_number: profile.phone_number.clone(),
    }
}
