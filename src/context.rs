/// Application context and dependency wiring
use std::sync::Arc;

use crate::{
    account::AccountManager,
    config::{AppConfig, DatabaseBackend},
    error::AuthResult,
    mailer::{Mailer, PasswordResetNotifier},
    store::{postgres::PgSessionStore, sqlite::SqliteSessionStore, SessionStore},
    token::TokenCodec,
};

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn SessionStore>,
    pub codec: Arc<TokenCodec>,
    pub accounts: Arc<AccountManager>,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: AppConfig) -> AuthResult<Self> {
        config.validate()?;

        let store: Arc<dyn SessionStore> = match config.database.backend {
            DatabaseBackend::Sqlite => {
                tracing::info!(path = %config.database.sqlite_path.display(), "using sqlite backend");
                Arc::new(SqliteSessionStore::connect(&config.database.sqlite_path).await?)
            }
            DatabaseBackend::Postgres => {
                tracing::info!("using postgres backend");
                Arc::new(PgSessionStore::connect(&config.database.url).await?)
            }
        };

        let codec = Arc::new(TokenCodec::new(&config.auth.jwt_secret));
        let notifier: Arc<dyn PasswordResetNotifier> = Arc::new(Mailer::new(config.email.clone())?);

        let accounts = Arc::new(AccountManager::new(
            Arc::clone(&store),
            Arc::clone(&codec),
            notifier,
            config.service.public_url.clone(),
        ));

        Ok(Self {
            config: Arc::new(config),
            store,
            codec,
            accounts,
        })
    }

    /// Address the HTTP server binds to
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.config.service.host, self.config.service.port)
    }
}
