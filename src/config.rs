/// Configuration management for Keygate
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

use crate::error::{AuthError, AuthResult};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub service: ServiceConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub email: Option<EmailConfig>,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    /// Base URL embedded in outbound links (password-reset mail)
    pub public_url: String,
}

/// Storage backend selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    Postgres,
    Sqlite,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub backend: DatabaseBackend,
    /// PostgreSQL connection URL
    pub url: String,
    /// SQLite database file path
    pub sqlite_path: PathBuf,
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

/// Email configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    pub smtp_url: String,
    pub from_address: String,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> AuthResult<Self> {
        dotenv::dotenv().ok();

        let host = env::var("KEYGATE_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("KEYGATE_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .map_err(|_| AuthError::Validation("invalid port number".to_string()))?;
        let public_url = env::var("KEYGATE_PUBLIC_URL")
            .unwrap_or_else(|_| format!("http://{}:{}", host, port));

        let backend = match env::var("KEYGATE_DB_BACKEND")
            .unwrap_or_else(|_| "postgres".to_string())
            .as_str()
        {
            "sqlite" => DatabaseBackend::Sqlite,
            _ => DatabaseBackend::Postgres,
        };
        let url = env::var("KEYGATE_DATABASE_URL")
            .unwrap_or_else(|_| "postgres://postgres@localhost:5432/keygate".to_string());
        let sqlite_path = env::var("KEYGATE_SQLITE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./keygate.db"));

        let jwt_secret = env::var("KEYGATE_JWT_SECRET")
            .map_err(|_| AuthError::Validation("KEYGATE_JWT_SECRET is required".to_string()))?;

        let email = if let Ok(smtp_url) = env::var("KEYGATE_SMTP_URL") {
            Some(EmailConfig {
                smtp_url,
                from_address: env::var("KEYGATE_EMAIL_FROM")
                    .unwrap_or_else(|_| "noreply@localhost".to_string()),
            })
        } else {
            None
        };

        Ok(AppConfig {
            service: ServiceConfig {
                host,
                port,
                public_url,
            },
            database: DatabaseConfig {
                backend,
                url,
                sqlite_path,
            },
            auth: AuthConfig { jwt_secret },
            email,
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> AuthResult<()> {
        if self.service.host.is_empty() {
            return Err(AuthError::Validation("host cannot be empty".to_string()));
        }

        if self.auth.jwt_secret.len() < 32 {
            return Err(AuthError::Validation(
                "JWT secret must be at least 32 characters".to_string(),
            ));
        }

        Ok(())
    }
}
