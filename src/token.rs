/// Signed token minting and verification
///
/// Two token kinds, each signed with its own HS256 secret derived from one
/// master secret, so an access token can never be replayed as a refresh
/// token or vice versa. Access tokens are stateless; refresh tokens are
/// additionally checked against the session store by the caller.
use chrono::{Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Access tokens live for a single short request window.
pub const ACCESS_TOKEN_TTL_MINUTES: i64 = 15;
/// Refresh tokens live for a week and are store-checked.
pub const REFRESH_TOKEN_TTL_DAYS: i64 = 7;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    #[error("token expired")]
    Expired,
    #[error("invalid token")]
    Invalid,
}

#[derive(Debug, Serialize, Deserialize)]
struct AccessClaims {
    sub: String,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Serialize, Deserialize)]
struct RefreshClaims {
    sub: String,
    dev: String,
    jti: String,
    iat: i64,
    exp: i64,
}

/// Token codec holding both derived signing secrets
pub struct TokenCodec {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
}

impl TokenCodec {
    pub fn new(master_secret: &str) -> Self {
        let refresh_secret = format!("{}-refresh", master_secret);
        Self {
            access_encoding: EncodingKey::from_secret(master_secret.as_bytes()),
            access_decoding: DecodingKey::from_secret(master_secret.as_bytes()),
            refresh_encoding: EncodingKey::from_secret(refresh_secret.as_bytes()),
            refresh_decoding: DecodingKey::from_secret(refresh_secret.as_bytes()),
        }
    }

    /// Mint a short-lived access token for the given account
    pub fn mint_access_token(&self, account_id: i64) -> Result<String, TokenError> {
        let now = Utc::now();
        let claims = AccessClaims {
            sub: account_id.to_string(),
            iat: now.timestamp(),
            exp: (now + Duration::minutes(ACCESS_TOKEN_TTL_MINUTES)).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.access_encoding)
            .map_err(|_| TokenError::Invalid)
    }

    /// Mint a refresh token bound to a device tag
    ///
    /// The jti nonce makes every mint distinct, so a rotated token never
    /// collides with the one it replaces.
    pub fn mint_refresh_token(&self, account_id: i64, device_tag: &str) -> Result<String, TokenError> {
        let now = Utc::now();
        let mut nonce = [0u8; 8];
        rand::thread_rng().fill_bytes(&mut nonce);
        let claims = RefreshClaims {
            sub: account_id.to_string(),
            dev: device_tag.to_string(),
            jti: hex::encode(nonce),
            iat: now.timestamp(),
            exp: (now + Duration::days(REFRESH_TOKEN_TTL_DAYS)).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.refresh_encoding)
            .map_err(|_| TokenError::Invalid)
    }

    /// Verify an access token and return the account id it names
    pub fn verify_access_token(&self, token: &str) -> Result<i64, TokenError> {
        let data = decode::<AccessClaims>(token, &self.access_decoding, &strict_validation())
            .map_err(classify)?;
        // The exp claim is re-checked against the wall clock at verification time
        if data.claims.exp <= Utc::now().timestamp() {
            return Err(TokenError::Expired);
        }
        data.claims.sub.parse::<i64>().map_err(|_| TokenError::Invalid)
    }

    /// Verify a refresh token and return its account id and device tag
    pub fn verify_refresh_token(&self, token: &str) -> Result<(i64, String), TokenError> {
        let data = decode::<RefreshClaims>(token, &self.refresh_decoding, &strict_validation())
            .map_err(classify)?;
        if data.claims.exp <= Utc::now().timestamp() {
            return Err(TokenError::Expired);
        }
        let account_id = data.claims.sub.parse::<i64>().map_err(|_| TokenError::Invalid)?;
        Ok((account_id, data.claims.dev))
    }
}

fn strict_validation() -> Validation {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    validation
}

fn classify(err: jsonwebtoken::errors::Error) -> TokenError {
    match err.kind() {
        ErrorKind::ExpiredSignature => TokenError::Expired,
        _ => TokenError::Invalid,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret-test-secret-test-secret";

    #[test]
    fn access_token_round_trip() {
        let codec = TokenCodec::new(SECRET);
        for account_id in [1i64, 42, 12345, i64::MAX] {
            let token = codec.mint_access_token(account_id).unwrap();
            assert_eq!(codec.verify_access_token(&token).unwrap(), account_id);
        }
    }

    #[test]
    fn refresh_token_round_trip() {
        let codec = TokenCodec::new(SECRET);
        let token = codec.mint_refresh_token(67890, "test-device").unwrap();
        let (account_id, device_tag) = codec.verify_refresh_token(&token).unwrap();
        assert_eq!(account_id, 67890);
        assert_eq!(device_tag, "test-device");
    }

    #[test]
    fn refresh_mints_are_distinct() {
        let codec = TokenCodec::new(SECRET);
        let first = codec.mint_refresh_token(1, "browser").unwrap();
        let second = codec.mint_refresh_token(1, "browser").unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn garbage_token_is_invalid() {
        let codec = TokenCodec::new(SECRET);
        assert_eq!(
            codec.verify_access_token("invalid.token.value"),
            Err(TokenError::Invalid)
        );
        assert_eq!(
            codec.verify_refresh_token("invalid.token.value"),
            Err(TokenError::Invalid)
        );
    }

    #[test]
    fn access_token_is_not_a_refresh_token() {
        let codec = TokenCodec::new(SECRET);
        let access = codec.mint_access_token(7).unwrap();
        assert_eq!(codec.verify_refresh_token(&access), Err(TokenError::Invalid));

        let refresh = codec.mint_refresh_token(7, "phone").unwrap();
        assert_eq!(codec.verify_access_token(&refresh), Err(TokenError::Invalid));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let codec = TokenCodec::new(SECRET);
        let other = TokenCodec::new("another-secret-another-secret-xx");
        let token = codec.mint_access_token(9).unwrap();
        assert_eq!(other.verify_access_token(&token), Err(TokenError::Invalid));
    }

    #[test]
    fn expired_access_token_fails_as_expired() {
        let codec = TokenCodec::new(SECRET);
        let now = Utc::now();
        let claims = AccessClaims {
            sub: "12345".to_string(),
            iat: (now - Duration::minutes(30)).timestamp(),
            exp: (now - Duration::minutes(15)).timestamp(),
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();
        assert_eq!(codec.verify_access_token(&token), Err(TokenError::Expired));
    }

    #[test]
    fn expired_refresh_token_fails_as_expired() {
        let codec = TokenCodec::new(SECRET);
        let now = Utc::now();
        let claims = RefreshClaims {
            sub: "67890".to_string(),
            dev: "test-device".to_string(),
            jti: "00".to_string(),
            iat: (now - Duration::days(8)).timestamp(),
            exp: (now - Duration::days(1)).timestamp(),
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(format!("{}-refresh", SECRET).as_bytes()),
        )
        .unwrap();
        assert_eq!(codec.verify_refresh_token(&token), Err(TokenError::Expired));
    }

    #[test]
    fn non_integer_subject_is_invalid() {
        let codec = TokenCodec::new(SECRET);
        let now = Utc::now();
        let claims = AccessClaims {
            sub: "not-a-number".to_string(),
            iat: now.timestamp(),
            exp: (now + Duration::minutes(15)).timestamp(),
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();
        assert_eq!(codec.verify_access_token(&token), Err(TokenError::Invalid));
    }
}
