/// Password hashing and verification
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

use crate::error::{AuthError, AuthResult};

/// Hash a plaintext password with a fresh per-hash salt
pub fn hash(plaintext: &str) -> AuthResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plaintext.as_bytes(), &salt)
        .map(|digest| digest.to_string())
        .map_err(|e| AuthError::Hash(e.to_string()))
}

/// Check a plaintext password against a stored digest
///
/// An undecodable digest verifies as false rather than erroring.
pub fn verify(plaintext: &str, digest: &str) -> bool {
    PasswordHash::new(digest)
        .map(|parsed| {
            Argon2::default()
                .verify_password(plaintext.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify() {
        let digest = hash("password123").unwrap();
        assert!(verify("password123", &digest));
        assert!(!verify("password124", &digest));
    }

    #[test]
    fn salts_differ_between_hashes() {
        let first = hash("password123").unwrap();
        let second = hash("password123").unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn garbage_digest_verifies_false() {
        assert!(!verify("password123", "not-a-digest"));
        assert!(!verify("password123", ""));
    }
}
