/// Small helpers shared across flows
use rand::RngCore;

/// Mask an email address for display
///
/// Keeps at most the first two characters of the local part; local parts
/// of two characters or fewer are masked entirely.
pub fn mask_email(email: &str) -> String {
    match email.split_once('@') {
        Some((local, domain)) => {
            let len = local.chars().count();
            if len <= 2 {
                format!("***@{}", domain)
            } else {
                let kept: String = local.chars().take(2).collect();
                format!("{}{}@{}", kept, "*".repeat(len - 2), domain)
            }
        }
        None => "***".to_string(),
    }
}

/// Generate a 32-character hex token for password-reset links
pub fn generate_reset_token() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
