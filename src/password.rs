/// Password hashing
///
/// New hashes are always bcrypt. Older accounts may still carry a hex SHA-256
/// digest from the browser-side fallback; those verify through the legacy
/// path and are rehashed by the account manager once the password is known.
use crate::error::{PocketError, PocketResult};
use sha2::{Digest, Sha256};

pub const MIN_PASSWORD_LENGTH: usize = 8;

/// bcrypt password hasher
#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    cost: u32,
}

impl PasswordHasher {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }

    /// Check length requirements without hashing
    pub fn check_strength(password: &str) -> PocketResult<()> {
        if password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(PocketError::Validation(format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_LENGTH
            )));
        }
        Ok(())
    }

    /// Hash a password with bcrypt on the blocking pool
    pub async fn hash(&self, password: &str) -> PocketResult<String> {
        Self::check_strength(password)?;

        let password = password.to_string();
        let cost = self.cost;
        tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
            .await
            .map_err(|e| PocketError::Internal(format!("Hashing task failed: {}", e)))?
            .map_err(|e| PocketError::Internal(format!("Password hashing failed: {}", e)))
    }

    /// Verify a password against a stored bcrypt or legacy SHA-256 hash
    pub async fn verify(&self, password: &str, stored: &str) -> PocketResult<bool> {
        if is_bcrypt(stored) {
            let password = password.to_string();
            let stored = stored.to_string();
            return tokio::task::spawn_blocking(move || bcrypt::verify(password, &stored))
                .await
                .map_err(|e| PocketError::Internal(format!("Verification task failed: {}", e)))?
                .or_else(|e| {
                    // Malformed hash: treat as a mismatch rather than a server fault
                    tracing::warn!("bcrypt verification error: {}", e);
                    Ok(false)
                });
        }

        Ok(legacy_digest(password) == stored.to_ascii_lowercase())
    }

    /// True when the stored hash predates bcrypt and should be replaced
    pub fn needs_upgrade(stored: &str) -> bool {
        !is_bcrypt(stored)
    }
}

fn is_bcrypt(stored: &str) -> bool {
    stored.starts_with("$2")
}

/// Hex SHA-256 digest used by legacy password hashes
pub fn legacy_digest(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}
