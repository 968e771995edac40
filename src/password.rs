//! Password hashing and verification.

use crate::config::AuthConfig;
use crate::error::AuthError;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use async_trait::async_trait;

/// One-way hashing capability for stored credentials
#[async_trait]
pub trait PasswordHasher: Send + Sync {
    /// Hash a plaintext password for storage
    async fn hash(&self, plaintext: &str) -> Result<String, AuthError>;

    /// Check a plaintext password against a stored hash.
    ///
    /// Malformed hashes verify as `false`.
    async fn verify(&self, hash: &str, plaintext: &str) -> bool;
}

/// Argon2id hasher; work runs on the blocking pool.
#[derive(Debug, Clone, Copy)]
pub struct Argon2Hasher {
    memory_kib: u32,
    iterations: u32,
    parallelism: u32,
}

impl Argon2Hasher {
    pub fn new(memory_kib: u32, iterations: u32, parallelism: u32) -> Self {
        Self {
            memory_kib,
            iterations,
            parallelism,
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(
            config.argon2_memory_cost,
            config.argon2_time_cost,
            config.argon2_parallelism,
        )
    }

    fn argon2(&self) -> Result<Argon2<'static>, AuthError> {
        let params = Params::new(self.memory_kib, self.iterations, self.parallelism, None)
            .map_err(|_| AuthError::Hashing)?;

        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }

    fn hash_blocking(self, plaintext: &str) -> Result<String, AuthError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()?
            .hash_password(plaintext.as_bytes(), &salt)?
            .to_string();

        Ok(hash)
    }

    fn verify_blocking(hash: &str, plaintext: &str) -> bool {
        let Ok(parsed_hash) = PasswordHash::new(hash) else {
            tracing::warn!("Stored password hash could not be parsed");
            return false;
        };

        // Verification uses the parameters embedded in the hash
        Argon2::default()
            .verify_password(plaintext.as_bytes(), &parsed_hash)
            .is_ok()
    }
}

impl Default for Argon2Hasher {
    fn default() -> Self {
        Self::from_config(&AuthConfig::default())
    }
}

#[async_trait]
impl PasswordHasher for Argon2Hasher {
    async fn hash(&self, plaintext: &str) -> Result<String, AuthError> {
        let hasher = *self;
        let plaintext = plaintext.to_owned();
        tokio::task::spawn_blocking(move || hasher.hash_blocking(&plaintext))
            .await
            .map_err(|e| {
                tracing::error!("Password hashing task failed: {e}");
                AuthError::Hashing
            })?
    }

    async fn verify(&self, hash: &str, plaintext: &str) -> bool {
        let hash = hash.to_owned();
        let plaintext = plaintext.to_owned();
        tokio::task::spawn_blocking(move || Self::verify_blocking(&hash, &plaintext))
            .await
            .unwrap_or_else(|e| {
                tracing::error!("Password verification task failed: {e}");
                false
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_hasher() -> Argon2Hasher {
        Argon2Hasher::new(1024, 1, 1)
    }

    #[tokio::test]
    async fn test_hash_and_verify() {
        let hasher = fast_hasher();
        let hash = hasher.hash("secret123").await.unwrap();

        assert!(hash.starts_with("$argon2id$"));
        assert!(hasher.verify(&hash, "secret123").await);
        assert!(!hasher.verify(&hash, "secret124").await);
    }

    #[tokio::test]
    async fn test_same_input_different_hashes() {
        let hasher = fast_hasher();
        let hash1 = hasher.hash("same_password").await.unwrap();
        let hash2 = hasher.hash("same_password").await.unwrap();

        assert_ne!(hash1, hash2);
        assert!(hasher.verify(&hash1, "same_password").await);
        assert!(hasher.verify(&hash2, "same_password").await);
    }

    #[tokio::test]
    async fn test_malformed_hash_does_not_verify() {
        let hasher = fast_hasher();
        assert!(!hasher.verify("not-a-hash", "anything").await);
        assert!(!hasher.verify("", "").await);
    }

    #[tokio::test]
    async fn test_invalid_params_fail_to_hash() {
        let hasher = Argon2Hasher::new(1, 0, 0);
        assert!(matches!(hasher.hash("pw").await, Err(AuthError::Hashing)));
    }
}
