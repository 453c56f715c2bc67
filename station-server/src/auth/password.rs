//! Password rules and Argon2id hashing.
//!
//! Hashes are stored as PHC strings (`$argon2id$v=19$m=..,t=..,p=..$salt$hash`).
//! Hashing and verification run on tokio's blocking pool.

use argon2::Argon2;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use tokio::task;

/// Minimum number of characters in a password.
pub const MIN_LENGTH: usize = 8;

/// A password that does not meet the rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PasswordError {
    #[error("This password is too short. It must contain at least {MIN_LENGTH} characters.")]
    TooShort,
    #[error("This password is entirely numeric.")]
    EntirelyNumeric,
}

/// Hashing could not run to completion.
#[derive(Debug, thiserror::Error)]
pub enum HashError {
    #[error("password hashing failed: {0}")]
    Hash(String),
    #[error("password hashing task failed: {0}")]
    Task(#[from] task::JoinError),
}

/// Check a new password, returning every rule it breaks.
pub fn validate_password(password: &str) -> Result<(), Vec<PasswordError>> {
    let mut errors = Vec::new();
    if password.chars().count() < MIN_LENGTH {
        errors.push(PasswordError::TooShort);
    }
    if !password.is_empty() && password.chars().all(|c| c.is_ascii_digit()) {
        errors.push(PasswordError::EntirelyNumeric);
    }
    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

fn hash_blocking(password: &str) -> Result<String, HashError> {
    let salt = SaltString::generate(rand::thread_rng());
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| HashError::Hash(e.to_string()))
}

fn verify_blocking(password: &str, stored: &str) -> bool {
    let Ok(hash) = PasswordHash::new(stored) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &hash)
        .is_ok()
}

/// Hash a password with a fresh random salt.
pub async fn hash_password(password: &str) -> Result<String, HashError> {
    let password = password.to_owned();
    task::spawn_blocking(move || hash_blocking(&password)).await?
}

/// Check a password against a stored hash. Malformed hashes never match.
pub async fn verify_password(password: &str, stored: &str) -> Result<bool, HashError> {
    let password = password.to_owned();
    let stored = stored.to_owned();
    Ok(task::spawn_blocking(move || verify_blocking(&password, &stored)).await?)
}
