//! Password hashing and reset tokens
//!
//! Passwords are stored as Argon2id PHC strings. Reset tokens are random
//! 32-byte values handed to the user once; only their SHA-256 digest is
//! persisted.

use anyhow::{Context, Result};
use argon2::{
    password_hash::{
        rand_core::{OsRng, RngCore},
        PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
    },
    Argon2,
};
use data_encoding::HEXLOWER;
use sha2::{Digest, Sha256};

/// Hash a password using Argon2id with default parameters.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);

    let password_hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))
        .context("Password hashing failed")?;

    Ok(password_hash.to_string())
}

/// Verify a password against a stored hash.
///
/// Returns `Ok(false)` for a wrong password and an error only when the
/// stored hash itself is malformed.
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| anyhow::anyhow!("Invalid password hash format: {}", e))
        .context("Failed to parse password hash")?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(anyhow::anyhow!("Password verification failed: {}", e))
            .context("Password verification error"),
    }
}

/// Generate a password reset token, returning `(token, digest)`.
///
/// The token goes into the reset link; the digest goes into the database.
pub fn generate_reset_token() -> (String, String) {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    let token = HEXLOWER.encode(&bytes);
    let digest = hash_reset_token(&token);
    (token, digest)
}

/// SHA-256 hex digest of a reset token
pub fn hash_reset_token(token: &str) -> String {
    HEXLOWER.encode(&Sha256::digest(token.as_bytes()))
}
