use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};

use std::sync::LazyLock;

use crate::error::AppError;

// Stand-in hash for logins naming an unknown email. Built with the same parameters as real
// hashes so a failed lookup costs one full Argon2 verification too.
static DUMMY_HASH: LazyLock<Option<String>> =
    LazyLock::new(|| hash_password("sweet-shop-unknown-account").ok());

/// Hash a plaintext password with Argon2id and a fresh random salt.
///
/// The result is a self-describing PHC string (algorithm, parameters, salt, digest) and is
/// the only form in which a password ever reaches the store.
pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("password hashing failed: {e}")))
}

/// Verify a plaintext password against a stored PHC string.
///
/// An unparsable stored hash counts as a mismatch. The digest comparison itself is
/// constant-time inside `argon2`.
pub fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

/// Check login credentials against the stored hash, if there is one.
///
/// An absent account still runs a verification against a dummy hash and then fails, so an
/// unknown email and a wrong password take the same time.
pub fn verify_login(password: &str, stored_hash: Option<&str>) -> bool {
    match stored_hash {
        Some(hash) => verify_password(password, hash),
        None => {
            if let Some(dummy) = DUMMY_HASH.as_deref() {
                verify_password(password, dummy);
            }
            false
        }
    }
}
