//! Salted PBKDF2-SHA256 password hashes.
//!
//! Encoded as `pbkdf2_sha256$<iterations>$<salt>$<hash>` so the iteration
//! count travels with the hash and can be raised without invalidating
//! existing accounts.

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use base64::Engine;
use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::CryptoError;

pub const ALGORITHM: &str = "pbkdf2_sha256";
pub const SALT_LENGTH: usize = 16;
pub const HASH_LENGTH: usize = 32;

/// Generate a random salt, base64 encoded.
pub fn generate_salt() -> String {
    use rand::RngCore;
    let mut salt = [0u8; SALT_LENGTH];
    rand::thread_rng().fill_bytes(&mut salt);
    STANDARD_NO_PAD.encode(salt)
}

fn derive(password: &str, salt: &str, iterations: u32) -> [u8; HASH_LENGTH] {
    let mut out = [0u8; HASH_LENGTH];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt.as_bytes(), iterations, &mut out);
    out
}

/// Hash a password with a fresh salt.
pub fn hash_password(password: &str, iterations: u32) -> String {
    let salt = generate_salt();
    let hash = derive(password, &salt, iterations);
    format!("{ALGORITHM}${iterations}${salt}${}", STANDARD.encode(hash))
}

/// Check a password against an encoded hash. A mismatch is `Ok(false)`;
/// only an unreadable stored hash is an error.
pub fn verify_password(password: &str, encoded: &str) -> Result<bool, CryptoError> {
    let mut parts = encoded.split('$');
    let (Some(algorithm), Some(iterations), Some(salt), Some(hash), None) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        return Err(CryptoError::MalformedHash);
    };
    if algorithm != ALGORITHM {
        return Err(CryptoError::MalformedHash);
    }
    let iterations: u32 = iterations.parse().map_err(|_| CryptoError::MalformedHash)?;
    let expected = STANDARD.decode(hash).map_err(|_| CryptoError::MalformedHash)?;

    let actual = derive(password, salt, iterations);
    Ok(actual.as_slice().ct_eq(expected.as_slice()).unwrap_u8() == 1)
}
