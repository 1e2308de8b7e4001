//! Log redaction helpers.
//!
//! Tokens and passwords are never logged. Subjects are logged masked, and
//! tokens are referred to by a short blake3 fingerprint so that two log lines
//! about the same token can still be correlated.

/// Mask a value, keeping only its first two characters.
#[must_use]
pub fn mask(value: &str) -> String {
    let prefix: String = value.chars().take(2).collect();
    format!("{prefix}***")
}

/// Return a short, non-reversible fingerprint of a secret value.
///
/// The fingerprint is the first 8 hex characters of the blake3 digest.
#[must_use]
pub fn fingerprint(secret: &str) -> String {
    let digest = blake3::hash(secret.as_bytes());
    hex::encode(&digest.as_bytes()[..4])
}
