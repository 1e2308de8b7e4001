//! Core identifier types for slowfall.
//!
//! This module provides strongly-typed identifiers for token subjects, groups
//! and signing keys. All of them are opaque strings with light validation so
//! that an identifier taken from a token can never smuggle control characters
//! into logs or authorities.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::IdError;

/// Maximum length of a subject or group identifier, in bytes.
pub const MAX_ID_LEN: usize = 256;

fn validate(value: &str) -> Result<(), IdError> {
    if value.trim().is_empty() {
        return Err(IdError::Empty);
    }
    if value.len() > MAX_ID_LEN {
        return Err(IdError::TooLong {
            max: MAX_ID_LEN,
            got: value.len(),
        });
    }
    if value.trim() != value || value.chars().any(char::is_control) {
        return Err(IdError::InvalidCharacters);
    }
    Ok(())
}

/// The principal a token was issued to (the `sub` claim).
///
/// Subjects are usernames in practice. They are validated on construction
/// and rendered masked in logs via [`Subject::masked`].
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Subject(String);

impl Subject {
    /// Create a new `Subject`.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is empty, too long, or contains
    /// control characters or surrounding whitespace.
    pub fn new(value: impl Into<String>) -> Result<Self, IdError> {
        let value = value.into();
        validate(&value)?;
        Ok(Self(value))
    }

    /// Return the subject as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Return a masked rendering suitable for logs (first two characters only).
    #[must_use]
    pub fn masked(&self) -> String {
        crate::redact::mask(&self.0)
    }
}

impl fmt::Debug for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Subject({})", self.masked())
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Subject {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Subject {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Subject> for String {
    fn from(id: Subject) -> Self {
        id.0
    }
}

/// An opaque group identifier carried in the `groups` claim.
///
/// In production these are directory group object IDs (UUIDs), but nothing
/// here assumes a format.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GroupId(String);

impl GroupId {
    /// Create a new `GroupId`.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is empty, too long, or contains
    /// control characters or surrounding whitespace.
    pub fn new(value: impl Into<String>) -> Result<Self, IdError> {
        let value = value.into();
        validate(&value)?;
        Ok(Self(value))
    }

    /// Return the group identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GroupId({})", self.0)
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for GroupId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for GroupId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<GroupId> for String {
    fn from(id: GroupId) -> Self {
        id.0
    }
}

/// Identifier of a signing key (the `kid` header and JWK field).
///
/// Ephemeral keys get a random UUID; remote keys use the key URL reported by
/// the vault.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct KeyId(String);

impl KeyId {
    /// Create a `KeyId` from an existing identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is empty or contains control characters.
    pub fn new(value: impl Into<String>) -> Result<Self, IdError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(IdError::Empty);
        }
        if value.chars().any(char::is_control) {
            return Err(IdError::InvalidCharacters);
        }
        Ok(Self(value))
    }

    /// Generate a new random `KeyId`.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Return the key ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyId({})", self.0)
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for KeyId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<KeyId> for String {
    fn from(id: KeyId) -> Self {
        id.0
    }
}
