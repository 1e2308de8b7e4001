//! Username/password authentication.
//!
//! Login first consults the [`CredentialCache`] (the single production
//! credential) and then a [`UserDirectory`]. The directory also answers role
//! lookups when a refresh token is exchanged.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use slowfall_core::{GroupId, Subject};

use crate::credentials::CredentialCache;
use crate::error::{AuthError, Result};

/// Role granted when nothing more specific is known.
pub const DEFAULT_ROLE: &str = "ROLE_USER";

/// Verified against when the user is unknown, so lookups cost the same either way.
const DUMMY_HASH: &str = "$2b$12$LQv3c1yqBWVHxkd0LHAkCOYz6TtxMQJqhN8/LewY5GyYqExt7YD3a";

/// An authenticated subject with its current roles and groups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    /// Who authenticated.
    pub subject: Subject,
    /// Role names, e.g. `ROLE_USER`.
    pub roles: Vec<String>,
    /// Group identifiers to place in issued tokens.
    pub groups: Vec<GroupId>,
}

/// A source of users and their roles.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Check a username/password pair, returning the user's roles on success.
    async fn authenticate(&self, username: &str, password: &str) -> Option<Vec<String>>;

    /// Current roles for a subject, or `None` if the subject is unknown.
    async fn roles_for(&self, subject: &Subject) -> Option<Vec<String>>;
}

struct DirectoryEntry {
    password_hash: String,
    roles: Vec<String>,
}

/// A fixed set of users held in memory with bcrypt password hashes.
#[derive(Default)]
pub struct InMemoryDirectory {
    users: HashMap<String, DirectoryEntry>,
}

impl InMemoryDirectory {
    /// Create an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a user with a precomputed bcrypt hash.
    #[must_use]
    pub fn with_user(
        mut self,
        username: impl Into<String>,
        password_hash: impl Into<String>,
        roles: Vec<String>,
    ) -> Self {
        self.users.insert(
            username.into(),
            DirectoryEntry {
                password_hash: password_hash.into(),
                roles,
            },
        );
        self
    }

    /// Number of users.
    #[must_use]
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// Returns `true` if the directory has no users.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[async_trait]
impl UserDirectory for InMemoryDirectory {
    async fn authenticate(&self, username: &str, password: &str) -> Option<Vec<String>> {
        let entry = self.users.get(username);
        let hash = entry.map_or(DUMMY_HASH, |e| e.password_hash.as_str()).to_string();
        let password = password.to_owned();

        let verified =
            tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash).unwrap_or(false))
                .await
                .unwrap_or(false);

        match entry {
            Some(entry) if verified => Some(entry.roles.clone()),
            _ => None,
        }
    }

    async fn roles_for(&self, subject: &Subject) -> Option<Vec<String>> {
        self.users.get(subject.as_str()).map(|e| e.roles.clone())
    }
}

impl fmt::Debug for InMemoryDirectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryDirectory")
            .field("users", &self.users.len())
            .finish()
    }
}

/// Hash a password with bcrypt at the given cost.
///
/// # Errors
///
/// Returns an error if the cost is out of range.
pub fn hash_password(password: &str, cost: u32) -> Result<String> {
    bcrypt::hash(password, cost).map_err(|e| AuthError::Internal(format!("bcrypt: {e}")))
}

/// Current roles for `subject` from `directory`, falling back to [`DEFAULT_ROLE`].
pub async fn resolve_roles(directory: &dyn UserDirectory, subject: &Subject) -> Vec<String> {
    directory
        .roles_for(subject)
        .await
        .filter(|roles| !roles.is_empty())
        .unwrap_or_else(|| vec![DEFAULT_ROLE.to_string()])
}

/// Authenticates login requests.
pub struct Authenticator {
    credentials: Option<Arc<CredentialCache>>,
    directory: Arc<dyn UserDirectory>,
    groups: Vec<GroupId>,
}

impl Authenticator {
    /// Create an authenticator. `groups` are attached to every principal it produces.
    #[must_use]
    pub fn new(
        credentials: Option<Arc<CredentialCache>>,
        directory: Arc<dyn UserDirectory>,
        groups: Vec<GroupId>,
    ) -> Self {
        Self {
            credentials,
            directory,
            groups,
        }
    }

    /// Authenticate a username/password pair.
    ///
    /// The cached credential is tried first; on a match the directory is not consulted.
    ///
    /// # Errors
    ///
    /// Returns `InvalidCredentials` if neither source accepts the pair.
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<Principal> {
        let subject = Subject::new(username).map_err(|_| AuthError::InvalidCredentials)?;

        if let Some(cache) = &self.credentials {
            if cache.validate(username, password).await {
                tracing::debug!(subject = %subject.masked(), "Authenticated via cached credential");
                let roles = self.resolve_roles(&subject).await;
                return Ok(self.principal(subject, roles));
            }
        }

        match self.directory.authenticate(username, password).await {
            Some(roles) => {
                tracing::debug!(subject = %subject.masked(), "Authenticated via directory");
                Ok(self.principal(subject, roles))
            }
            None => {
                tracing::info!(subject = %subject.masked(), "Login rejected");
                Err(AuthError::InvalidCredentials)
            }
        }
    }

    /// The vault-backed credential cache, if one is configured.
    #[must_use]
    pub fn credentials(&self) -> Option<&Arc<CredentialCache>> {
        self.credentials.as_ref()
    }

    /// Current roles for `subject`, falling back to [`DEFAULT_ROLE`].
    pub async fn resolve_roles(&self, subject: &Subject) -> Vec<String> {
        resolve_roles(self.directory.as_ref(), subject).await
    }

    fn principal(&self, subject: Subject, roles: Vec<String>) -> Principal {
        Principal {
            subject,
            roles,
            groups: self.groups.clone(),
        }
    }
}
