//! Authority derivation.
//!
//! Authorization decisions compare normalized authority strings. Groups from
//! the `groups` claim become `GROUP_<id>`; roles from the `roles` claim become
//! `ROLE_<name>` unless they already carry the prefix. Derivation is a pure
//! function of the claim values.

use serde::Serialize;
use std::fmt;

use crate::ids::GroupId;

/// Prefix for authorities derived from group identifiers.
pub const GROUP_PREFIX: &str = "GROUP_";

/// Prefix for authorities derived from role names.
pub const ROLE_PREFIX: &str = "ROLE_";

/// A normalized authority string.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Authority(String);

impl Authority {
    /// Derive the authority for a group identifier.
    #[must_use]
    pub fn from_group(group: &GroupId) -> Self {
        Self(format!("{GROUP_PREFIX}{}", group.as_str()))
    }

    /// Derive the authority for a role name.
    ///
    /// `"USER"` and `"ROLE_USER"` both map to `ROLE_USER`.
    #[must_use]
    pub fn from_role(role: &str) -> Self {
        let role = role.trim();
        if role.starts_with(ROLE_PREFIX) {
            Self(role.to_string())
        } else {
            Self(format!("{ROLE_PREFIX}{role}"))
        }
    }

    /// Return the authority as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Authority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Authority({})", self.0)
    }
}

impl fmt::Display for Authority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
