//! Authorization policy.
//!
//! A request is permitted if its path is public, or if it carries an identity
//! holding the authority derived from the allowed group.

use chrono::{DateTime, Utc};

use slowfall_core::{Authority, GroupId, Subject};

use crate::claims::ClaimSet;
use crate::directory::DEFAULT_ROLE;
use crate::error::Result;
use crate::AuthSettings;

/// Path prefixes reachable without authentication.
pub const PUBLIC_PREFIXES: &[&str] = &["/auth/", "/.well-known/"];

/// Exact paths reachable without authentication.
pub const PUBLIC_PATHS: &[&str] = &["/health"];

/// Where a request's identity came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityOrigin {
    /// A verified bearer token.
    Token,
    /// Injected by the development bypass.
    DevBypass,
    /// Attached by an upstream layer before token verification.
    Upstream,
}

/// The authentication attached to a single request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    subject: Subject,
    authorities: Vec<Authority>,
    expires_at: DateTime<Utc>,
    origin: IdentityOrigin,
}

impl Identity {
    /// Create an identity.
    #[must_use]
    pub fn new(
        subject: Subject,
        authorities: Vec<Authority>,
        expires_at: DateTime<Utc>,
        origin: IdentityOrigin,
    ) -> Self {
        Self {
            subject,
            authorities,
            expires_at,
            origin,
        }
    }

    /// The identity carried by a verified access token.
    #[must_use]
    pub fn from_claims(claims: &ClaimSet) -> Self {
        Self::new(
            claims.subject().clone(),
            claims.authorities(),
            claims.expiry(),
            IdentityOrigin::Token,
        )
    }

    /// The synthetic identity injected by the development bypass.
    #[must_use]
    pub fn dev_bypass(subject: Subject, group: &GroupId, expires_at: DateTime<Utc>) -> Self {
        Self::new(
            subject,
            vec![Authority::from_role(DEFAULT_ROLE), Authority::from_group(group)],
            expires_at,
            IdentityOrigin::DevBypass,
        )
    }

    /// Who the request is authenticated as.
    #[must_use]
    pub const fn subject(&self) -> &Subject {
        &self.subject
    }

    /// Granted authorities.
    #[must_use]
    pub fn authorities(&self) -> &[Authority] {
        &self.authorities
    }

    /// When the authentication stops being valid.
    #[must_use]
    pub const fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Where the identity came from.
    #[must_use]
    pub const fn origin(&self) -> IdentityOrigin {
        self.origin
    }

    /// Returns `true` if the identity holds `authority`.
    #[must_use]
    pub fn has_authority(&self, authority: &Authority) -> bool {
        self.authorities.contains(authority)
    }

    /// Returns `true` if the identity is expired at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Outcome of an authorization check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Let the request through.
    Permit,
    /// No usable identity (401).
    Unauthenticated,
    /// Identity present but lacking the required authority (403).
    Forbidden,
}

impl Decision {
    /// HTTP status code for a rejection, `None` for `Permit`.
    #[must_use]
    pub const fn rejection_status(self) -> Option<u16> {
        match self {
            Self::Permit => None,
            Self::Unauthenticated => Some(401),
            Self::Forbidden => Some(403),
        }
    }
}

/// Maps request paths and identities to decisions.
#[derive(Debug, Clone)]
pub struct AuthorizationPolicy {
    allowed_group: GroupId,
    required: Authority,
}

impl AuthorizationPolicy {
    /// Require membership in `allowed_group` on non-public paths.
    #[must_use]
    pub fn new(allowed_group: GroupId) -> Self {
        let required = Authority::from_group(&allowed_group);
        Self {
            allowed_group,
            required,
        }
    }

    /// Build the policy from settings.
    ///
    /// # Errors
    ///
    /// Returns `MisconfiguredAuthority` if no group is configured outside development.
    pub fn from_settings(settings: &AuthSettings) -> Result<Self> {
        Ok(Self::new(settings.effective_allowed_group()?))
    }

    /// The group whose members are permitted.
    #[must_use]
    pub const fn allowed_group(&self) -> &GroupId {
        &self.allowed_group
    }

    /// The authority required on protected paths.
    #[must_use]
    pub const fn required_authority(&self) -> &Authority {
        &self.required
    }

    /// Returns `true` if `path` needs no authentication.
    #[must_use]
    pub fn is_public(path: &str) -> bool {
        PUBLIC_PATHS.contains(&path) || PUBLIC_PREFIXES.iter().any(|p| path.starts_with(p))
    }

    /// Decide whether a request to `path` with `identity` may proceed.
    ///
    /// An identity past its expiry at `now` counts as no identity.
    #[must_use]
    pub fn decide(
        &self,
        path: &str,
        identity: Option<&Identity>,
        now: DateTime<Utc>,
    ) -> Decision {
        if Self::is_public(path) {
            return Decision::Permit;
        }
        match identity {
            None => Decision::Unauthenticated,
            Some(identity) if identity.is_expired_at(now) => {
                tracing::debug!(
                    subject = %identity.subject().masked(),
                    path,
                    "Expired identity"
                );
                Decision::Unauthenticated
            }
            Some(identity) if identity.has_authority(&self.required) => Decision::Permit,
            Some(identity) => {
                tracing::info!(
                    subject = %identity.subject().masked(),
                    path,
                    required = %self.required,
                    "Insufficient authority"
                );
                Decision::Forbidden
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn identity_with_groups(groups: &[&str]) -> Identity {
        let claims = ClaimSet::access(
            "slowfall",
            Subject::new("alice").unwrap(),
            vec!["USER".into()],
            groups.iter().map(|g| GroupId::new(*g).unwrap()).collect(),
            Utc::now().timestamp(),
            Duration::from_secs(900),
        );
        Identity::from_claims(&claims)
    }

    fn policy() -> AuthorizationPolicy {
        AuthorizationPolicy::new(GroupId::new("g1").unwrap())
    }

    #[test]
    fn member_of_allowed_group_is_permitted() {
        let identity = identity_with_groups(&["g1"]);
        assert_eq!(
            policy().decide("/api/protected/resource", Some(&identity), Utc::now()),
            Decision::Permit
        );
    }

    #[test]
    fn other_group_is_forbidden() {
        let identity = identity_with_groups(&["g2"]);
        assert_eq!(
            policy().decide("/api/protected/resource", Some(&identity), Utc::now()),
            Decision::Forbidden
        );
    }

    #[test]
    fn role_named_like_group_does_not_grant_access() {
        let claims = ClaimSet::access(
            "slowfall",
            Subject::new("alice").unwrap(),
            vec!["GROUP_g1".into()],
            vec![],
            Utc::now().timestamp(),
            Duration::from_secs(900),
        );
        let identity = Identity::from_claims(&claims);
        assert_eq!(
            policy().decide("/api/things", Some(&identity), Utc::now()),
            Decision::Forbidden
        );
    }

    #[test]
    fn missing_identity_is_unauthenticated() {
        assert_eq!(
            policy().decide("/api/things", None, Utc::now()),
            Decision::Unauthenticated
        );
        assert_eq!(Decision::Unauthenticated.rejection_status(), Some(401));
        assert_eq!(Decision::Forbidden.rejection_status(), Some(403));
    }

    #[test]
    fn public_paths() {
        for path in ["/auth/login", "/auth/refresh", "/health", "/.well-known/jwks.json"] {
            assert_eq!(policy().decide(path, None, Utc::now()), Decision::Permit, "{path}");
        }
        for path in ["/healthz", "/api/auth/login", "/authx"] {
            assert_eq!(
                policy().decide(path, None, Utc::now()),
                Decision::Unauthenticated,
                "{path}"
            );
        }
    }

    #[test]
    fn dev_bypass_identity_carries_group_and_role() {
        let group = GroupId::new("g1").unwrap();
        let now = Utc::now();
        let identity = Identity::dev_bypass(
            Subject::new("dev").unwrap(),
            &group,
            now + chrono::Duration::minutes(15),
        );
        assert_eq!(identity.origin(), IdentityOrigin::DevBypass);
        assert!(identity.has_authority(&Authority::from_role("ROLE_USER")));
        assert_eq!(policy().decide("/api/dev/x", Some(&identity), now), Decision::Permit);
    }

    #[test]
    fn expired_identity_is_unauthenticated() {
        let now = Utc::now();
        let identity = identity_with_groups(&["g1"]);
        let later = identity.expires_at() + chrono::Duration::seconds(1);
        assert_eq!(
            policy().decide("/api/protected/resource", Some(&identity), later),
            Decision::Unauthenticated
        );
        // Public paths stay open regardless.
        assert_eq!(policy().decide("/health", Some(&identity), later), Decision::Permit);
        assert_eq!(
            policy().decide("/api/protected/resource", Some(&identity), now),
            Decision::Permit
        );
    }

    #[test]
    fn policy_requires_group_outside_dev() {
        let settings = AuthSettings::default();
        assert!(matches!(
            AuthorizationPolicy::from_settings(&settings),
            Err(crate::AuthError::MisconfiguredAuthority(_))
        ));

        let dev = AuthSettings {
            dev_mode: true,
            ..AuthSettings::default()
        };
        let policy = AuthorizationPolicy::from_settings(&dev).unwrap();
        assert_eq!(policy.allowed_group().as_str(), crate::DEV_FALLBACK_GROUP);
    }
}
