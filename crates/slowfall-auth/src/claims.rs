//! Token claim sets.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use slowfall_core::{Authority, GroupId, Subject};

/// The kind of token a claim set belongs to (the `type` claim).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    /// Short-lived token presented on every request.
    Access,
    /// Long-lived token exchanged for new access tokens.
    Refresh,
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Access => f.write_str("access"),
            Self::Refresh => f.write_str("refresh"),
        }
    }
}

/// The claims carried by a signed token.
///
/// Fields serialize in declaration order. A claim set is immutable once built;
/// the constructors guarantee `iat <= exp`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimSet {
    iss: String,
    iat: i64,
    exp: i64,
    sub: Subject,
    #[serde(rename = "type")]
    token_type: TokenType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    roles: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    groups: Vec<GroupId>,
}

impl ClaimSet {
    /// Build an access-token claim set issued at `iat` (epoch seconds).
    #[must_use]
    pub fn access(
        issuer: impl Into<String>,
        subject: Subject,
        roles: Vec<String>,
        groups: Vec<GroupId>,
        iat: i64,
        ttl: Duration,
    ) -> Self {
        Self {
            iss: issuer.into(),
            iat,
            exp: iat.saturating_add(ttl_seconds(ttl)),
            sub: subject,
            token_type: TokenType::Access,
            roles,
            groups,
        }
    }

    /// Build a refresh-token claim set issued at `iat` (epoch seconds).
    ///
    /// Refresh tokens carry groups but never roles; roles are re-resolved on refresh.
    #[must_use]
    pub fn refresh(
        issuer: impl Into<String>,
        subject: Subject,
        groups: Vec<GroupId>,
        iat: i64,
        ttl: Duration,
    ) -> Self {
        Self {
            iss: issuer.into(),
            iat,
            exp: iat.saturating_add(ttl_seconds(ttl)),
            sub: subject,
            token_type: TokenType::Refresh,
            roles: Vec::new(),
            groups,
        }
    }

    /// The issuer (`iss`).
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.iss
    }

    /// Issued-at, epoch seconds (`iat`).
    #[must_use]
    pub const fn issued_at(&self) -> i64 {
        self.iat
    }

    /// Expiry, epoch seconds (`exp`).
    #[must_use]
    pub const fn expires_at(&self) -> i64 {
        self.exp
    }

    /// Expiry as a timestamp.
    #[must_use]
    pub fn expiry(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.exp, 0).unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// The subject (`sub`).
    #[must_use]
    pub const fn subject(&self) -> &Subject {
        &self.sub
    }

    /// The token type (`type`).
    #[must_use]
    pub const fn token_type(&self) -> TokenType {
        self.token_type
    }

    /// Role names (`roles`).
    #[must_use]
    pub fn roles(&self) -> &[String] {
        &self.roles
    }

    /// Group identifiers (`groups`).
    #[must_use]
    pub fn groups(&self) -> &[GroupId] {
        &self.groups
    }

    /// Derive the authorities granted by this claim set: groups first, then roles.
    #[must_use]
    pub fn authorities(&self) -> Vec<Authority> {
        self.groups
            .iter()
            .map(Authority::from_group)
            .chain(self.roles.iter().map(|r| Authority::from_role(r)))
            .collect()
    }

    /// Returns `true` if the claim set is expired at `now` (epoch seconds).
    #[must_use]
    pub const fn is_expired_at(&self, now: i64) -> bool {
        now > self.exp
    }

    pub(crate) const fn is_well_formed(&self) -> bool {
        self.iat <= self.exp
    }
}

fn ttl_seconds(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX)
}

/// The JOSE header of a compact token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct TokenHeader {
    pub alg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typ: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
}

impl TokenHeader {
    pub(crate) fn rs256(kid: &str) -> Self {
        Self {
            alg: "RS256".to_string(),
            typ: Some("JWT".to_string()),
            kid: Some(kid.to_string()),
        }
    }
}

/// A freshly signed token and its expiry.
#[derive(Clone, PartialEq, Eq)]
pub struct IssuedToken {
    /// The compact token string.
    pub token: String,
    /// When the token expires.
    pub expires_at: DateTime<Utc>,
}

impl fmt::Debug for IssuedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedToken")
            .field("token", &slowfall_core::redact::fingerprint(&self.token))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> Subject {
        Subject::new("alice").unwrap()
    }

    #[test]
    fn access_claims_expire_after_ttl() {
        let claims = ClaimSet::access(
            "slowfall",
            alice(),
            vec!["ROLE_USER".into()],
            vec![],
            1_700_000_000,
            Duration::from_secs(900),
        );
        assert_eq!(claims.issued_at(), 1_700_000_000);
        assert_eq!(claims.expires_at(), 1_700_000_900);
        assert_eq!(claims.token_type(), TokenType::Access);
        assert!(claims.is_well_formed());
    }

    #[test]
    fn expiry_boundary_is_inclusive() {
        let claims = ClaimSet::refresh("slowfall", alice(), vec![], 100, Duration::from_secs(10));
        assert!(!claims.is_expired_at(110));
        assert!(claims.is_expired_at(111));
    }

    #[test]
    fn serializes_in_claim_order() {
        let claims = ClaimSet::access(
            "slowfall",
            alice(),
            vec!["ROLE_USER".into()],
            vec![GroupId::new("g1").unwrap()],
            10,
            Duration::from_secs(900),
        );
        let json = serde_json::to_string(&claims).unwrap();
        assert_eq!(
            json,
            r#"{"iss":"slowfall","iat":10,"exp":910,"sub":"alice","type":"access","roles":["ROLE_USER"],"groups":["g1"]}"#
        );
    }

    #[test]
    fn refresh_claims_omit_roles() {
        let claims = ClaimSet::refresh(
            "slowfall",
            alice(),
            vec![GroupId::new("g1").unwrap()],
            10,
            Duration::from_secs(60),
        );
        let json = serde_json::to_string(&claims).unwrap();
        assert!(!json.contains("roles"));
        assert!(json.contains(r#""type":"refresh""#));
    }

    #[test]
    fn unknown_type_is_rejected() {
        let json = r#"{"iss":"slowfall","iat":1,"exp":2,"sub":"alice","type":"id"}"#;
        assert!(serde_json::from_str::<ClaimSet>(json).is_err());
    }

    #[test]
    fn authorities_derive_from_groups_and_roles() {
        let claims = ClaimSet::access(
            "slowfall",
            alice(),
            vec!["USER".into(), "ROLE_ADMIN".into()],
            vec![GroupId::new("g1").unwrap()],
            0,
            Duration::from_secs(1),
        );
        let authorities: Vec<String> = claims
            .authorities()
            .iter()
            .map(|a| a.as_str().to_string())
            .collect();
        assert_eq!(authorities, vec!["GROUP_g1", "ROLE_USER", "ROLE_ADMIN"]);
    }

    #[test]
    fn header_serializes_alg_typ_kid() {
        let json = serde_json::to_string(&TokenHeader::rs256("k1")).unwrap();
        assert_eq!(json, r#"{"alg":"RS256","typ":"JWT","kid":"k1"}"#);
    }

    #[test]
    fn issued_token_debug_hides_token() {
        let issued = IssuedToken {
            token: "header.payload.signature".into(),
            expires_at: Utc::now(),
        };
        let debug = format!("{issued:?}");
        assert!(!debug.contains("payload"));
    }
}
