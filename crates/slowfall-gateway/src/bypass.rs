//! Development authentication bypass.
//!
//! In development mode, requests under the bypass prefix that carry no
//! credential of any kind get a synthetic identity. The gate never overrides
//! a real credential and never replaces one that is present but expired.
//! Any non-empty `Authorization` header counts as a credential, whatever its
//! scheme or shape.
//!
//! ```text
//!   outside dev                       ──────▶ NoAuth / RealAuthPresent (inert)
//!   attached identity expired?        ──yes─▶ ExpiredAuthPresent (strip, no bypass)
//!            │ no
//!   attached identity?                ──yes─▶ RealAuthPresent
//!            │ no
//!   prefix && no Authorization header ──yes─▶ BypassInjected
//!            │ no
//!            ▼
//!          NoAuth
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::http::HeaderMap;
use chrono::{DateTime, Utc};

use slowfall_auth::{Identity, DEFAULT_ACCESS_TOKEN_TTL};
use slowfall_core::{GroupId, Subject};

/// Default path prefix eligible for the bypass.
pub const DEFAULT_BYPASS_PREFIX: &str = "/api/dev/";

/// Header naming the synthetic subject.
pub const DEV_USER_HEADER: &str = "x-dev-user";

/// Subject used when no `X-Dev-User` header is sent.
pub const DEFAULT_DEV_SUBJECT: &str = "dev";

/// Outcome of evaluating the gate for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BypassState {
    /// Nothing attached and no bypass applies.
    NoAuth,
    /// A live identity is already attached.
    RealAuthPresent,
    /// An attached identity had expired and was stripped.
    ExpiredAuthPresent,
    /// A synthetic identity is injected for this request.
    BypassInjected,
}

/// Decides per request whether to inject a development identity.
#[derive(Debug)]
pub struct DevBypassGate {
    dev_mode: bool,
    prefix: String,
    group: GroupId,
    default_subject: Subject,
    active: Arc<AtomicUsize>,
}

impl DevBypassGate {
    /// Create a gate. Outside development it never injects.
    ///
    /// # Errors
    ///
    /// Returns an error if the default subject is not a valid identifier.
    pub fn new(
        dev_mode: bool,
        prefix: impl Into<String>,
        group: GroupId,
    ) -> slowfall_core::Result<Self> {
        Ok(Self {
            dev_mode,
            prefix: prefix.into(),
            group,
            default_subject: Subject::new(DEFAULT_DEV_SUBJECT)?,
            active: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Returns `true` if the gate can inject identities.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.dev_mode
    }

    /// The bypass-eligible path prefix.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Classify a request. Pure: the caller applies the outcome.
    ///
    /// Outside development nothing is stripped or injected; an expired
    /// identity is left for the authorization policy to reject.
    #[must_use]
    pub fn evaluate(
        &self,
        path: &str,
        credential_present: bool,
        attached: Option<&Identity>,
        now: DateTime<Utc>,
    ) -> BypassState {
        match attached {
            Some(_) if !self.dev_mode => BypassState::RealAuthPresent,
            Some(identity) if identity.is_expired_at(now) => BypassState::ExpiredAuthPresent,
            Some(_) => BypassState::RealAuthPresent,
            None if self.dev_mode && !credential_present && path.starts_with(&self.prefix) => {
                BypassState::BypassInjected
            }
            None => BypassState::NoAuth,
        }
    }

    /// The identity injected for a bypassed request.
    #[must_use]
    pub fn synthetic_identity(&self, headers: &HeaderMap, now: DateTime<Utc>) -> Identity {
        let subject = headers
            .get(DEV_USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| Subject::new(v.trim()).ok())
            .unwrap_or_else(|| self.default_subject.clone());

        let ttl = chrono::Duration::from_std(DEFAULT_ACCESS_TOKEN_TTL)
            .unwrap_or_else(|_| chrono::Duration::minutes(15));
        Identity::dev_bypass(subject, &self.group, now + ttl)
    }

    /// Mark a bypassed request as in flight until the returned scope drops.
    #[must_use]
    pub fn enter(&self) -> BypassScope {
        self.active.fetch_add(1, Ordering::SeqCst);
        BypassScope {
            active: Arc::clone(&self.active),
        }
    }

    /// Number of requests currently running with a synthetic identity.
    #[must_use]
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

/// Releases a bypassed request on every exit path.
#[derive(Debug)]
pub struct BypassScope {
    active: Arc<AtomicUsize>,
}

impl Drop for BypassScope {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
        tracing::trace!("Dev bypass scope released");
    }
}

/// Extract the token from an `Authorization: Bearer` header.
///
/// The scheme is matched case-insensitively.
#[must_use]
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let (scheme, token) = headers
        .get(axum::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .trim_start()
        .split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// Returns `true` if the request carries a non-empty `Authorization` header.
#[must_use]
pub fn authorization_present(headers: &HeaderMap) -> bool {
    headers
        .get_all(axum::http::header::AUTHORIZATION)
        .iter()
        .any(|v| !v.as_bytes().iter().all(u8::is_ascii_whitespace))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use slowfall_auth::IdentityOrigin;
    use slowfall_core::Authority;

    fn gate(dev_mode: bool) -> DevBypassGate {
        DevBypassGate::new(dev_mode, DEFAULT_BYPASS_PREFIX, GroupId::new("g1").unwrap()).unwrap()
    }

    fn identity(expires_at: DateTime<Utc>) -> Identity {
        Identity::new(
            Subject::new("alice").unwrap(),
            vec![Authority::from_group(&GroupId::new("g1").unwrap())],
            expires_at,
            IdentityOrigin::Upstream,
        )
    }

    #[test]
    fn injects_only_for_bare_dev_requests() {
        let now = Utc::now();
        let gate = gate(true);
        assert_eq!(
            gate.evaluate("/api/dev/whoami", false, None, now),
            BypassState::BypassInjected
        );
        assert_eq!(
            gate.evaluate("/api/dev/whoami", true, None, now),
            BypassState::NoAuth
        );
        assert_eq!(
            gate.evaluate("/api/protected/resource", false, None, now),
            BypassState::NoAuth
        );
    }

    #[test]
    fn inert_outside_dev() {
        let now = Utc::now();
        assert_eq!(
            gate(false).evaluate("/api/dev/whoami", false, None, now),
            BypassState::NoAuth
        );
    }

    #[test]
    fn expired_identity_kept_outside_dev() {
        let now = Utc::now();
        let stale = identity(now - chrono::Duration::seconds(1));
        assert_eq!(
            gate(false).evaluate("/api/dev/whoami", false, Some(&stale), now),
            BypassState::RealAuthPresent
        );
    }

    #[test]
    fn real_identity_wins() {
        let now = Utc::now();
        let live = identity(now + chrono::Duration::minutes(5));
        assert_eq!(
            gate(true).evaluate("/api/dev/whoami", false, Some(&live), now),
            BypassState::RealAuthPresent
        );
    }

    #[test]
    fn expired_identity_suppresses_bypass() {
        let now = Utc::now();
        let stale = identity(now - chrono::Duration::seconds(1));
        assert_eq!(
            gate(true).evaluate("/api/dev/whoami", false, Some(&stale), now),
            BypassState::ExpiredAuthPresent
        );
        // Expiry is exclusive: an identity expiring right now is still live.
        let edge = identity(now);
        assert_eq!(
            gate(true).evaluate("/api/dev/whoami", false, Some(&edge), now),
            BypassState::RealAuthPresent
        );
    }

    #[test]
    fn synthetic_identity_subject() {
        let now = Utc::now();
        let gate = gate(true);

        let identity = gate.synthetic_identity(&HeaderMap::new(), now);
        assert_eq!(identity.subject().as_str(), "dev");
        assert_eq!(identity.origin(), IdentityOrigin::DevBypass);
        assert!(identity.has_authority(&Authority::from_group(&GroupId::new("g1").unwrap())));
        assert!(identity.expires_at() > now);

        let mut headers = HeaderMap::new();
        headers.insert(DEV_USER_HEADER, HeaderValue::from_static("carol"));
        assert_eq!(gate.synthetic_identity(&headers, now).subject().as_str(), "carol");
    }

    #[test]
    fn scope_counts_active_requests() {
        let gate = gate(true);
        let first = gate.enter();
        let second = gate.enter();
        assert_eq!(gate.active(), 2);
        drop(first);
        assert_eq!(gate.active(), 1);
        drop(second);
        assert_eq!(gate.active(), 0);
    }

    #[test]
    fn bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);
        headers.insert("authorization", HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);
        headers.insert("authorization", HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);
        headers.insert("authorization", HeaderValue::from_static("Bearer a.b.c"));
        assert_eq!(bearer_token(&headers), Some("a.b.c"));
        headers.insert("authorization", HeaderValue::from_static("bearer a.b.c"));
        assert_eq!(bearer_token(&headers), Some("a.b.c"));
        headers.insert("authorization", HeaderValue::from_static("BEARER  a.b.c "));
        assert_eq!(bearer_token(&headers), Some("a.b.c"));
        headers.insert("authorization", HeaderValue::from_static("Bearera.b.c"));
        assert_eq!(bearer_token(&headers), None);
    }

    #[test]
    fn any_authorization_header_counts_as_credential() {
        let mut headers = HeaderMap::new();
        assert!(!authorization_present(&headers));
        headers.insert("authorization", HeaderValue::from_static("   "));
        assert!(!authorization_present(&headers));
        for value in ["Basic abc", "bearer x", "Bearer", "garbage"] {
            headers.insert("authorization", HeaderValue::from_static(value));
            assert!(authorization_present(&headers), "{value}");
        }
    }
}
