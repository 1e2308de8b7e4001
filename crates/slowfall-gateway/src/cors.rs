//! Cross-origin request negotiation.

use std::sync::Arc;
use std::time::Duration;

use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::request::Parts;
use axum::http::{HeaderValue, Method};
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};

/// Origins allowed when none are configured.
pub const DEV_ORIGINS: &[&str] = &[
    "http://localhost:5173",
    "http://localhost:5174",
    "http://localhost:3000",
];

/// How long browsers may cache a preflight response.
pub const PREFLIGHT_MAX_AGE: Duration = Duration::from_secs(3600);

/// A `scheme://*.domain` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SubdomainPattern {
    scheme: String,
    suffix: String,
}

impl SubdomainPattern {
    fn parse(entry: &str) -> Option<Self> {
        let (scheme, host) = entry.split_once("://")?;
        let domain = host.strip_prefix("*.")?;
        if domain.is_empty() || domain.contains('*') {
            return None;
        }
        Some(Self {
            scheme: scheme.to_ascii_lowercase(),
            suffix: format!(".{}", domain.to_ascii_lowercase()),
        })
    }

    fn matches(&self, origin: &str) -> bool {
        let Some((scheme, host)) = origin.split_once("://") else {
            return false;
        };
        let Some(label) = host.strip_suffix(self.suffix.as_str()) else {
            return false;
        };
        scheme == self.scheme && !label.is_empty() && !label.contains('/')
    }
}

/// Evaluates request origins against the configured allow-list.
#[derive(Debug, Clone)]
pub struct CorsNegotiator {
    exact: Vec<String>,
    patterns: Vec<SubdomainPattern>,
}

impl CorsNegotiator {
    /// Build from configured entries. An empty list allows [`DEV_ORIGINS`].
    #[must_use]
    pub fn new(origins: &[String]) -> Self {
        let mut exact = Vec::new();
        let mut patterns = Vec::new();

        let entries: Vec<String> = if origins.is_empty() {
            DEV_ORIGINS.iter().map(|o| (*o).to_string()).collect()
        } else {
            origins.to_vec()
        };

        for entry in entries {
            let entry = entry.trim().trim_end_matches('/').to_ascii_lowercase();
            if entry == "*" {
                tracing::warn!("Ignoring wildcard CORS origin; list origins explicitly");
            } else if entry.contains('*') {
                match SubdomainPattern::parse(&entry) {
                    Some(pattern) => patterns.push(pattern),
                    None => tracing::warn!(origin = %entry, "Ignoring unsupported CORS pattern"),
                }
            } else if !entry.is_empty() {
                exact.push(entry);
            }
        }

        tracing::debug!(exact = exact.len(), patterns = patterns.len(), "CORS allow-list loaded");
        Self { exact, patterns }
    }

    /// Returns `true` if credentialed requests from `origin` are allowed.
    #[must_use]
    pub fn is_origin_allowed(&self, origin: &str) -> bool {
        let origin = origin.to_ascii_lowercase();
        self.exact.iter().any(|o| *o == origin) || self.patterns.iter().any(|p| p.matches(&origin))
    }

    /// The tower-http layer enforcing this negotiator.
    #[must_use]
    pub fn layer(self: &Arc<Self>) -> CorsLayer {
        let negotiator = Arc::clone(self);
        let allow_origin = AllowOrigin::predicate(move |origin: &HeaderValue, _parts: &Parts| {
            let allowed = origin
                .to_str()
                .is_ok_and(|o| negotiator.is_origin_allowed(o));
            if !allowed {
                tracing::debug!(origin = ?origin, "CORS origin rejected");
            }
            allowed
        });

        CorsLayer::new()
            .allow_origin(allow_origin)
            .allow_credentials(true)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::PATCH,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers(AllowHeaders::mirror_request())
            .expose_headers([AUTHORIZATION, CONTENT_TYPE])
            .max_age(PREFLIGHT_MAX_AGE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn negotiator(origins: &[&str]) -> CorsNegotiator {
        let origins: Vec<String> = origins.iter().map(|o| (*o).to_string()).collect();
        CorsNegotiator::new(&origins)
    }

    #[test]
    fn empty_list_allows_dev_origins() {
        let cors = negotiator(&[]);
        for origin in DEV_ORIGINS {
            assert!(cors.is_origin_allowed(origin), "{origin}");
        }
        assert!(!cors.is_origin_allowed("https://evil.example.com"));
    }

    #[test]
    fn exact_origins() {
        let cors = negotiator(&["https://app.example.com/", "http://localhost:8080"]);
        assert!(cors.is_origin_allowed("https://app.example.com"));
        assert!(cors.is_origin_allowed("HTTPS://APP.EXAMPLE.COM"));
        assert!(cors.is_origin_allowed("http://localhost:8080"));
        assert!(!cors.is_origin_allowed("http://app.example.com"));
        assert!(!cors.is_origin_allowed("http://localhost:5173"));
    }

    #[test]
    fn subdomain_patterns() {
        let cors = negotiator(&["https://*.example.com"]);
        assert!(cors.is_origin_allowed("https://app.example.com"));
        assert!(cors.is_origin_allowed("https://a.b.example.com"));
        assert!(!cors.is_origin_allowed("https://example.com"));
        assert!(!cors.is_origin_allowed("http://app.example.com"));
        assert!(!cors.is_origin_allowed("https://app.example.com.evil.io"));
        assert!(!cors.is_origin_allowed("https://evilexample.com"));
    }

    #[test]
    fn bare_wildcard_is_ignored() {
        let cors = negotiator(&["*"]);
        assert!(!cors.is_origin_allowed("https://anything.example.com"));
        // A configured list, even an unusable one, replaces the dev defaults.
        assert!(!cors.is_origin_allowed("http://localhost:5173"));
    }
}
