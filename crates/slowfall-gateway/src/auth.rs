//! Authentication middleware and extractors.
//!
//! [`authenticate`] runs once per request, after CORS:
//!
//! 1. the development bypass gate classifies the request and may strip an
//!    expired identity or inject a synthetic one;
//! 2. a bearer token, if present and nothing is attached, is verified into an
//!    [`Identity`];
//! 3. the authorization policy permits the request or rejects it with 401/403.
//!
//! Handlers read the result through the [`AuthUser`] extractor.

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use chrono::Utc;

use slowfall_auth::{Decision, Identity, TokenType};
use slowfall_core::redact::fingerprint;

use crate::bypass::{authorization_present, bearer_token, BypassState};
use crate::error::ApiError;
use crate::state::GatewayState;

/// Authenticate and authorize a request.
pub async fn authenticate(
    State(state): State<Arc<GatewayState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_owned();
    let now = Utc::now();
    let bearer = bearer_token(request.headers()).map(str::to_owned);

    let bypass = state.bypass.evaluate(
        &path,
        authorization_present(request.headers()),
        request.extensions().get::<Identity>(),
        now,
    );

    let _scope = match bypass {
        BypassState::ExpiredAuthPresent => {
            if let Some(stale) = request.extensions_mut().remove::<Identity>() {
                tracing::debug!(
                    subject = %stale.subject().masked(),
                    path = %path,
                    "Stripped expired identity"
                );
            }
            None
        }
        BypassState::BypassInjected => {
            let identity = state.bypass.synthetic_identity(request.headers(), now);
            tracing::debug!(
                subject = %identity.subject().masked(),
                path = %path,
                "Dev bypass identity injected"
            );
            request.extensions_mut().insert(identity);
            Some(state.bypass.enter())
        }
        BypassState::RealAuthPresent | BypassState::NoAuth => None,
    };

    if bypass == BypassState::NoAuth {
        if let Some(token) = bearer.as_deref() {
            match state.verifier.verify(token, TokenType::Access) {
                Ok(claims) => {
                    request.extensions_mut().insert(Identity::from_claims(&claims));
                }
                Err(e) => {
                    tracing::debug!(
                        token = %fingerprint(token),
                        path = %path,
                        error = %e,
                        "Bearer token rejected"
                    );
                }
            }
        }
    }

    match state
        .policy
        .decide(&path, request.extensions().get::<Identity>(), now)
    {
        Decision::Permit => next.run(request).await,
        Decision::Unauthenticated => ApiError::Unauthorized.into_response(),
        Decision::Forbidden => ApiError::Forbidden.into_response(),
    }
}

/// The authenticated identity of the current request.
///
/// Rejects with 401 if the middleware attached nothing, which only happens
/// on public paths.
#[derive(Debug, Clone)]
pub struct AuthUser(pub Identity);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Identity>()
            .cloned()
            .map(AuthUser)
            .ok_or(ApiError::Unauthorized)
    }
}
