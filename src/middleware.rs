//! Authentication Middleware
//!
//! Identity resolution, CSRF verification and the Auth/Guest guards.
//! Layer order matters: `load_identity` must run before everything else
//! here, since the others read the [`RequestIdentity`] it stores in the
//! request extensions.

use crate::error::AuthError;
use crate::extractors::{is_json, parse_body, read_cookie, session_cookie};
use crate::AuthState;
use crate::session::RequestIdentity;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header::SET_COOKIE, HeaderMap, Method},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Deserialize;

/// Upper bound on a body buffered for token extraction
const MAX_FORM_BYTES: usize = 1024 * 1024;

/// Headers that may carry the CSRF token, checked in order
const TOKEN_HEADERS: [&str; 2] = ["x-csrf-token", "x-xsrf-token"];

/// Resolve the session cookie into a [`RequestIdentity`].
///
/// A browser without a usable cookie gets a fresh anonymous key, set on
/// the response unless the handler already set a cookie of its own.
pub async fn load_identity(
    State(state): State<AuthState>,
    mut req: Request,
    next: Next,
) -> Response {
    let cookie = read_cookie(req.headers(), &state.config.session_cookie_name);
    let resolved = state.authenticator.resolve(cookie.as_deref()).await;
    let minted = resolved.minted.then(|| resolved.identity.clone());

    req.extensions_mut().insert(resolved);
    let mut response = next.run(req).await;

    if let Some(identity) = minted {
        if !response.headers().contains_key(SET_COOKIE) {
            match session_cookie(&state.config, &identity, None) {
                Ok(cookie) => {
                    response.headers_mut().insert(SET_COOKIE, cookie);
                }
                Err(e) => tracing::error!(error = %e, "Failed to build identity cookie"),
            }
        }
    }

    response
}

#[derive(Deserialize)]
struct TokenField {
    #[serde(rename = "_token")]
    token: Option<String>,
}

/// Verify the CSRF token of state-changing requests.
///
/// Excluded paths pass untouched. Safe methods pass and make sure a token
/// is bound to the identity so pages can embed it. Everything else must
/// present the bound token in a header or the `_token` body field.
pub async fn verify_csrf(
    State(state): State<AuthState>,
    req: Request,
    next: Next,
) -> Result<Response, Response> {
    if state.csrf.is_excluded(req.uri().path()) {
        return Ok(next.run(req).await);
    }

    let current = req
        .extensions()
        .get::<RequestIdentity>()
        .cloned()
        .ok_or_else(|| {
            tracing::error!("Request identity missing; is the identity middleware installed?");
            AuthError::Internal.into_response()
        })?;

    if is_safe(req.method()) {
        if let Err(e) = state.csrf.issue_or_get_token(&current.identity).await {
            tracing::error!(error = %e, "Failed to issue CSRF token");
        }
        return Ok(next.run(req).await);
    }

    let (parts, body) = req.into_parts();
    let bytes = axum::body::to_bytes(body, MAX_FORM_BYTES).await.map_err(|e| {
        tracing::debug!(error = %e, "Unreadable body on CSRF-protected request");
        AuthError::CsrfMismatch.into_response()
    })?;

    let presented = header_token(&parts.headers).or_else(|| {
        parse_body::<TokenField>(is_json(&parts.headers), &bytes).and_then(|f| f.token)
    });

    let valid = match presented {
        Some(token) => state.csrf.validate(&current.identity, &token).await,
        None => false,
    };

    if !valid {
        tracing::warn!(
            method = %parts.method,
            path = %parts.uri.path(),
            "CSRF token mismatch"
        );
        return Err(AuthError::CsrfMismatch.into_response());
    }

    Ok(next.run(Request::from_parts(parts, Body::from(bytes))).await)
}

/// Require authenticated user
///
/// Anonymous requests are redirected to the login page.
pub async fn require_auth(
    State(state): State<AuthState>,
    req: Request,
    next: Next,
) -> Result<Response, Response> {
    if !is_authenticated(&req) {
        return Err(state.view.redirect("/login"));
    }

    Ok(next.run(req).await)
}

/// Require anonymous user
///
/// Authenticated requests are redirected to the dashboard.
pub async fn require_guest(
    State(state): State<AuthState>,
    req: Request,
    next: Next,
) -> Result<Response, Response> {
    if is_authenticated(&req) {
        return Err(state.view.redirect("/dashboard"));
    }

    Ok(next.run(req).await)
}

fn is_authenticated(req: &Request) -> bool {
    req.extensions()
        .get::<RequestIdentity>()
        .is_some_and(RequestIdentity::is_authenticated)
}

fn is_safe(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

fn header_token(headers: &HeaderMap) -> Option<String> {
    TOKEN_HEADERS.iter().find_map(|name| {
        headers
            .get(*name)
            .and_then(|h| h.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(String::from)
    })
}
