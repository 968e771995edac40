//! Authentication Extractors
//!
//! Axum extractors for the request identity and form input, plus the
//! session cookie helpers shared by the middleware and handlers.

use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::models::{Identity, User};
use crate::session::RequestIdentity;

use axum::{
    async_trait,
    body::Bytes,
    extract::{FromRequest, FromRequestParts, Request},
    http::{
        header::{self, InvalidHeaderValue},
        request::Parts,
        HeaderMap, HeaderValue,
    },
    response::{IntoResponse, Redirect, Response},
};
use serde::de::DeserializeOwned;
use std::convert::Infallible;

// ============================================
// Cookies
// ============================================

/// Read a cookie value from the `Cookie` request header
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let header = headers.get(header::COOKIE)?.to_str().ok()?;

    header.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key.trim() == name).then(|| value.trim().to_string())
    })
}

/// Build the `Set-Cookie` value carrying `identity`.
///
/// Authenticated identities get a `Max-Age` matching the session; anonymous
/// keys live for the browser session only.
pub fn session_cookie(
    config: &AuthConfig,
    identity: &Identity,
    max_age: Option<i64>,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite={}",
        config.session_cookie_name,
        identity.cookie_value(),
        config.cookie_same_site.as_str()
    );
    if let Some(max_age) = max_age {
        cookie.push_str(&format!("; Max-Age={max_age}"));
    }
    if config.cookie_secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

// ============================================
// Identity
// ============================================

/// The identity resolved for this request by the identity middleware
#[derive(Debug, Clone)]
pub struct CurrentIdentity(pub RequestIdentity);

impl CurrentIdentity {
    pub fn identity(&self) -> &Identity {
        &self.0.identity
    }

    pub fn user(&self) -> Option<&User> {
        self.0.user.as_ref()
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for CurrentIdentity
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestIdentity>()
            .cloned()
            .map(CurrentIdentity)
            .ok_or_else(|| {
                tracing::error!("Request identity missing; is the identity middleware installed?");
                AuthError::Internal
            })
    }
}

/// Authenticated user; anonymous requests are sent to the login page
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let current = CurrentIdentity::from_request_parts(parts, state)
            .await
            .map_err(IntoResponse::into_response)?;

        match current.0.user {
            Some(user) => Ok(AuthUser(user)),
            None => Err(Redirect::to("/login").into_response()),
        }
    }
}

// ============================================
// Form Input
// ============================================

/// Form input read from a JSON or urlencoded body.
///
/// Never rejects: a missing or unparsable body yields `T::default()`, so
/// handlers report field errors instead of a bare 4xx.
#[derive(Debug, Clone, Default)]
pub struct FormOrJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for FormOrJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Default,
{
    type Rejection = Infallible;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_json = is_json(req.headers());

        let input = match Bytes::from_request(req, state).await {
            Ok(body) => parse_body(is_json, &body).unwrap_or_default(),
            Err(e) => {
                tracing::debug!(error = %e, "Failed to read form body");
                T::default()
            }
        };

        Ok(FormOrJson(input))
    }
}

pub(crate) fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|h| h.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"))
}

pub(crate) fn parse_body<T: DeserializeOwned>(is_json: bool, body: &[u8]) -> Option<T> {
    let parsed = if is_json {
        serde_json::from_slice(body).map_err(|e| e.to_string())
    } else {
        serde_urlencoded::from_bytes(body).map_err(|e| e.to_string())
    };

    match parsed {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::debug!(error = %e, "Ignoring unparsable form body");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SameSite;
    use crate::models::{LoginInput, SessionId};
    use axum::body::Body;

    #[test]
    fn test_read_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; rustpress_session=abc123 ; other=1"),
        );

        assert_eq!(
            read_cookie(&headers, "rustpress_session").as_deref(),
            Some("abc123")
        );
        assert_eq!(read_cookie(&headers, "theme").as_deref(), Some("dark"));
        assert!(read_cookie(&headers, "missing").is_none());
        assert!(read_cookie(&HeaderMap::new(), "rustpress_session").is_none());
    }

    #[test]
    fn test_session_cookie_attributes() {
        let config = AuthConfig::default();
        let identity = Identity::Session(SessionId::new("sid"));

        let cookie = session_cookie(&config, &identity, Some(7200)).unwrap();
        assert_eq!(
            cookie.to_str().unwrap(),
            "rustpress_session=sid; Path=/; HttpOnly; SameSite=Lax; Max-Age=7200"
        );

        let config = AuthConfig {
            cookie_secure: true,
            cookie_same_site: SameSite::Strict,
            ..AuthConfig::default()
        };
        let anonymous = Identity::Anonymous("key".to_string());
        let cookie = session_cookie(&config, &anonymous, None).unwrap();
        assert_eq!(
            cookie.to_str().unwrap(),
            "rustpress_session=key; Path=/; HttpOnly; SameSite=Strict; Secure"
        );
    }

    #[tokio::test]
    async fn test_form_or_json_reads_both_encodings() {
        let form = Request::builder()
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("email=ann%40x.com&password=secret123&remember=on"))
            .unwrap();
        let FormOrJson(input) = FormOrJson::<LoginInput>::from_request(form, &())
            .await
            .unwrap();
        assert_eq!(input.email, "ann@x.com");
        assert!(input.remember);

        let json = Request::builder()
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"email":"ann@x.com","password":"secret123"}"#))
            .unwrap();
        let FormOrJson(input) = FormOrJson::<LoginInput>::from_request(json, &())
            .await
            .unwrap();
        assert_eq!(input.password, "secret123");
        assert!(!input.remember);
    }

    #[tokio::test]
    async fn test_form_or_json_defaults_on_garbage() {
        let request = Request::builder()
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let FormOrJson(input) = FormOrJson::<LoginInput>::from_request(request, &())
            .await
            .unwrap();
        assert!(input.email.is_empty());
        assert!(input.password.is_empty());
    }
}
