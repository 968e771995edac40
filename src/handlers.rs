//! Authentication HTTP Handlers
//!
//! Page endpoints for login, registration, logout and the dashboard.
//! Every outcome is a rendered page or a redirect; failures become form
//! errors instead of error responses.

use crate::error::AuthError;
use crate::extractors::{session_cookie, AuthUser, CurrentIdentity, FormOrJson};
use crate::middleware;
use crate::models::*;
use crate::validation::{validate_registration, ValidationErrors};
use crate::view::Page;
use crate::AuthState;

use axum::{
    extract::State,
    http::{header::SET_COOKIE, Uri},
    middleware as axum_middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::trace::TraceLayer;

const LOGIN_PAGE: &str = "Auth/Login";
const REGISTER_PAGE: &str = "Auth/Register";
const DASHBOARD_PAGE: &str = "Dashboard";

const INVALID_CREDENTIALS: &str = "These credentials do not match our records.";
const LOGIN_UNAVAILABLE: &str = "Something went wrong. Please try again.";
const DUPLICATE_EMAIL: &str = "A user with this email already exists.";
const CREATE_FAILED: &str = "Failed to create account. Please try again.";
const HASH_FAILED: &str = "Failed to process password. Please try again.";

// ============================================
// Route Builder
// ============================================

/// Create authentication routes
pub fn create_routes(state: AuthState) -> Router {
    // Guest routes (only reachable while signed out)
    let guest = Router::new()
        .route("/login", get(show_login).post(login))
        .route("/register", get(show_register).post(register))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_guest,
        ));

    // Protected routes (require authentication)
    let protected = Router::new()
        .route("/", get(dashboard))
        .route("/dashboard", get(dashboard))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    let public = Router::new()
        .route("/health", get(health))
        .route("/logout", post(logout));

    Router::new()
        .merge(guest)
        .merge(protected)
        .merge(public)
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::verify_csrf,
        ))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::load_identity,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ============================================
// Login / Logout
// ============================================

/// GET /login
pub async fn show_login(State(state): State<AuthState>, current: CurrentIdentity) -> Response {
    render(&state, &current, Page::new(LOGIN_PAGE, "/login")).await
}

/// POST /login
///
/// Start a session and go to the dashboard, or re-render the form with a
/// single credentials error that does not say which field was wrong.
pub async fn login(
    State(state): State<AuthState>,
    current: CurrentIdentity,
    FormOrJson(input): FormOrJson<LoginInput>,
) -> Response {
    let message = match state.authenticator.attempt(current.identity(), &input).await {
        Ok(Some(session)) => return signed_in(&state, &session),
        Ok(None) => INVALID_CREDENTIALS,
        Err(e) => {
            tracing::error!(error = %e, email = %input.email, "Login failed on store error");
            LOGIN_UNAVAILABLE
        }
    };

    let page = Page::new(LOGIN_PAGE, "/login")
        .with_prop("errors", ValidationErrors::single("email", message))
        .with_prop("old", OldInput::from(&input));
    render(&state, &current, page).await
}

/// POST /logout
pub async fn logout(State(state): State<AuthState>, current: CurrentIdentity) -> Response {
    let next = match state.authenticator.logout(current.identity()).await {
        Ok(next) => next,
        Err(e) => {
            // The browser still drops the old cookie below
            tracing::error!(error = %e, "Failed to destroy session on logout");
            Identity::anonymous()
        }
    };

    let response = state.view.redirect("/login");
    with_identity_cookie(&state, response, &next, None)
}

// ============================================
// Registration
// ============================================

/// GET /register
pub async fn show_register(State(state): State<AuthState>, current: CurrentIdentity) -> Response {
    render(&state, &current, Page::new(REGISTER_PAGE, "/register")).await
}

/// POST /register
///
/// Create the account and sign it in. If the follow-up sign-in fails the
/// account still exists, so the browser is sent to the login page.
pub async fn register(
    State(state): State<AuthState>,
    current: CurrentIdentity,
    FormOrJson(input): FormOrJson<RegisterInput>,
) -> Response {
    let input = input.normalized();
    let errors = validate_registration(&input);
    if !errors.is_empty() {
        return register_failed(&state, &current, &input, errors).await;
    }

    let user = match state.authenticator.register(&input).await {
        Ok(user) => user,
        Err(e) => {
            let errors = registration_errors(e, &input);
            return register_failed(&state, &current, &input, errors).await;
        }
    };

    let credentials = LoginInput {
        email: input.email.clone(),
        password: input.password.clone(),
        remember: false,
    };

    match state.authenticator.attempt(current.identity(), &credentials).await {
        Ok(Some(session)) => signed_in(&state, &session),
        Ok(None) => {
            tracing::warn!(user_id = %user.id, "Sign-in after registration was rejected");
            state.view.redirect("/login")
        }
        Err(e) => {
            tracing::error!(error = %e, user_id = %user.id, "Sign-in after registration failed");
            state.view.redirect("/login")
        }
    }
}

fn registration_errors(err: AuthError, input: &RegisterInput) -> ValidationErrors {
    match err {
        AuthError::EmailExists => ValidationErrors::single("email", DUPLICATE_EMAIL),
        AuthError::Hashing => ValidationErrors::single("password", HASH_FAILED),
        e => {
            tracing::error!(error = %e, email = %input.email, "Failed to create user");
            ValidationErrors::single("email", CREATE_FAILED)
        }
    }
}

async fn register_failed(
    state: &AuthState,
    current: &CurrentIdentity,
    input: &RegisterInput,
    errors: ValidationErrors,
) -> Response {
    let page = Page::new(REGISTER_PAGE, "/register")
        .with_prop("errors", errors)
        .with_prop("old", OldInput::from(input));
    render(state, current, page).await
}

// ============================================
// Dashboard / Health
// ============================================

/// GET / and GET /dashboard
pub async fn dashboard(
    State(state): State<AuthState>,
    uri: Uri,
    current: CurrentIdentity,
    AuthUser(user): AuthUser,
) -> Response {
    let page = Page::new(DASHBOARD_PAGE, uri.path()).with_prop(
        "auth",
        serde_json::json!({ "user": UserResponse::from(&user) }),
    );
    render(&state, &current, page).await
}

/// GET /health
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "healthy" }))
}

// ============================================
// Helpers
// ============================================

async fn render(state: &AuthState, current: &CurrentIdentity, page: Page) -> Response {
    let shared = state.csrf.shared_props(current.identity()).await;
    state.view.render(page.with_shared(shared))
}

fn signed_in(state: &AuthState, session: &Session) -> Response {
    let identity = Identity::Session(session.id.clone());
    let response = state.view.redirect("/dashboard");
    with_identity_cookie(state, response, &identity, Some(session.remaining_secs()))
}

fn with_identity_cookie(
    state: &AuthState,
    mut response: Response,
    identity: &Identity,
    max_age: Option<i64>,
) -> Response {
    match session_cookie(&state.config, identity, max_age) {
        Ok(cookie) => {
            response.headers_mut().insert(SET_COOKIE, cookie);
        }
        Err(e) => tracing::error!(error = %e, "Failed to build session cookie"),
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AuthConfig, MemoryUserStore};
    use axum::{body::Body, extract::Request, http::StatusCode};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app() -> Router {
        let state = AuthState::new(AuthConfig::default(), Arc::new(MemoryUserStore::new())).unwrap();
        create_routes(state)
    }

    #[tokio::test]
    async fn test_anonymous_dashboard_redirects_and_sets_identity() {
        let request = Request::builder()
            .uri("/dashboard")
            .body(Body::empty())
            .unwrap();
        let response = app().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()["location"], "/login");
        let cookie = response.headers()[SET_COOKIE].to_str().unwrap();
        assert!(cookie.starts_with("rustpress_session="));
        assert!(cookie.contains("HttpOnly"));
    }

    #[tokio::test]
    async fn test_show_login_shares_csrf_token() {
        let request = Request::builder().uri("/login").body(Body::empty()).unwrap();
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let page: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(page["component"], LOGIN_PAGE);
        assert_eq!(page["props"]["csrf_token"].as_str().map(str::len), Some(43));
    }

    fn input() -> RegisterInput {
        RegisterInput {
            name: "Ann".into(),
            email: "ann@x.com".into(),
            password: "secret123".into(),
            password_confirmation: "secret123".into(),
        }
    }

    #[test]
    fn test_registration_error_mapping() {
        let errors = registration_errors(AuthError::EmailExists, &input());
        assert_eq!(errors.get("email"), Some(DUPLICATE_EMAIL));

        let errors = registration_errors(AuthError::Hashing, &input());
        assert_eq!(errors.get("password"), Some(HASH_FAILED));

        let errors = registration_errors(
            AuthError::Persistence("connection reset by peer".into()),
            &input(),
        );
        assert_eq!(errors.get("email"), Some(CREATE_FAILED));
        assert_eq!(errors.len(), 1);
    }
}
