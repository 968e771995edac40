//! Authentication Error Types
//!
//! Centralized error handling for all authentication operations.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

/// Errors reported by the external store capabilities
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write
    #[error("Duplicate value for {field}")]
    Duplicate { field: String },

    /// The backing store could not complete the operation
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Authentication errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum AuthError {
    #[error("Email already registered")]
    EmailExists,

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Password hashing failed")]
    Hashing,

    #[error("CSRF token mismatch")]
    CsrfMismatch,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error")]
    Internal,
}

/// Status code used for CSRF rejections ("Page Expired")
pub fn csrf_status() -> StatusCode {
    StatusCode::from_u16(419).unwrap_or(StatusCode::FORBIDDEN)
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self {
            AuthError::EmailExists => (
                StatusCode::CONFLICT,
                "email_exists",
                "A user with this email already exists.".to_string(),
            ),
            AuthError::CsrfMismatch => (
                csrf_status(),
                "csrf_mismatch",
                "Page expired. Please refresh and try again.".to_string(),
            ),
            AuthError::Persistence(_)
            | AuthError::Hashing
            | AuthError::Config(_)
            | AuthError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "Something went wrong. Please try again.".to_string(),
            ),
        };

        (
            status,
            Json(serde_json::json!({
                "error": error_code,
                "message": message
            })),
        )
            .into_response()
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate { field } if field == "email" => AuthError::EmailExists,
            StoreError::Duplicate { field } => {
                AuthError::Persistence(format!("unexpected duplicate on {field}"))
            }
            StoreError::Unavailable(message) => AuthError::Persistence(message),
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            // 23505 = unique_violation
            if db_err.code().as_deref() == Some("23505") {
                let field = match db_err.constraint() {
                    Some(c) if c.contains("email") => "email",
                    Some(c) => c,
                    None => "unknown",
                };
                return StoreError::Duplicate {
                    field: field.to_string(),
                };
            }
        }

        tracing::error!("Database error: {:?}", err);
        StoreError::Unavailable(err.to_string())
    }
}

impl From<argon2::password_hash::Error> for AuthError {
    fn from(err: argon2::password_hash::Error) -> Self {
        tracing::error!("Password hashing error: {:?}", err);
        AuthError::Hashing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_email_maps_to_email_exists() {
        let err: AuthError = StoreError::Duplicate {
            field: "email".to_string(),
        }
        .into();
        assert!(matches!(err, AuthError::EmailExists));
    }

    #[test]
    fn test_unavailable_maps_to_persistence() {
        let err: AuthError = StoreError::Unavailable("connection refused".to_string()).into();
        assert!(matches!(err, AuthError::Persistence(_)));
    }

    #[tokio::test]
    async fn test_internal_text_not_leaked() {
        let response = AuthError::Persistence("password=hunter2 host=db".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(!text.contains("hunter2"));
        assert!(text.contains("Please try again"));
    }

    #[test]
    fn test_csrf_status_is_page_expired() {
        assert_eq!(csrf_status().as_u16(), 419);
    }
}
