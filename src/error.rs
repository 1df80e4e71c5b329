//! Application error type and its HTTP representation.
//!
//! Every layer returns [`AppError`]. Handlers convert it into a JSON body of the form:
//!
//! ```json
//! { "error": { "code": "not_found", "message": "Short code not found", "details": { "code": "zzzzzzz" } } }
//! ```

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::{Value, json};
use std::fmt;
use std::time::Duration;

use crate::utils::db_error::unique_violation_key;

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorInfo,
}

/// Serializable error payload.
#[derive(Debug, Serialize)]
pub struct ErrorInfo {
    pub code: &'static str,
    pub message: String,
    pub details: Value,
}

/// Unique key of a mapping that an insert collided on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueKey {
    Code,
    LongUrl,
}

impl fmt::Display for UniqueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Code => f.write_str("code"),
            Self::LongUrl => f.write_str("long_url"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{message}")]
    InvalidInput { message: String, details: Value },

    #[error("{message}")]
    NotFound { message: String, details: Value },

    /// Insert raced with another insert on the same unique key.
    ///
    /// Recovered inside the mapping service; only reaches callers that talk to
    /// a repository directly.
    #[error("Unique constraint violation on {key}")]
    UniquenessViolation { key: UniqueKey, details: Value },

    #[error("{message}")]
    Storage { message: String, details: Value },

    #[error("Store operation '{operation}' timed out after {}ms", .after.as_millis())]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("No free short code after {attempts} attempts")]
    Exhausted { attempts: u32 },
}

impl AppError {
    pub fn invalid_input(message: impl Into<String>, details: Value) -> Self {
        Self::InvalidInput {
            message: message.into(),
            details,
        }
    }
    pub fn not_found(message: impl Into<String>, details: Value) -> Self {
        Self::NotFound {
            message: message.into(),
            details,
        }
    }
    pub fn uniqueness_violation(key: UniqueKey, details: Value) -> Self {
        Self::UniquenessViolation { key, details }
    }
    pub fn storage(message: impl Into<String>, details: Value) -> Self {
        Self::Storage {
            message: message.into(),
            details,
        }
    }
    pub fn timeout(operation: &'static str, after: Duration) -> Self {
        Self::Timeout { operation, after }
    }

    /// Returns the unique key this error collided on, if it is a uniqueness violation.
    pub fn violated_key(&self) -> Option<UniqueKey> {
        match self {
            Self::UniquenessViolation { key, .. } => Some(*key),
            _ => None,
        }
    }

    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::InvalidInput { .. } => (StatusCode::BAD_REQUEST, "invalid_input"),
            Self::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
            Self::UniquenessViolation { .. } => (StatusCode::CONFLICT, "conflict"),
            Self::Storage { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "storage_error"),
            Self::Timeout { .. } => (StatusCode::SERVICE_UNAVAILABLE, "timeout"),
            Self::Exhausted { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "exhausted"),
        }
    }

    /// Builds the serializable payload for this error.
    ///
    /// Storage details are not exposed to clients; they are logged where the error occurs.
    pub fn to_error_info(&self) -> ErrorInfo {
        let (_, code) = self.status_and_code();
        let details = match self {
            Self::InvalidInput { details, .. } | Self::NotFound { details, .. } => details.clone(),
            Self::UniquenessViolation { key, .. } => json!({ "key": key.to_string() }),
            Self::Timeout { operation, after } => {
                json!({ "operation": operation, "timeout_ms": after.as_millis() as u64 })
            }
            Self::Exhausted { attempts } => json!({ "attempts": attempts }),
            Self::Storage { .. } => json!({}),
        };

        ErrorInfo {
            code,
            message: self.to_string(),
            details,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, _) = self.status_and_code();
        let body = ErrorBody {
            error: self.to_error_info(),
        };

        (status, Json(body)).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        map_sqlx_error(e)
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let field_errors = errors.field_errors();
        let mut fields: Vec<&str> = field_errors.keys().map(|k| k.as_ref()).collect();
        fields.sort_unstable();
        AppError::invalid_input("Request validation failed", json!({ "fields": fields }))
    }
}

pub fn map_sqlx_error(e: sqlx::Error) -> AppError {
    if let Some(key) = unique_violation_key(&e) {
        return AppError::uniqueness_violation(key, json!({}));
    }

    tracing::error!(error = %e, "Database error");
    AppError::storage("Database error", json!({ "reason": e.to_string() }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let cases = [
            (AppError::invalid_input("bad", json!({})), StatusCode::BAD_REQUEST),
            (AppError::not_found("missing", json!({})), StatusCode::NOT_FOUND),
            (
                AppError::uniqueness_violation(UniqueKey::Code, json!({})),
                StatusCode::CONFLICT,
            ),
            (
                AppError::storage("down", json!({})),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                AppError::timeout("find_by_code", Duration::from_millis(5)),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                AppError::Exhausted { attempts: 3 },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }

    #[test]
    fn test_storage_details_are_hidden() {
        let err = AppError::storage("Database error", json!({ "reason": "password leaked" }));
        let info = err.to_error_info();

        assert_eq!(info.code, "storage_error");
        assert_eq!(info.details, json!({}));
    }

    #[test]
    fn test_timeout_message() {
        let err = AppError::timeout("insert", Duration::from_millis(250));
        assert_eq!(err.to_string(), "Store operation 'insert' timed out after 250ms");
        assert_eq!(err.to_error_info().details["timeout_ms"], 250);
    }

    #[test]
    fn test_validation_errors_become_invalid_input() {
        use validator::Validate;

        #[derive(Validate)]
        struct Payload {
            #[validate(length(min = 1))]
            url: String,
            #[validate(range(min = 1))]
            limit: i64,
        }

        let errors = Payload {
            url: String::new(),
            limit: 0,
        }
        .validate()
        .unwrap_err();
        let err = AppError::from(errors);

        assert!(matches!(err, AppError::InvalidInput { .. }));
        assert_eq!(err.to_error_info().details, json!({ "fields": ["limit", "url"] }));
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_violated_key() {
        let err = AppError::uniqueness_violation(UniqueKey::LongUrl, json!({}));
        assert_eq!(err.violated_key(), Some(UniqueKey::LongUrl));
        assert_eq!(AppError::not_found("x", json!({})).violated_key(), None);
    }
}
