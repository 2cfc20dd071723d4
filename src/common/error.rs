//! Core Error Taxonomy
//!
//! Unified error handling across the CAS core. Every operation returns
//! either a value or a `CoreError` whose `code()` is a stable string and
//! whose variants group into: Validation, NotFound, Conflict,
//! TypeMismatch, Authorization, Internal.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use crate::codec::NodeKey;

/// Root error type for the CAS core.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Bad input shape.
    #[error("validation error: {code}: {message}")]
    Validation { code: &'static str, message: String },

    /// Target absent.
    #[error("not found: {code}: {message}")]
    NotFound { code: &'static str, message: String },

    /// Concurrency or existence conflict.
    #[error("conflict: {code}: {message}")]
    Conflict {
        code: &'static str,
        message: String,
        details: Option<ConflictDetails>,
    },

    /// Kind mismatch on navigation.
    #[error("type mismatch: {code}: {message}")]
    TypeMismatch { code: &'static str, message: String },

    /// Authorization failure.
    #[error("authorization error: {code}: {message}")]
    Authorization { code: &'static str, message: String },

    /// Propagated from a collaborator (node store / metadata store) when
    /// not retriable.
    #[error("internal error: {0}")]
    Internal(String),

    /// Configuration errors.
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Logging errors.
    #[error("logging error: {0}")]
    Logging(#[from] crate::logging::LoggingError),
}

/// Structured details carried by a `Conflict` error.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(untagged)]
pub enum ConflictDetails {
    DepotConflict {
        current: Option<NodeKey>,
        expected: Option<NodeKey>,
    },
    Path {
        path: String,
    },
}

impl CoreError {
    pub fn validation(code: &'static str, message: impl Into<String>) -> Self {
        Self::Validation { code, message: message.into() }
    }

    pub fn not_found(code: &'static str, message: impl Into<String>) -> Self {
        Self::NotFound { code, message: message.into() }
    }

    pub fn conflict(code: &'static str, message: impl Into<String>) -> Self {
        Self::Conflict { code, message: message.into(), details: None }
    }

    pub fn depot_conflict(current: Option<NodeKey>, expected: Option<NodeKey>) -> Self {
        Self::Conflict {
            code: "DEPOT_CONFLICT",
            message: "depot root changed since expectedRoot was read".to_string(),
            details: Some(ConflictDetails::DepotConflict { current, expected }),
        }
    }

    pub fn path_error(code: &'static str, path: impl Into<String>) -> Self {
        let path = path.into();
        Self::Validation {
            code,
            message: format!("path error at '{path}'"),
        }
    }

    pub fn type_mismatch(code: &'static str, message: impl Into<String>) -> Self {
        Self::TypeMismatch { code, message: message.into() }
    }

    pub fn authorization(code: &'static str, message: impl Into<String>) -> Self {
        Self::Authorization { code, message: message.into() }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Stable code string for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::Validation { code, .. } => code,
            CoreError::NotFound { code, .. } => code,
            CoreError::Conflict { code, .. } => code,
            CoreError::TypeMismatch { code, .. } => code,
            CoreError::Authorization { code, .. } => code,
            CoreError::Internal(_) => "INTERNAL_ERROR",
            CoreError::Config(_) => "CONFIG_ERROR",
            CoreError::Logging(_) => "LOGGING_ERROR",
        }
    }

    /// Whether a collaborator error of this shape is safe to retry once.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::Internal(_))
    }

    pub fn http_status(&self) -> StatusCode {
        match self {
            CoreError::Validation { .. } => StatusCode::BAD_REQUEST,
            CoreError::NotFound { .. } => StatusCode::NOT_FOUND,
            CoreError::Conflict { .. } => StatusCode::CONFLICT,
            CoreError::TypeMismatch { .. } => StatusCode::BAD_REQUEST,
            CoreError::Authorization { .. } => StatusCode::FORBIDDEN,
            CoreError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            CoreError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            CoreError::Logging(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Result type alias using CoreError.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Wire body for every error response the API layer returns — a stable
/// `code`, a human-readable `message`, and optional structured `details`.
#[derive(Debug, serde::Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<ConflictDetails>,
}

impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        let status = self.http_status();
        let code = self.code();
        let details = match &self {
            CoreError::Conflict { details, .. } => details.clone(),
            _ => None,
        };
        let body = ErrorBody { code, message: self.to_string(), details };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = CoreError::validation("INVALID_PATH", "path must not be empty");
        assert!(err.to_string().contains("path must not be empty"));
        assert_eq!(err.code(), "INVALID_PATH");
        assert_eq!(err.http_status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_depot_conflict_details() {
        let a = NodeKey::from_bytes([1u8; 16]);
        let b = NodeKey::from_bytes([2u8; 16]);
        let err = CoreError::depot_conflict(Some(a), Some(b));
        assert_eq!(err.code(), "DEPOT_CONFLICT");
        assert_eq!(err.http_status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_not_retryable_by_default() {
        assert!(!CoreError::validation("X", "x").is_retryable());
        assert!(CoreError::internal("timeout").is_retryable());
    }
}
