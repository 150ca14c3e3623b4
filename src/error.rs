//! Error types for the Pair API.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Caller-facing error taxonomy.
///
/// Variants carry only the generic message that is safe to send back to the
/// caller. Internal detail is logged where the error is produced and never
/// reaches the response body.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PairError {
    #[error("Request unauthenticated")]
    Unauthenticated,

    #[error("Request denied")]
    PermissionDenied,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{0} already exists")]
    AlreadyExists(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Deadline exceeded")]
    DeadlineExceeded,
}

impl PairError {
    /// Stable machine-readable code for the error kind.
    pub fn code(&self) -> &'static str {
        match self {
            PairError::Unauthenticated => "unauthenticated",
            PairError::PermissionDenied => "permission_denied",
            PairError::InvalidArgument(_) => "invalid_argument",
            PairError::AlreadyExists(_) => "already_exists",
            PairError::NotFound(_) => "not_found",
            PairError::Internal(_) => "internal",
            PairError::DeadlineExceeded => "deadline_exceeded",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            PairError::Unauthenticated => StatusCode::UNAUTHORIZED,
            PairError::PermissionDenied => StatusCode::FORBIDDEN,
            PairError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            PairError::AlreadyExists(_) => StatusCode::CONFLICT,
            PairError::NotFound(_) => StatusCode::NOT_FOUND,
            PairError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            PairError::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

/// JSON body of an error response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

impl IntoResponse for PairError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            code: self.code(),
            message: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

/// Store failures never leak their detail to the caller.
impl From<StoreError> for PairError {
    fn from(err: StoreError) -> Self {
        tracing::error!(error = %err, "Store operation failed");
        PairError::Internal("storage failure".to_string())
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Persistence errors raised by the store backends.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[cfg(feature = "postgres")]
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[cfg(feature = "postgres")]
    #[error("Pool runtime error: {0}")]
    PoolRuntime(#[from] deadpool_postgres::PoolError),
}

/// Token verification failures.
///
/// These never cross the service boundary: the authenticator collapses all
/// of them to [`PairError::Unauthenticated`] and only logs the reason.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid verification key: {0}")]
    InvalidKey(String),

    #[error("Token rejected: {0}")]
    Rejected(#[from] jsonwebtoken::errors::Error),

    #[error("Token has an empty subject")]
    EmptySubject,
}

impl From<AuthError> for PairError {
    fn from(_: AuthError) -> Self {
        PairError::Unauthenticated
    }
}

/// Result type alias for caller-facing operations.
pub type Result<T> = std::result::Result<T, PairError>;

#[cfg(test)]
mod tests {
    use super::*;

    // --- PairError ---

    #[test]
    fn test_status_mapping() {
        assert_eq!(PairError::Unauthenticated.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(PairError::PermissionDenied.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            PairError::InvalidArgument("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            PairError::AlreadyExists("x".into()).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(PairError::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(
            PairError::Internal("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            PairError::DeadlineExceeded.status(),
            StatusCode::GATEWAY_TIMEOUT
        );
    }

    #[test]
    fn test_store_error_detail_is_hidden() {
        let err = PairError::from(StoreError::Query(
            "relation \"pair_initiations\" does not exist".to_string(),
        ));
        assert_eq!(err.code(), "internal");
        assert!(!err.to_string().contains("pair_initiations"));
    }

    #[test]
    fn test_auth_error_collapses_to_unauthenticated() {
        assert_eq!(
            PairError::from(AuthError::EmptySubject),
            PairError::Unauthenticated
        );
        assert_eq!(
            PairError::from(AuthError::InvalidKey("bad pem".into())),
            PairError::Unauthenticated
        );
    }

    #[tokio::test]
    async fn test_error_response_body() {
        let response = PairError::NotFound("PairStart".into()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["code"], "not_found");
        assert_eq!(json["message"], "PairStart not found");
    }

    // --- ConfigError ---

    #[test]
    fn test_config_error_missing_env_var_display() {
        let err = ConfigError::MissingEnvVar("PAIR_JWT_ISSUER".to_string());
        assert!(err.to_string().contains("PAIR_JWT_ISSUER"));
    }

    #[test]
    fn test_config_error_invalid_value_display() {
        let err = ConfigError::InvalidValue {
            key: "PAIR_BIND_ADDR".to_string(),
            message: "not a socket address".to_string(),
        };
        assert!(err.to_string().contains("PAIR_BIND_ADDR"));
        assert!(err.to_string().contains("not a socket address"));
    }
}
