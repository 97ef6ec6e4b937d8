use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::error::DbErr;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

fn current_request_id() -> Option<String> {
    crate::tracing::current_request_id().map(|rid| rid.as_str().to_string())
}

/// Error body returned by every endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "error": "Unprocessable Entity",
    "kind": "insufficient_stock",
    "message": "Insufficient stock: product 550e8400-e29b-41d4-a716-446655440000 has 3 units in warehouse 7c9e6679-7425-40de-944b-e07fc1f90ae7, 5 requested",
    "request_id": "req-abc123xyz",
    "timestamp": "2024-12-09T10:30:00.000Z"
}))]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Not Found", "Bad Request")
    pub error: String,
    /// Stable machine-readable error kind
    pub kind: String,
    /// Human-readable error description
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// ISO 8601 timestamp when error occurred
    pub timestamp: String,
}

/// Machine-readable classification of a [`ServiceError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ValidationError,
    ProductNotFound,
    WarehouseNotFound,
    MissingDestination,
    InsufficientStock,
    InsufficientBatchStock,
    ConcurrencyConflict,
    OrderNotFound,
    InvalidStatusTransition,
    DatabaseError,
    InternalError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ValidationError => "validation_error",
            ErrorKind::ProductNotFound => "product_not_found",
            ErrorKind::WarehouseNotFound => "warehouse_not_found",
            ErrorKind::MissingDestination => "missing_destination",
            ErrorKind::InsufficientStock => "insufficient_stock",
            ErrorKind::InsufficientBatchStock => "insufficient_batch_stock",
            ErrorKind::ConcurrencyConflict => "concurrency_conflict",
            ErrorKind::OrderNotFound => "order_not_found",
            ErrorKind::InvalidStatusTransition => "invalid_status_transition",
            ErrorKind::DatabaseError => "database_error",
            ErrorKind::InternalError => "internal_error",
        }
    }
}

#[derive(Debug, thiserror::Error, Serialize)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(
        #[from]
        #[serde(skip)]
        DbErr,
    ),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Product not found: {0}")]
    ProductNotFound(Uuid),

    #[error("Warehouse not found: {0}")]
    WarehouseNotFound(String),

    #[error("Transfer requires a destination warehouse")]
    MissingDestination,

    #[error("Insufficient stock: {0}")]
    InsufficientStock(String),

    #[error("Insufficient batch stock: {0}")]
    InsufficientBatchStock(String),

    #[error("Concurrent modification: {0}")]
    ConcurrencyConflict(String),

    #[error("Order not found: {0}")]
    OrderNotFound(Uuid),

    #[error("Invalid status transition from {from} to {to}")]
    InvalidStatusTransition { from: String, to: String },

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl From<JsonRejection> for ServiceError {
    fn from(rejection: JsonRejection) -> Self {
        ServiceError::ValidationError(rejection.body_text())
    }
}

impl ServiceError {
    pub fn db_error(err: DbErr) -> Self {
        ServiceError::DatabaseError(err)
    }

    /// Maps a database error raised while writing, turning lock and
    /// serialization contention into [`ServiceError::ConcurrencyConflict`].
    pub fn from_write_error(err: DbErr) -> Self {
        let message = err.to_string();
        let lowered = message.to_ascii_lowercase();
        const CONTENTION_MARKERS: [&str; 5] = [
            "deadlock detected",
            "could not serialize access",
            "database is locked",
            "database table is locked",
            "lock timeout",
        ];
        if CONTENTION_MARKERS.iter().any(|m| lowered.contains(m)) {
            ServiceError::ConcurrencyConflict(message)
        } else {
            ServiceError::DatabaseError(err)
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::DatabaseError(_) => ErrorKind::DatabaseError,
            Self::ValidationError(_) => ErrorKind::ValidationError,
            Self::ProductNotFound(_) => ErrorKind::ProductNotFound,
            Self::WarehouseNotFound(_) => ErrorKind::WarehouseNotFound,
            Self::MissingDestination => ErrorKind::MissingDestination,
            Self::InsufficientStock(_) => ErrorKind::InsufficientStock,
            Self::InsufficientBatchStock(_) => ErrorKind::InsufficientBatchStock,
            Self::ConcurrencyConflict(_) => ErrorKind::ConcurrencyConflict,
            Self::OrderNotFound(_) => ErrorKind::OrderNotFound,
            Self::InvalidStatusTransition { .. } => ErrorKind::InvalidStatusTransition,
            Self::InternalError(_) => ErrorKind::InternalError,
        }
    }

    /// Returns the HTTP status code for this error.
    /// This is the single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::DatabaseError(_) | Self::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ValidationError(_) | Self::MissingDestination => StatusCode::BAD_REQUEST,
            Self::ProductNotFound(_) | Self::WarehouseNotFound(_) | Self::OrderNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            Self::InsufficientStock(_) | Self::InsufficientBatchStock(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Self::ConcurrencyConflict(_) | Self::InvalidStatusTransition { .. } => {
                StatusCode::CONFLICT
            }
        }
    }

    /// Returns the error message suitable for HTTP responses.
    /// Internal errors return generic messages to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::InternalError(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed with internal error");
        }

        let err = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            kind: self.kind().as_str().to_string(),
            message: self.response_message(),
            request_id: current_request_id(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(err)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[tokio::test]
    async fn service_error_response_includes_request_id_and_kind() {
        let response =
            crate::tracing::scope_request_id(crate::tracing::RequestId::new("req-123"), async {
                ServiceError::InsufficientStock("3 available".into()).into_response()
            })
            .await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let payload: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(payload.request_id.as_deref(), Some("req-123"));
        assert_eq!(payload.kind, "insufficient_stock");
    }

    #[test]
    fn status_code_mapping() {
        assert_eq!(
            ServiceError::ValidationError("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::MissingDestination.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::ProductNotFound(Uuid::nil()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServiceError::WarehouseNotFound("w".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServiceError::InsufficientBatchStock("x".into()).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ServiceError::ConcurrencyConflict("x".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ServiceError::InternalError("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn response_message_hides_internal_details() {
        assert_eq!(
            ServiceError::DatabaseError(DbErr::Custom("password=secret".into()))
                .response_message(),
            "Database error"
        );
        assert_eq!(
            ServiceError::InternalError("stack".into()).response_message(),
            "Internal server error"
        );
        assert_eq!(
            ServiceError::ValidationError("quantity must be positive".into()).response_message(),
            "Validation error: quantity must be positive"
        );
    }

    #[test]
    fn contention_errors_become_concurrency_conflicts() {
        let err = ServiceError::from_write_error(DbErr::Custom(
            "error returned from database: deadlock detected".into(),
        ));
        assert_eq!(err.kind(), ErrorKind::ConcurrencyConflict);

        let err = ServiceError::from_write_error(DbErr::Custom("syntax error".into()));
        assert_eq!(err.kind(), ErrorKind::DatabaseError);
    }
}
