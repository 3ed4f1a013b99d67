use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::domain::{OrderError, PayoutError};
use crate::payments::StripeError;
use crate::validation::ValidationError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Payment provider error: {0}")]
    Payment(String),
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Database(sqlx::Error::RowNotFound) => StatusCode::NOT_FOUND,
            AppError::Database(e) if is_constraint_violation(e) => StatusCode::CONFLICT,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Payment(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Message safe to show to API clients.
    fn public_message(&self) -> String {
        match self {
            AppError::Database(sqlx::Error::RowNotFound) => "Not found: resource".to_string(),
            AppError::Database(e) if is_constraint_violation(e) => {
                "Conflict: resource already exists or is still referenced".to_string()
            }
            AppError::Database(_) => "Database error".to_string(),
            AppError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }

    /// Maps `RowNotFound` to a descriptive 404, passing other database errors through.
    pub fn not_found_or(what: impl Into<String>) -> impl FnOnce(sqlx::Error) -> AppError {
        let what = what.into();
        move |e| match e {
            sqlx::Error::RowNotFound => AppError::NotFound(what),
            other => AppError::Database(other),
        }
    }
}

fn is_constraint_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .map(|db| db.is_unique_violation() || db.is_foreign_key_violation())
        .unwrap_or(false)
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        let body = Json(json!({
            "error": self.public_message(),
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}

impl From<ValidationError> for AppError {
    fn from(e: ValidationError) -> Self {
        AppError::Validation(e.to_string())
    }
}

impl From<OrderError> for AppError {
    fn from(e: OrderError) -> Self {
        match e {
            OrderError::ItemNotFound(_) => AppError::NotFound(e.to_string()),
            OrderError::NotBuyer => AppError::Forbidden(e.to_string()),
            OrderError::ItemCanceled(_)
            | OrderError::ItemConfirmed(_)
            | OrderError::NotPaid { .. }
            | OrderError::NotRefundable { .. } => AppError::BadRequest(e.to_string()),
        }
    }
}

impl From<PayoutError> for AppError {
    fn from(e: PayoutError) -> Self {
        AppError::BadRequest(e.to_string())
    }
}

impl From<StripeError> for AppError {
    fn from(e: StripeError) -> Self {
        AppError::Payment(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_validation_error_status_code() {
        let error = AppError::Validation("Invalid input".to_string());
        assert_eq!(error.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_not_found_error_status_code() {
        let error = AppError::NotFound("Resource not found".to_string());
        assert_eq!(error.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_row_not_found_maps_to_404() {
        let error = AppError::Database(sqlx::Error::RowNotFound);
        assert_eq!(error.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_other_database_errors_are_500() {
        let error = AppError::Database(sqlx::Error::PoolTimedOut);
        assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(error.public_message(), "Database error");
    }

    #[test]
    fn test_forbidden_and_conflict_status_codes() {
        assert_eq!(
            AppError::Forbidden("nope".to_string()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::Conflict("taken".to_string()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::Payment("stripe down".to_string()).status_code(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_order_errors_map_to_http_semantics() {
        assert_eq!(
            AppError::from(OrderError::NotBuyer).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::from(OrderError::ItemNotFound(Uuid::new_v4())).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::from(OrderError::ItemCanceled(Uuid::new_v4())).status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_not_found_or_keeps_other_errors() {
        let mapped = AppError::not_found_or("Order 42 not found")(sqlx::Error::RowNotFound);
        assert!(matches!(mapped, AppError::NotFound(ref m) if m == "Order 42 not found"));

        let passthrough = AppError::not_found_or("unused")(sqlx::Error::PoolClosed);
        assert!(matches!(passthrough, AppError::Database(sqlx::Error::PoolClosed)));
    }

    #[tokio::test]
    async fn test_internal_error_response_hides_details() {
        let error = AppError::Internal("secret detail".to_string());
        let response = error.into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "Internal server error");
        assert_eq!(body["status"], 500);
    }

    #[tokio::test]
    async fn test_forbidden_error_response() {
        let response = AppError::Forbidden("not your order".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
