use axum::{
    Json,
    extract::rejection::{FormRejection, JsonRejection, PathRejection, QueryRejection},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utoipa::ToSchema;

/// Detail returned for every token failure (missing, malformed, expired, unknown subject).
pub const INVALID_CREDENTIALS: &str = "Could not validate credentials";
/// Detail returned for every failed login, whether the account is missing or the password is wrong.
pub const INCORRECT_LOGIN: &str = "Incorrect email or password";

/// AppError
///
/// The single failure type surfaced by the service. Every variant maps to a stable,
/// machine-readable kind plus an HTTP status, so callers can branch on `error` in the
/// JSON body without parsing the human-readable `detail`.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Unauthenticated(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Not enough stock: requested {requested}, available {available}")]
    InsufficientStock { requested: i64, available: i64 },

    #[error("{0}")]
    Validation(String),

    #[error("store call `{0}` timed out")]
    Timeout(&'static str),

    #[error("internal error: {0}")]
    Internal(String),
}

/// ErrorResponse
///
/// The JSON envelope written for every failed request.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ErrorResponse {
    /// Stable error kind, e.g. `insufficient_stock`.
    pub error: String,
    /// Human-readable explanation.
    pub detail: String,
}

impl AppError {
    pub fn unauthenticated() -> Self {
        Self::Unauthenticated(INVALID_CREDENTIALS.to_string())
    }

    pub fn sweet_not_found(id: i64) -> Self {
        Self::NotFound(format!("Sweet {id} not found"))
    }

    /// The stable kind written to the `error` field.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Unauthenticated(_) => "unauthenticated",
            AppError::Forbidden(_) => "forbidden",
            AppError::NotFound(_) => "not_found",
            AppError::Conflict(_) => "conflict",
            AppError::InsufficientStock { .. } => "insufficient_stock",
            AppError::Validation(_) => "validation",
            AppError::Timeout(_) => "timeout",
            AppError::Internal(_) => "internal",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::InsufficientStock { .. } => StatusCode::BAD_REQUEST,
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Timeout(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Store failures are logged in full but only a generic detail leaves the process.
        let detail = match &self {
            AppError::Internal(cause) => {
                tracing::error!(cause = %cause, "request failed with internal error");
                "Internal server error".to_string()
            }
            AppError::Timeout(op) => {
                tracing::error!(operation = op, "store call timed out");
                "The data store did not respond in time".to_string()
            }
            other => other.to_string(),
        };

        let body = ErrorResponse {
            error: self.kind().to_string(),
            detail,
        };

        let mut response = (status, Json(body)).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

// --- Conversions ---

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                AppError::Conflict("Email already registered".to_string())
            }
            sqlx::Error::Database(db_err) if db_err.is_check_violation() => {
                AppError::Validation(db_err.message().to_string())
            }
            // numeric_value_out_of_range, e.g. a restock past the BIGINT limit
            sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("22003") => {
                AppError::Validation("value out of range".to_string())
            }
            sqlx::Error::PoolTimedOut => AppError::Timeout("acquire connection"),
            _ => AppError::Internal(err.to_string()),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<FormRejection> for AppError {
    fn from(rejection: FormRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_of(err: AppError) -> (StatusCode, Option<HeaderValue>, ErrorResponse) {
        let response = err.into_response();
        let status = response.status();
        let www = response.headers().get(header::WWW_AUTHENTICATE).cloned();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, www, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn unauthenticated_carries_bearer_challenge() {
        let (status, www, body) = body_of(AppError::unauthenticated()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(www.unwrap(), "Bearer");
        assert_eq!(body.error, "unauthenticated");
        assert_eq!(body.detail, INVALID_CREDENTIALS);
    }

    #[tokio::test]
    async fn insufficient_stock_reports_both_quantities() {
        let (status, www, body) = body_of(AppError::InsufficientStock {
            requested: 3,
            available: 2,
        })
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(www.is_none());
        assert_eq!(body.error, "insufficient_stock");
        assert!(body.detail.contains("requested 3"));
        assert!(body.detail.contains("available 2"));
    }

    #[tokio::test]
    async fn internal_detail_is_not_leaked() {
        let (status, _, body) =
            body_of(AppError::Internal("connection reset by peer".into())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.error, "internal");
        assert!(!body.detail.contains("connection reset"));
    }

    #[test]
    fn kinds_are_stable() {
        assert_eq!(AppError::Forbidden("x".into()).kind(), "forbidden");
        assert_eq!(AppError::sweet_not_found(7).kind(), "not_found");
        assert_eq!(AppError::Conflict("x".into()).status_code(), StatusCode::CONFLICT);
        assert_eq!(
            AppError::Validation("x".into()).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            AppError::Timeout("list_sweets").status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
