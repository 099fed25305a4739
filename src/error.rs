use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Duplicate file code: {0}")]
    DuplicateCode(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("File code {0} is already active")]
    Conflict(String),

    #[error("Excel must contain columns: {}", .0.join(", "))]
    Schema(Vec<&'static str>),

    #[error("Recycle bin entry {0} belongs to another user")]
    Ownership(String),

    #[error("{0}")]
    Validation(String),

    #[error("Invalid file type: {0}")]
    InvalidUpload(String),

    #[error("Spreadsheet error: {0}")]
    Spreadsheet(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::DuplicateCode(_) | AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Ownership(_) => StatusCode::FORBIDDEN,
            AppError::Schema(_)
            | AppError::Validation(_)
            | AppError::InvalidUpload(_)
            | AppError::Spreadsheet(_) => StatusCode::BAD_REQUEST,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show to the user; storage details stay in the log.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                "Database error occurred".to_string()
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(json!({ "error": self.public_message() }))).into_response()
    }
}

impl From<crate::auth::AuthError> for AppError {
    fn from(err: crate::auth::AuthError) -> Self {
        match err {
            crate::auth::AuthError::Database(e) => AppError::Database(e),
            crate::auth::AuthError::Hash(e) => AppError::Internal(e.to_string()),
        }
    }
}

impl From<minijinja::Error> for AppError {
    fn from(err: minijinja::Error) -> Self {
        AppError::Internal(format!("template: {err}"))
    }
}

impl From<calamine::XlsxError> for AppError {
    fn from(err: calamine::XlsxError) -> Self {
        AppError::Spreadsheet(err.to_string())
    }
}

impl From<rust_xlsxwriter::XlsxError> for AppError {
    fn from(err: rust_xlsxwriter::XlsxError) -> Self {
        AppError::Spreadsheet(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_domain_errors_to_status_codes() {
        assert_eq!(AppError::NotFound("A1".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::DuplicateCode("A1".into()).status(), StatusCode::CONFLICT);
        assert_eq!(AppError::Ownership("A1".into()).status(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::Schema(vec!["box"]).status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn schema_error_lists_missing_columns() {
        let err = AppError::Schema(vec!["box", "shelf"]);
        assert_eq!(err.to_string(), "Excel must contain columns: box, shelf");
    }

    #[test]
    fn database_errors_are_not_leaked() {
        let err = AppError::Database(rusqlite::Error::QueryReturnedNoRows);
        assert_eq!(err.public_message(), "Database error occurred");
    }
}
