use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

pub type AppResult<T> = std::result::Result<T, AppError>;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum AppError {
    #[error("{field} {message}")]
    Validation {
        field: &'static str,
        message: &'static str,
    },
    #[error("paste not found")]
    NotFound,
    #[error("invalid request body")]
    Json {
        #[from]
        source: JsonRejection,
    },
    #[error("database error")]
    Storage { source: sqlx::Error },
    #[error("no free paste id after {attempts} attempts")]
    IdSpaceExhausted { attempts: usize },
}

impl AppError {
    pub fn validation(field: &'static str, message: &'static str) -> Self {
        AppError::Validation { field, message }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation { .. } => StatusCode::BAD_REQUEST,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Json { source } => match source.status() {
                StatusCode::PAYLOAD_TOO_LARGE => StatusCode::PAYLOAD_TOO_LARGE,
                _ => StatusCode::BAD_REQUEST,
            },
            AppError::Storage { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::IdSpaceExhausted { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status_code = self.status_code();

        let message = match &self {
            AppError::Storage { source } => {
                error!("storage failure: {source}");
                "internal server error".to_owned()
            }
            AppError::IdSpaceExhausted { .. } => {
                error!("{self}");
                "internal server error".to_owned()
            }
            AppError::Json { source } => source.body_text(),
            _ => format!("{self}"),
        };

        (status_code, Json(json!({ "error": message }))).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(source: sqlx::Error) -> Self {
        match source {
            sqlx::Error::RowNotFound => AppError::NotFound,
            _ => AppError::Storage { source },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_message_names_field() {
        let err = AppError::validation("ttl_seconds", "must be an integer >= 1");
        assert_eq!(err.to_string(), "ttl_seconds must be an integer >= 1");
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn storage_errors_are_server_errors() {
        let err = AppError::from(sqlx::Error::PoolTimedOut);
        assert!(matches!(err, AppError::Storage { .. }));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn exhausted_ids_are_server_errors() {
        let err = AppError::IdSpaceExhausted { attempts: 5 };
        assert_eq!(err.to_string(), "no free paste id after 5 attempts");
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
