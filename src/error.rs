use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use crate::report::RequestError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(#[from] RequestError),

    #[error("Failed to generate report")]
    Database(#[from] sqlx::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Database(err) => {
                error!(error = %err, "report query failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (status, self.to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_parameter_is_bad_request() {
        let response = AppError::from(RequestError::MissingStream).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn database_failure_hides_details() {
        let err = AppError::from(sqlx::Error::RowNotFound);
        assert_eq!(err.to_string(), "Failed to generate report");
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
