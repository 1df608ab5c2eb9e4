//! Error type for the HTTP layer and its mapping to status codes.

use axum::{
    Json,
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use docchat_rag::RagError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Errors returned by request handlers and the document service.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("no file was uploaded")]
    MissingFile,

    #[error("unsupported file type '{0}'; supported types: pdf, txt, md, docx")]
    UnsupportedFileType(String),

    #[error("invalid request: {0}")]
    BadRequest(String),

    #[error("document not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Rag(#[from] RagError),

    #[error("malformed upload: {0}")]
    Multipart(#[from] MultipartError),
}

pub type ServerResult<T> = std::result::Result<T, ServerError>;

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingFile | Self::UnsupportedFileType(_) | Self::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Rag(err) => match err {
                RagError::InvalidInput(_) => StatusCode::BAD_REQUEST,
                RagError::ExtractionFailure { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                RagError::DuplicateDocument(_) => StatusCode::CONFLICT,
                RagError::EngineShutdown => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Multipart(err) => err.status(),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(%status, error = %self, "request failed");
        }
        (status, Json(json!({"success": false, "detail": self.to_string()}))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kinds_map_to_status_codes() {
        assert_eq!(ServerError::MissingFile.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ServerError::UnsupportedFileType("exe".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ServerError::NotFound("x".into()).status(), StatusCode::NOT_FOUND);

        let extraction =
            RagError::ExtractionFailure { filename: "a.pdf".into(), message: "bad xref".into() };
        assert_eq!(ServerError::from(extraction).status(), StatusCode::UNPROCESSABLE_ENTITY);

        let embedding = RagError::embedding("hashing", "boom");
        assert_eq!(ServerError::from(embedding).status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            ServerError::from(RagError::InvalidInput("q".into())).status(),
            StatusCode::BAD_REQUEST
        );
    }
}
