use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::error;

use crate::session::SessionError;

#[derive(Debug, thiserror::Error)]
pub enum WebError {
    #[error("message content must not be empty")]
    EmptyMessage,

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("failed to render page: {0}")]
    Render(#[from] tera::Error),
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: &'static str,
    pub message: String,
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            WebError::EmptyMessage => (StatusCode::BAD_REQUEST, "EMPTY_MESSAGE"),
            WebError::Session(SessionError::NothingToReply) => {
                (StatusCode::CONFLICT, "NOTHING_TO_REPLY")
            }
            WebError::Session(SessionError::ReplyInProgress) => {
                (StatusCode::CONFLICT, "REPLY_IN_PROGRESS")
            }
            WebError::Render(e) => {
                error!(error = %e, "page render failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
        };

        let body = serde_json::json!({
            "success": false,
            "error": ApiError {
                code,
                message: self.to_string(),
            }
        });
        (status, Json(body)).into_response()
    }
}
