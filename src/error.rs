use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::model::ModelError;
use crate::prompt::ParseParamError;

/// Message returned to the client for every relay failure.
pub const GENERIC_ERROR: &str = "Failed to generate insights";

/// Everything that can go wrong while relaying one request.
///
/// The variants exist for the server log. Clients always get a 500 with
/// [`GENERIC_ERROR`].
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("not a multipart request: {0}")]
    NotMultipart(#[from] axum::extract::multipart::MultipartRejection),

    #[error("malformed multipart upload: {0}")]
    Multipart(#[from] axum::extract::multipart::MultipartError),

    #[error("missing form field: {0}")]
    MissingField(&'static str),

    #[error("invalid form field: {0}")]
    InvalidField(#[from] ParseParamError),

    #[error("model call failed: {0}")]
    Model(#[from] ModelError),
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            error: GENERIC_ERROR.to_string(),
        });
        (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
    }
}
