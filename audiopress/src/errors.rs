use crate::api::models::ErrorBody;
use crate::encoder::EncoderError;
use axum::{
    Json,
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::time::Duration;
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// Invalid request data (missing file part, empty filename, malformed multipart)
    #[error("{message}")]
    BadRequest { message: String },

    /// Upload overflowed the body limit while streaming
    #[error("{message}")]
    PayloadTooLarge { message: String },

    /// Encoder exited unsuccessfully; `details` carries its diagnostic output
    #[error("Encoder exited with {status}: {details}")]
    EncodeFailed { status: String, details: String },

    /// Encoder exceeded its wall-clock budget and was killed
    #[error("Encoder timed out after {timeout:?}")]
    EncodeTimedOut { timeout: Duration },

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Error::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Error::EncodeFailed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Error::EncodeTimedOut { .. } => StatusCode::GATEWAY_TIMEOUT,
            Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the JSON body for this error, without leaking internal implementation details
    pub fn body(&self) -> ErrorBody {
        match self {
            Error::BadRequest { message } | Error::PayloadTooLarge { message } => ErrorBody::new(message.clone()),
            Error::EncodeFailed { details, .. } => ErrorBody::with_details("FFmpeg compression failed", details.clone()),
            Error::EncodeTimedOut { .. } => ErrorBody::new("FFmpeg compression timed out"),
            Error::Other(_) => ErrorBody::new("Internal server error during processing"),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match &self {
            Error::Other(_) => {
                tracing::error!("Internal server error: {:#}", self);
            }
            Error::EncodeFailed { status, details } => {
                tracing::error!(%status, stderr = %details, "FFmpeg error");
            }
            Error::EncodeTimedOut { .. } => {
                tracing::error!("{}", self);
            }
            Error::BadRequest { .. } | Error::PayloadTooLarge { .. } => {
                tracing::debug!("Client error: {}", self);
            }
        }

        (self.status_code(), Json(self.body())).into_response()
    }
}

impl From<MultipartError> for Error {
    fn from(err: MultipartError) -> Self {
        match err.status() {
            StatusCode::PAYLOAD_TOO_LARGE => Error::PayloadTooLarge {
                message: "Request body exceeds the maximum upload size".to_string(),
            },
            _ => Error::BadRequest {
                message: format!("Failed to parse multipart data: {}", err.body_text()),
            },
        }
    }
}

impl From<EncoderError> for Error {
    fn from(err: EncoderError) -> Self {
        match err {
            EncoderError::Failed { code, stderr } => Error::EncodeFailed {
                status: code.map_or_else(|| "signal".to_string(), |c| format!("exit code {c}")),
                details: stderr,
            },
            EncoderError::TimedOut { timeout } => Error::EncodeTimedOut { timeout },
            other => Error::Other(anyhow::Error::new(other)),
        }
    }
}

/// Type alias for handler results
pub type Result<T> = std::result::Result<T, Error>;
