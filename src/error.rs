//! Error types for request handling and server startup.

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;

use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Errors surfaced by the HTTP layer.
///
/// Every variant renders as a bare status line with an empty body. Failures
/// that happen once a media body has started streaming never reach this type.
#[derive(Debug, Error)]
pub enum ServeError {
    /// The requested or uploaded name is not a single plain file name.
    #[error("invalid file name {0:?}")]
    InvalidFileName(String),

    /// Opening or stat'ing a media file failed.
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Upload form carried no `file` field.
    #[error("upload has no `file` field")]
    MissingUploadField,

    /// Upload body could not be parsed as multipart form data.
    #[error("malformed upload: {0}")]
    Multipart(#[from] MultipartError),

    /// Writing an upload into the media directory failed.
    #[error("failed to store {path}: {source}")]
    Store {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The listener could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl ServeError {
    /// Status code sent to the client for this error.
    ///
    /// A missing media file is reported as `500`, the same as any other
    /// open or stat failure.
    pub fn status(&self) -> StatusCode {
        match self {
            ServeError::InvalidFileName(_) | ServeError::MissingUploadField => StatusCode::BAD_REQUEST,
            ServeError::Multipart(e) => e.status(),
            ServeError::Open { .. }
            | ServeError::Store { .. }
            | ServeError::Bind { .. }
            | ServeError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServeError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("{self}");
        } else {
            tracing::debug!("{self}");
        }
        status.into_response()
    }
}
