use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use kernel::ErrorReply;
use thiserror::Error;

use crate::config::ConfigError;
use crate::object_store::ObjectStoreError;

/// Failure of a single service operation. Terminal for the request.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("not authenticated")]
    Unauthenticated,

    #[error("unauthorized")]
    Unauthorized,

    #[error("{0} not found")]
    NotFound(String),

    #[error("failed to delete object from storage")]
    StorageDeleteFailed,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("{0} already exists")]
    Conflict(String),

    #[error(transparent)]
    Signing(#[from] ObjectStoreError),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl ServiceError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            ServiceError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ServiceError::Unauthorized => StatusCode::FORBIDDEN,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::StorageDeleteFailed => StatusCode::BAD_GATEWAY,
            ServiceError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ServiceError::Conflict(_) => StatusCode::CONFLICT,
            ServiceError::Signing(_) | ServiceError::Database(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message safe to show to the client.
    fn public_message(&self) -> String {
        match self {
            ServiceError::Unauthenticated => "Not authenticated".to_owned(),
            ServiceError::Unauthorized => "Unauthorized".to_owned(),
            ServiceError::NotFound(_) => "Not found".to_owned(),
            ServiceError::StorageDeleteFailed => "Failed to delete file from storage".to_owned(),
            ServiceError::InvalidInput(reason) => reason.clone(),
            ServiceError::Conflict(_) => "Already exists".to_owned(),
            ServiceError::Signing(_) | ServiceError::Database(_) => "Internal error".to_owned(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("{self}");
        }
        let body = ErrorReply {
            error: self.public_message(),
        };
        (status, Json(body)).into_response()
    }
}

/// Reasons the server refuses to start.
#[derive(Error, Debug)]
pub enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("invalid public url: {0}")]
    PublicUrl(#[from] url::ParseError),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
