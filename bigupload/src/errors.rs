use crate::relay::RelayError;
use crate::sink::SinkError;
use axum::Json;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error as ThisError;

/// Handler-boundary error for the upload endpoints.
///
/// Every variant is converted into a JSON `{"msg": ...}` body at the boundary;
/// nothing here terminates the serving process or leaks a raw fault to the
/// client.
#[derive(ThisError, Debug)]
pub enum Error {
    /// Invalid request data (e.g. malformed multipart body, missing field).
    #[error("{message}")]
    BadRequest { message: String },

    /// Draining the upload to its destination failed.
    #[error(transparent)]
    Sink(#[from] SinkError),

    /// Relaying the upload to the downstream service failed.
    #[error(transparent)]
    Relay(#[from] RelayError),
}

impl Error {
    /// User-safe message, without internal detail. The wording for sink
    /// failures matches what clients of this service already expect.
    pub fn user_message(&self) -> String {
        match self {
            Error::BadRequest { message } => message.clone(),
            Error::Sink(_) => "something went wrong while writing file".to_string(),
            Error::Relay(_) => "something went wrong while passing file to next service".to_string(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // Log full detail server-side; the client only sees user_message().
        match &self {
            Error::BadRequest { .. } => {
                tracing::debug!("client error: {}", self);
            }
            Error::Sink(_) | Error::Relay(_) => {
                tracing::error!(error = ?self, "upload handler error");
            }
        }

        // Upload endpoints answer 200 with a JSON message even on failure;
        // clients inspect the msg field, not the status code.
        Json(json!({ "msg": self.user_message() })).into_response()
    }
}

/// Type alias for handler results
pub type Result<T> = std::result::Result<T, Error>;
