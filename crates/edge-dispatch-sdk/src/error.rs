//! Error types for handler modules

use thiserror::Error;

/// Errors a handler can raise while producing a response
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandlerError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found")]
    NotFound,

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Internal error: {0}")]
    Internal(String),

    /// The handler panicked instead of returning
    #[error("Handler panicked: {0}")]
    Panicked(String),
}

impl HandlerError {
    /// Convert the error to an HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            HandlerError::BadRequest(_) => 400,
            HandlerError::Unauthorized(_) => 401,
            HandlerError::NotFound => 404,
            HandlerError::Internal(_) | HandlerError::Panicked(_) => 500,
        }
    }

    /// Convert to a Response
    pub fn into_response(self) -> crate::Response {
        crate::Response::json(
            self.status_code(),
            serde_json::json!({
                "error": self.to_string()
            }),
        )
    }
}

impl From<HandlerError> for crate::Response {
    fn from(err: HandlerError) -> Self {
        err.into_response()
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        HandlerError::BadRequest(format!("Invalid JSON: {}", err))
    }
}
