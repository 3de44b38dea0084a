//! Bridge error types.

use thiserror::Error;

use hostlink_core::{EmailError, ExportError, UpdateError};

use crate::channel::MethodResponse;

/// Errors returned to the UI layer as error responses.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// A required argument is missing or malformed.
    #[error("{0}")]
    InvalidArguments(String),

    /// A document could not be saved.
    #[error("Could not save file: {0}")]
    SaveFailed(#[from] ExportError),

    /// The update flow refused the request.
    #[error("{0}")]
    Update(#[from] UpdateError),

    /// The mail client hand-off failed.
    #[error("{0}")]
    Email(#[from] EmailError),
}

impl BridgeError {
    /// Stable code carried by the error response.
    pub fn code(&self) -> &'static str {
        match self {
            BridgeError::InvalidArguments(_) => "INVALID_ARGUMENTS",
            BridgeError::SaveFailed(ExportError::InvalidFileName(_)) => "INVALID_ARGUMENTS",
            BridgeError::SaveFailed(_) => "UNAVAILABLE",
            BridgeError::Update(e) => e.code(),
            BridgeError::Email(EmailError::NoRecipients | EmailError::InvalidAddress(_)) => {
                "INVALID_ARGUMENTS"
            }
            BridgeError::Email(EmailError::NoMailClient) => "NO_MAIL_CLIENT",
            BridgeError::Email(EmailError::Platform(_)) => "UNAVAILABLE",
        }
    }
}

impl From<BridgeError> for MethodResponse {
    fn from(err: BridgeError) -> Self {
        MethodResponse::Error {
            code: err.code().to_string(),
            message: err.to_string(),
            details: None,
        }
    }
}

/// Result type for bridge handlers.
pub type Result<T> = std::result::Result<T, BridgeError>;
