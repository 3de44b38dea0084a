//! Update flow error types.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::platform::PlatformError;

/// Errors that terminate an update request.
///
/// Every OS call made by the update components is caught at the component
/// boundary and converted into one of these variants.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpdateError {
    /// The process may not request package installs.
    #[error("permission to install packages is required")]
    PermissionRequired,

    /// The download URL is not an absolute http(s) URL.
    #[error("invalid download URL: {0}")]
    InvalidUrl(String),

    /// The download finished but no local file could be retrieved for it.
    #[error("download finished but the artifact is unavailable")]
    ArtifactUnavailable,

    /// No completion notification arrived in time.
    #[error("no download completion within {0:?}")]
    Timeout(Duration),

    /// The download was reported complete but the file is missing.
    #[error("downloaded file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// No component can handle the install request.
    #[error("no installer is available to handle the update")]
    NoInstallerAvailable,

    /// Another update request is still in flight.
    #[error("an update request is already active")]
    RequestAlreadyActive,

    /// The request was cancelled by the caller.
    #[error("update request cancelled")]
    Cancelled,

    /// An OS call failed outside the cases above.
    #[error("platform error: {0}")]
    Platform(String),
}

impl UpdateError {
    /// Returns a stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::PermissionRequired => "PERMISSION_REQUIRED",
            Self::InvalidUrl(_) => "INVALID_URL",
            Self::ArtifactUnavailable => "ARTIFACT_UNAVAILABLE",
            Self::Timeout(_) => "TIMEOUT",
            Self::FileNotFound(_) => "FILE_NOT_FOUND",
            Self::NoInstallerAvailable => "NO_INSTALLER_AVAILABLE",
            Self::RequestAlreadyActive => "REQUEST_ALREADY_ACTIVE",
            Self::Cancelled => "CANCELLED",
            Self::Platform(_) => "PLATFORM_ERROR",
        }
    }
}

impl From<PlatformError> for UpdateError {
    fn from(err: PlatformError) -> Self {
        match err {
            PlatformError::NoHandler(_) => Self::NoInstallerAvailable,
            PlatformError::NotFound(path) => Self::FileNotFound(path),
            other => Self::Platform(other.to_string()),
        }
    }
}

/// Result type for update operations.
pub type Result<T> = std::result::Result<T, UpdateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(UpdateError::PermissionRequired.code(), "PERMISSION_REQUIRED");
        assert_eq!(
            UpdateError::Timeout(Duration::from_secs(1)).code(),
            "TIMEOUT"
        );
        assert_eq!(UpdateError::RequestAlreadyActive.code(), "REQUEST_ALREADY_ACTIVE");
    }

    #[test]
    fn platform_errors_map_into_taxonomy() {
        let err: UpdateError = PlatformError::NoHandler("install".into()).into();
        assert_eq!(err, UpdateError::NoInstallerAvailable);

        let err: UpdateError = PlatformError::NotFound(PathBuf::from("/tmp/x.apk")).into();
        assert_eq!(err, UpdateError::FileNotFound(PathBuf::from("/tmp/x.apk")));

        let err: UpdateError = PlatformError::Rejected("queue full".into()).into();
        assert!(matches!(err, UpdateError::Platform(msg) if msg.contains("queue full")));
    }
}
