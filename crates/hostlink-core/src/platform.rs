//! Seams to the host operating system.
//!
//! The update components never talk to the OS directly. Each OS facility is a
//! trait here, so the same orchestration runs against the desktop backend, a
//! mobile binding, or a scripted fake in tests.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors reported by platform facilities.
#[derive(Debug, Error)]
pub enum PlatformError {
    /// No component can handle the request.
    #[error("no handler for {0}")]
    NoHandler(String),

    /// A file the request depends on does not exist.
    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The facility refused the request.
    #[error("request rejected: {0}")]
    Rejected(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Operation not supported on this platform.
    #[error("operation unsupported on this platform")]
    Unsupported,
}

/// Correlation identifier handed out by the download facility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a registered completion observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(pub u64);

/// How the download facility surfaces a running download to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationVisibility {
    Hidden,
    Visible,
    /// Visible while running and after it completes.
    #[default]
    VisibleNotifyCompleted,
}

/// A download submitted to the OS background facility.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub url: String,
    /// Fixed file name inside the facility's download directory.
    pub destination_name: String,
    pub title: String,
    pub description: String,
    pub visibility: NotificationVisibility,
}

/// Payload of a system-wide "download finished" notification.
///
/// The facility broadcasts one of these for every download it finishes,
/// including downloads started by other subsystems.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionNotice {
    pub task_id: Option<TaskId>,
}

/// Callback registered with the download facility.
///
/// May be invoked on any thread.
pub type CompletionObserver = Box<dyn Fn(CompletionNotice) + Send + Sync>;

/// A navigation target on a system settings surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsRedirect {
    /// Settings screen to open.
    pub action: String,
    /// Identity the screen is addressed to, e.g. `package:com.example.app`.
    pub target: String,
}

/// A content URI issued by a [`FileShare`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ShareUri(String);

impl ShareUri {
    pub fn new(uri: impl Into<String>) -> Self {
        Self(uri.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ShareUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Request to start the OS package installer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallRequest {
    pub uri: ShareUri,
    pub mime_type: String,
    /// Grant the installer temporary read access to `uri`.
    pub grant_read_uri: bool,
    /// Run the installer as an independent task.
    pub new_task: bool,
}

/// Install-permission queries and the settings surface that changes them.
pub trait InstallPermissions: Send + Sync {
    fn can_request_package_installs(&self) -> Result<bool, PlatformError>;

    /// Opens a settings screen. Fire-and-forget: there is no completion signal.
    fn open_settings(&self, redirect: &SettingsRedirect) -> Result<(), PlatformError>;
}

/// The OS background-download facility.
pub trait DownloadFacility: Send + Sync {
    /// Submits a download and returns immediately.
    fn enqueue(&self, request: DownloadRequest) -> Result<TaskId, PlatformError>;

    /// Local file of a finished download, if the facility can produce one.
    fn downloaded_file(&self, id: TaskId) -> Option<PathBuf>;

    /// Cancels a download and discards whatever it fetched.
    fn remove(&self, id: TaskId);

    fn register_observer(&self, observer: CompletionObserver) -> ObserverId;

    fn unregister_observer(&self, id: ObserverId);
}

/// Grants scoped read access to local files.
pub trait FileShare: Send + Sync {
    fn grant_read(&self, path: &Path, mime_type: &str) -> Result<ShareUri, PlatformError>;

    fn revoke(&self, uri: &ShareUri);
}

/// The OS package installer.
pub trait PackageInstaller: Send + Sync {
    /// Hands the request to the installer. Returns once the OS accepted it.
    fn start_install(&self, request: &InstallRequest) -> Result<(), PlatformError>;
}

/// Opens URIs with whatever the OS registers for them.
pub trait UriOpener: Send + Sync {
    fn open_uri(&self, uri: &str) -> Result<(), PlatformError>;
}

/// The set of facilities the update flow needs.
#[derive(Clone)]
pub struct Platform {
    pub permissions: Arc<dyn InstallPermissions>,
    pub downloads: Arc<dyn DownloadFacility>,
    pub files: Arc<dyn FileShare>,
    pub installer: Arc<dyn PackageInstaller>,
}

impl fmt::Debug for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Platform").finish_non_exhaustive()
    }
}
