//! Host shim settings.
//!
//! Settings are plain serde structs with defaults; the binary loads them from
//! `settings.json` and layers command-line overrides on top.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::platform::NotificationVisibility;

/// Default application identity.
pub const DEFAULT_APP_ID: &str = "com.suvojeet.attendance_tracker";

/// Default file name for downloaded updates.
pub const DEFAULT_DESTINATION_NAME: &str = "attendance_tracker_update.apk";

/// Default completion timeout (30 minutes).
pub const DEFAULT_COMPLETION_TIMEOUT_SECS: u64 = 30 * 60;

/// Errors loading settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid settings file: {0}")]
    Json(#[from] serde_json::Error),
}

/// Settings for the self-update flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdaterSettings {
    /// Fixed file name of the downloaded update.
    pub destination_name: String,
    /// Title shown by the download facility.
    pub title: String,
    /// Description shown by the download facility.
    pub description: String,
    pub visibility: NotificationVisibility,
    /// How long to wait for the download to finish.
    pub completion_timeout_secs: u64,
    /// Suffix appended to the app id to form the share authority.
    pub share_authority_suffix: String,
}

impl Default for UpdaterSettings {
    fn default() -> Self {
        Self {
            destination_name: DEFAULT_DESTINATION_NAME.to_string(),
            title: "App Update".to_string(),
            description: "Downloading new version".to_string(),
            visibility: NotificationVisibility::VisibleNotifyCompleted,
            completion_timeout_secs: DEFAULT_COMPLETION_TIMEOUT_SECS,
            share_authority_suffix: ".fileprovider".to_string(),
        }
    }
}

impl UpdaterSettings {
    pub fn completion_timeout(&self) -> Duration {
        Duration::from_secs(self.completion_timeout_secs)
    }

    /// Share authority for the given app id, e.g. `com.example.app.fileprovider`.
    pub fn share_authority(&self, app_id: &str) -> String {
        format!("{}{}", app_id, self.share_authority_suffix)
    }
}

/// Top-level host settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostSettings {
    /// Application identity used for channel names and settings redirects.
    pub app_id: String,
    /// Whether the desktop backend reports install permission as granted.
    pub allow_package_installs: bool,
    /// Where downloads land (None = platform default).
    pub download_dir: Option<PathBuf>,
    /// Where exported documents land (None = platform default).
    pub documents_dir: Option<PathBuf>,
    pub updater: UpdaterSettings,
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            app_id: DEFAULT_APP_ID.to_string(),
            allow_package_installs: true,
            download_dir: None,
            documents_dir: None,
            updater: UpdaterSettings::default(),
        }
    }
}

impl HostSettings {
    /// Loads settings from a JSON file.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Loads settings from a JSON file, falling back to defaults if it is missing.
    pub fn load_or_default(path: &Path) -> Result<Self, SettingsError> {
        match Self::load(path) {
            Ok(settings) => Ok(settings),
            Err(SettingsError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No settings file, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(e),
        }
    }

    /// Channel name for a capability, e.g. `com.example.app/updater`.
    pub fn channel(&self, name: &str) -> String {
        format!("{}/{}", self.app_id, name)
    }
}
