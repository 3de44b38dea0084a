//! Submission of update downloads to the OS download facility.

use std::fmt;
use std::sync::Arc;

use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Result, UpdateError};
use crate::platform::{DownloadFacility, DownloadRequest, TaskId};
use crate::settings::UpdaterSettings;
use crate::update::permission::{PermissionGate, PermissionState};

/// Lifecycle of a submitted download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStatus {
    Enqueued,
    InProgress,
    Succeeded,
    Failed,
}

/// A download tracked by the update flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchTask {
    /// Correlation key matched against completion notifications.
    pub id: TaskId,
    pub source_url: String,
    pub status: FetchStatus,
}

/// Validates a download URL: absolute, http or https, with a host.
pub fn validate_url(raw: &str) -> Result<Url> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(UpdateError::InvalidUrl("empty URL".to_string()));
    }

    let url = Url::parse(trimmed).map_err(|e| UpdateError::InvalidUrl(format!("{raw}: {e}")))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(UpdateError::InvalidUrl(format!(
            "{raw}: unsupported scheme '{}'",
            url.scheme()
        )));
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(UpdateError::InvalidUrl(format!("{raw}: missing host")));
    }

    Ok(url)
}

/// Hands update downloads to the OS download facility.
#[derive(Clone)]
pub struct FetchCoordinator {
    downloads: Arc<dyn DownloadFacility>,
    gate: PermissionGate,
    settings: UpdaterSettings,
}

impl fmt::Debug for FetchCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchCoordinator")
            .field("gate", &self.gate)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl FetchCoordinator {
    pub fn new(
        downloads: Arc<dyn DownloadFacility>,
        gate: PermissionGate,
        settings: UpdaterSettings,
    ) -> Self {
        Self {
            downloads,
            gate,
            settings,
        }
    }

    /// Submits `url` and returns the new task without waiting for it.
    ///
    /// The URL is validated before anything else is consulted, so an invalid
    /// URL never reaches the permission gate or the download facility.
    pub fn enqueue(&self, url: &str) -> Result<FetchTask> {
        let url = validate_url(url)?;

        if self.gate.check() == PermissionState::Denied {
            return Err(UpdateError::PermissionRequired);
        }

        let request = DownloadRequest {
            url: url.to_string(),
            destination_name: self.settings.destination_name.clone(),
            title: self.settings.title.clone(),
            description: self.settings.description.clone(),
            visibility: self.settings.visibility,
        };

        let id = self.downloads.enqueue(request)?;
        info!(task_id = %id, url = %url, "Update download enqueued");

        Ok(FetchTask {
            id,
            source_url: url.to_string(),
            status: FetchStatus::Enqueued,
        })
    }

    /// Cancels a pending download.
    pub fn cancel(&self, id: TaskId) {
        debug!(task_id = %id, "Removing update download");
        self.downloads.remove(id);
    }
}
