//! Channel argument and payload models.

use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use hostlink_core::update::{FetchStatus, UpdateEvent, UpdateOutcome};
use hostlink_core::UpdateOrchestrator;

/// Arguments of `downloadAndInstall`.
#[derive(Debug, Deserialize)]
pub struct DownloadArgs {
    pub url: Option<String>,
}

/// File contents as sent by the UI layer.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum FileBytes {
    /// Base64, standard alphabet.
    Base64(String),
    Raw(Vec<u8>),
}

impl FileBytes {
    pub fn decode(self) -> Option<Vec<u8>> {
        match self {
            FileBytes::Base64(encoded) => base64::engine::general_purpose::STANDARD
                .decode(encoded.trim())
                .ok(),
            FileBytes::Raw(bytes) => Some(bytes),
        }
    }
}

/// Arguments of `saveFileToDocuments`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveFileArgs {
    pub file_name: Option<String>,
    pub file_bytes: Option<FileBytes>,
}

/// One address or a list of them.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Recipients {
    One(String),
    Many(Vec<String>),
}

impl Default for Recipients {
    fn default() -> Self {
        Recipients::Many(Vec::new())
    }
}

impl From<Recipients> for Vec<String> {
    fn from(recipients: Recipients) -> Self {
        match recipients {
            Recipients::One(address) => vec![address],
            Recipients::Many(addresses) => addresses,
        }
    }
}

/// Arguments of `compose`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ComposeArgs {
    pub to: Recipients,
    pub cc: Recipients,
    pub subject: String,
    pub body: String,
    pub attachment: Option<String>,
}

/// Reply of `updateStatus`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatus {
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<u64>,
    /// Download status of the current or last request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_status: Option<FetchStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requested_at: Option<DateTime<Utc>>,
}

impl UpdateStatus {
    pub fn of(updater: &UpdateOrchestrator) -> Self {
        let request = updater.active_request();
        let task = updater.last_task();
        Self {
            state: updater.state().as_str().to_string(),
            task_id: task.as_ref().map(|t| t.id.0),
            task_status: task.map(|t| t.status),
            url: request.as_ref().map(|r| r.url.clone()),
            requested_at: request.map(|r| r.requested_at),
        }
    }
}

/// An [`UpdateEvent`] as pushed on the event channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EventPayload {
    StateChanged {
        state: String,
    },
    PermissionRedirect {
        action: String,
        target: String,
    },
    #[serde(rename_all = "camelCase")]
    Enqueued {
        task_id: u64,
        url: String,
    },
    Finished {
        outcome: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

impl From<&UpdateEvent> for EventPayload {
    fn from(event: &UpdateEvent) -> Self {
        match event {
            UpdateEvent::StateChanged(state) => EventPayload::StateChanged {
                state: state.as_str().to_string(),
            },
            UpdateEvent::PermissionRedirect(redirect) => EventPayload::PermissionRedirect {
                action: redirect.action.clone(),
                target: redirect.target.clone(),
            },
            UpdateEvent::Enqueued { task_id, url } => EventPayload::Enqueued {
                task_id: task_id.0,
                url: url.clone(),
            },
            UpdateEvent::Finished(outcome) => {
                let (outcome, error) = match outcome {
                    UpdateOutcome::HandedOff => ("handed_off", None),
                    UpdateOutcome::PermissionDenied => ("permission_denied", None),
                    UpdateOutcome::Cancelled => ("cancelled", None),
                    UpdateOutcome::Failed(e) => ("failed", Some(e)),
                };
                EventPayload::Finished {
                    outcome: outcome.to_string(),
                    code: error.map(|e| e.code().to_string()),
                    message: error.map(|e| e.to_string()),
                }
            }
        }
    }
}
