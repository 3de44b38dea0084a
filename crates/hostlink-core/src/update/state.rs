//! Update state machine types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::UpdateError;
use crate::platform::{SettingsRedirect, TaskId};

/// States of an update request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateState {
    #[default]
    Idle,
    CheckingPermission,
    PermissionDenied,
    Fetching,
    AwaitingCompletion,
    FetchFailed,
    Resolving,
    Installing,
    InstallFailed,
    HandedOff,
    Cancelled,
}

impl UpdateState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::CheckingPermission => "checking_permission",
            Self::PermissionDenied => "permission_denied",
            Self::Fetching => "fetching",
            Self::AwaitingCompletion => "awaiting_completion",
            Self::FetchFailed => "fetch_failed",
            Self::Resolving => "resolving",
            Self::Installing => "installing",
            Self::InstallFailed => "install_failed",
            Self::HandedOff => "handed_off",
            Self::Cancelled => "cancelled",
        }
    }

    /// Returns whether a request ends in this state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::PermissionDenied
                | Self::FetchFailed
                | Self::InstallFailed
                | Self::HandedOff
                | Self::Cancelled
        )
    }

    /// Returns whether no request is in flight, so a new one may start.
    pub fn is_settled(&self) -> bool {
        *self == Self::Idle || self.is_terminal()
    }

    /// Returns whether a request in this state can still be cancelled.
    pub fn is_cancellable(&self) -> bool {
        matches!(self, Self::AwaitingCompletion | Self::Resolving)
    }
}

impl std::fmt::Display for UpdateState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One call to start an update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateRequest {
    pub url: String,
    pub requested_at: DateTime<Utc>,
}

impl UpdateRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            requested_at: Utc::now(),
        }
    }
}

/// How a request ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The OS installer accepted the artifact.
    HandedOff,
    /// Install permission was missing; the settings redirect was emitted.
    PermissionDenied,
    Failed(UpdateError),
    Cancelled,
}

/// Published on the orchestrator's event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateEvent {
    StateChanged(UpdateState),
    PermissionRedirect(SettingsRedirect),
    Enqueued { task_id: TaskId, url: String },
    Finished(UpdateOutcome),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_state_is_idle() {
        assert_eq!(UpdateState::default(), UpdateState::Idle);
        assert!(UpdateState::Idle.is_settled());
        assert!(!UpdateState::Idle.is_terminal());
    }

    #[test]
    fn terminal_states() {
        for state in [
            UpdateState::PermissionDenied,
            UpdateState::FetchFailed,
            UpdateState::InstallFailed,
            UpdateState::HandedOff,
            UpdateState::Cancelled,
        ] {
            assert!(state.is_terminal(), "{state}");
            assert!(state.is_settled(), "{state}");
            assert!(!state.is_cancellable(), "{state}");
        }
    }

    #[test]
    fn in_flight_states_are_not_settled() {
        for state in [
            UpdateState::CheckingPermission,
            UpdateState::Fetching,
            UpdateState::AwaitingCompletion,
            UpdateState::Resolving,
            UpdateState::Installing,
        ] {
            assert!(!state.is_settled(), "{state}");
        }
        assert!(UpdateState::AwaitingCompletion.is_cancellable());
        assert!(UpdateState::Resolving.is_cancellable());
        assert!(!UpdateState::Fetching.is_cancellable());
        // The installer owns the package once launched.
        assert!(!UpdateState::Installing.is_cancellable());
    }

    #[test]
    fn display_matches_serde_name() {
        let json = serde_json::to_string(&UpdateState::AwaitingCompletion).unwrap();
        assert_eq!(json, format!("\"{}\"", UpdateState::AwaitingCompletion));
    }
}
