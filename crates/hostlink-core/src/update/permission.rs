//! Install permission checks.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::platform::{InstallPermissions, SettingsRedirect};

/// Settings screen listing apps allowed to install unknown packages.
pub const MANAGE_UNKNOWN_APP_SOURCES: &str = "android.settings.MANAGE_UNKNOWN_APP_SOURCES";

/// Whether the process may request package installs.
///
/// Derived fresh on every check and never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionState {
    /// The platform could not answer.
    Unknown,
    Granted,
    Denied,
}

/// Checks install permission and builds the redirect used when it is missing.
#[derive(Clone)]
pub struct PermissionGate {
    permissions: Arc<dyn InstallPermissions>,
    app_id: String,
}

impl fmt::Debug for PermissionGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PermissionGate")
            .field("app_id", &self.app_id)
            .finish_non_exhaustive()
    }
}

impl PermissionGate {
    pub fn new(permissions: Arc<dyn InstallPermissions>, app_id: impl Into<String>) -> Self {
        Self {
            permissions,
            app_id: app_id.into(),
        }
    }

    /// Queries the platform. No side effects.
    pub fn check(&self) -> PermissionState {
        match self.permissions.can_request_package_installs() {
            Ok(true) => PermissionState::Granted,
            Ok(false) => PermissionState::Denied,
            Err(e) => {
                warn!(error = %e, "Install permission query failed");
                PermissionState::Unknown
            }
        }
    }

    /// The settings screen where the user can grant install permission to this app.
    pub fn redirect_action(&self) -> SettingsRedirect {
        SettingsRedirect {
            action: MANAGE_UNKNOWN_APP_SOURCES.to_string(),
            target: format!("package:{}", self.app_id),
        }
    }

    /// Opens the redirect. Fire-and-forget: a failure to open is logged, not returned.
    pub fn emit_redirect(&self) -> SettingsRedirect {
        let redirect = self.redirect_action();
        info!(target_id = %redirect.target, "Redirecting to install permission settings");
        if let Err(e) = self.permissions.open_settings(&redirect) {
            warn!(error = %e, "Failed to open install permission settings");
        }
        redirect
    }
}
