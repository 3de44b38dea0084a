//! Biometric gate.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::platform::PlatformError;

/// Whether the device can authenticate with a biometric right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BiometricStatus {
    Available,
    NoHardware,
    /// Hardware exists but is busy or disabled.
    HardwareUnavailable,
    NoneEnrolled,
    Unknown,
}

impl BiometricStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::NoHardware => "no_hardware",
            Self::HardwareUnavailable => "hardware_unavailable",
            Self::NoneEnrolled => "none_enrolled",
            Self::Unknown => "unknown",
        }
    }
}

/// Text shown by the system biometric prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BiometricPrompt {
    pub title: String,
    pub subtitle: Option<String>,
    pub negative_label: String,
}

impl Default for BiometricPrompt {
    fn default() -> Self {
        Self {
            title: "Authenticate".to_string(),
            subtitle: None,
            negative_label: "Cancel".to_string(),
        }
    }
}

/// Platform biometric API.
#[async_trait]
pub trait BiometricAuthenticator: Send + Sync {
    fn status(&self) -> BiometricStatus;

    /// Shows the system prompt and resolves once the user finished with it.
    async fn prompt(&self, prompt: &BiometricPrompt) -> Result<bool, PlatformError>;
}

/// Single capability check plus one authentication request.
#[derive(Clone)]
pub struct BiometricGate {
    authenticator: Arc<dyn BiometricAuthenticator>,
    prompt: BiometricPrompt,
}

impl fmt::Debug for BiometricGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BiometricGate")
            .field("prompt", &self.prompt)
            .finish_non_exhaustive()
    }
}

impl BiometricGate {
    pub fn new(authenticator: Arc<dyn BiometricAuthenticator>) -> Self {
        Self {
            authenticator,
            prompt: BiometricPrompt::default(),
        }
    }

    pub fn can_authenticate(&self) -> BiometricStatus {
        self.authenticator.status()
    }

    /// Returns true only if the user passed the biometric prompt.
    ///
    /// The prompt is not shown unless biometrics are available; any platform
    /// error counts as a failed authentication.
    pub async fn authenticate(&self) -> bool {
        let status = self.authenticator.status();
        if status != BiometricStatus::Available {
            debug!(status = status.as_str(), "Biometric authentication unavailable");
            return false;
        }

        match self.authenticator.prompt(&self.prompt).await {
            Ok(passed) => passed,
            Err(e) => {
                warn!(error = %e, "Biometric prompt failed");
                false
            }
        }
    }
}
