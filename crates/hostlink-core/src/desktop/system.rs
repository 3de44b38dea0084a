//! Desktop stand-ins for system services.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use super::share::TokenFileShare;
use crate::biometric::{BiometricAuthenticator, BiometricPrompt, BiometricStatus};
use crate::mime;
use crate::platform::{
    InstallPermissions, InstallRequest, PackageInstaller, PlatformError, SettingsRedirect,
    UriOpener,
};

/// Install permission taken from configuration instead of an OS policy.
#[derive(Debug)]
pub struct ConfiguredInstallPermissions {
    allowed: AtomicBool,
}

impl ConfiguredInstallPermissions {
    pub fn new(allowed: bool) -> Self {
        Self {
            allowed: AtomicBool::new(allowed),
        }
    }

    /// Changes the answer, as the user would on the settings screen.
    pub fn set_allowed(&self, allowed: bool) {
        self.allowed.store(allowed, Ordering::SeqCst);
    }
}

impl InstallPermissions for ConfiguredInstallPermissions {
    fn can_request_package_installs(&self) -> Result<bool, PlatformError> {
        Ok(self.allowed.load(Ordering::SeqCst))
    }

    fn open_settings(&self, redirect: &SettingsRedirect) -> Result<(), PlatformError> {
        info!(
            action = %redirect.action,
            screen = %redirect.target,
            "Package installs are disabled; enable allow_package_installs in settings"
        );
        Ok(())
    }
}

/// Hands shared files to whatever the desktop associates with them.
pub struct OpenInstaller {
    share: Arc<TokenFileShare>,
}

impl OpenInstaller {
    pub fn new(share: Arc<TokenFileShare>) -> Self {
        Self { share }
    }
}

impl PackageInstaller for OpenInstaller {
    fn start_install(&self, request: &InstallRequest) -> Result<(), PlatformError> {
        if !mime::is_installable(&request.mime_type) {
            warn!(mime_type = %request.mime_type, "Opening a file that is not a package archive");
        }

        let (path, _) = self
            .share
            .resolve(&request.uri)
            .ok_or_else(|| PlatformError::Rejected(format!("no live grant for {}", request.uri)))?;

        open::that_detached(&path).map_err(|e| {
            warn!(error = %e, mime_type = %request.mime_type, "No application to open the package");
            PlatformError::NoHandler(request.mime_type.clone())
        })?;

        info!(uri = %request.uri, "Package handed to the system");
        Ok(())
    }
}

/// Opens URIs with the desktop's default handler.
#[derive(Debug, Default)]
pub struct SystemOpener;

impl UriOpener for SystemOpener {
    fn open_uri(&self, uri: &str) -> Result<(), PlatformError> {
        open::that_detached(uri).map_err(|e| {
            warn!(error = %e, "No handler for URI");
            PlatformError::NoHandler(uri.split(':').next().unwrap_or(uri).to_string())
        })
    }
}

/// Desktop machines get no biometric hardware.
#[derive(Debug, Default)]
pub struct NoBiometrics;

#[async_trait]
impl BiometricAuthenticator for NoBiometrics {
    fn status(&self) -> BiometricStatus {
        BiometricStatus::NoHardware
    }

    async fn prompt(&self, _prompt: &BiometricPrompt) -> Result<bool, PlatformError> {
        Err(PlatformError::Unsupported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::ShareUri;

    #[test]
    fn configured_permission_can_change() {
        let permissions = ConfiguredInstallPermissions::new(false);
        assert!(!permissions.can_request_package_installs().unwrap());

        permissions.set_allowed(true);
        assert!(permissions.can_request_package_installs().unwrap());
    }

    #[test]
    fn installer_rejects_unknown_uri() {
        let installer = OpenInstaller::new(Arc::new(TokenFileShare::new("auth")));
        let request = InstallRequest {
            uri: ShareUri::new("content://auth/deadbeef"),
            mime_type: crate::mime::PACKAGE_ARCHIVE.to_string(),
            grant_read_uri: true,
            new_task: true,
        };

        assert!(matches!(
            installer.start_install(&request),
            Err(PlatformError::Rejected(_))
        ));
    }

    #[tokio::test]
    async fn no_biometrics() {
        assert_eq!(NoBiometrics.status(), BiometricStatus::NoHardware);
        assert!(NoBiometrics.prompt(&BiometricPrompt::default()).await.is_err());
    }
}
