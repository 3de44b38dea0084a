//! Hand-off to the OS package installer.

use std::fmt;
use std::sync::Arc;

use tracing::{info, warn};

use crate::error::Result;
use crate::platform::{InstallRequest, PackageInstaller};
use crate::update::share::SharedReference;

/// Starts the OS installer for a shared artifact.
#[derive(Clone)]
pub struct InstallLauncher {
    installer: Arc<dyn PackageInstaller>,
}

impl fmt::Debug for InstallLauncher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstallLauncher").finish_non_exhaustive()
    }
}

impl InstallLauncher {
    pub fn new(installer: Arc<dyn PackageInstaller>) -> Self {
        Self { installer }
    }

    /// Asks the OS to install the referenced artifact.
    ///
    /// Returns once the OS accepted the request; the install itself is owned
    /// by the OS from then on. Fails with `NoInstallerAvailable` if nothing
    /// can handle it.
    pub fn launch(&self, reference: &SharedReference) -> Result<()> {
        let request = InstallRequest {
            uri: reference.uri().clone(),
            mime_type: reference.mime_type().to_string(),
            grant_read_uri: true,
            new_task: true,
        };

        match self.installer.start_install(&request) {
            Ok(()) => {
                info!(uri = %request.uri, mime_type = %request.mime_type, "Installer accepted update");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Installer rejected update");
                Err(e.into())
            }
        }
    }
}
