//! Desktop backend for the platform traits.
//!
//! Downloads run over HTTP on the tokio runtime, share grants are random
//! tokens held in memory, and "installing" opens the package with the
//! desktop's default handler.

mod documents;
mod download;
mod notify;
mod share;
mod system;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use directories::{ProjectDirs, UserDirs};
use tracing::info;

pub use documents::FsDocumentStore;
pub use download::HttpDownloadFacility;
pub use share::TokenFileShare;
pub use system::{ConfiguredInstallPermissions, NoBiometrics, OpenInstaller, SystemOpener};

use crate::biometric::BiometricAuthenticator;
use crate::export::DocumentStore;
use crate::platform::{Platform, PlatformError, UriOpener};
use crate::settings::HostSettings;

/// Returns the project directories for Hostlink.
pub fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "hostlink", "Hostlink")
}

/// Default download directory: the platform cache dir, else the temp dir.
pub fn default_download_dir() -> PathBuf {
    project_dirs()
        .map(|dirs| dirs.cache_dir().join("downloads"))
        .unwrap_or_else(|| std::env::temp_dir().join("hostlink-downloads"))
}

/// Default documents root: the user's home, so files land in `~/Documents`.
pub fn default_documents_root() -> PathBuf {
    UserDirs::new()
        .map(|dirs| dirs.home_dir().to_path_buf())
        .or_else(|| project_dirs().map(|dirs| dirs.data_dir().to_path_buf()))
        .unwrap_or_else(std::env::temp_dir)
}

/// All desktop facilities, wired from [`HostSettings`].
#[derive(Clone)]
pub struct DesktopPlatform {
    permissions: Arc<ConfiguredInstallPermissions>,
    downloads: Arc<HttpDownloadFacility>,
    share: Arc<TokenFileShare>,
    installer: Arc<OpenInstaller>,
    documents: Arc<FsDocumentStore>,
    opener: Arc<SystemOpener>,
    biometrics: Arc<NoBiometrics>,
}

impl std::fmt::Debug for DesktopPlatform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DesktopPlatform")
            .field("download_dir", &self.downloads.download_dir())
            .field("documents_root", &self.documents.root())
            .field("share_authority", &self.share.authority())
            .finish()
    }
}

impl DesktopPlatform {
    /// Builds the desktop backend. Must be called from within a tokio runtime.
    pub fn new(settings: &HostSettings) -> Result<Self, PlatformError> {
        let download_dir = settings
            .download_dir
            .clone()
            .unwrap_or_else(default_download_dir);
        let documents_root = settings
            .documents_dir
            .clone()
            .unwrap_or_else(default_documents_root);

        Self::with_dirs(settings, &download_dir, &documents_root)
    }

    pub fn with_dirs(
        settings: &HostSettings,
        download_dir: &Path,
        documents_root: &Path,
    ) -> Result<Self, PlatformError> {
        let share = Arc::new(TokenFileShare::new(
            settings.updater.share_authority(&settings.app_id),
        ));

        let platform = Self {
            permissions: Arc::new(ConfiguredInstallPermissions::new(
                settings.allow_package_installs,
            )),
            downloads: Arc::new(HttpDownloadFacility::new(download_dir)?),
            installer: Arc::new(OpenInstaller::new(share.clone())),
            share,
            documents: Arc::new(FsDocumentStore::new(documents_root)),
            opener: Arc::new(SystemOpener),
            biometrics: Arc::new(NoBiometrics),
        };

        info!(
            download_dir = %download_dir.display(),
            documents_root = %documents_root.display(),
            "Desktop platform ready"
        );
        Ok(platform)
    }

    /// Facilities for the update flow.
    pub fn platform(&self) -> Platform {
        Platform {
            permissions: self.permissions.clone(),
            downloads: self.downloads.clone(),
            files: self.share.clone(),
            installer: self.installer.clone(),
        }
    }

    pub fn permissions(&self) -> &Arc<ConfiguredInstallPermissions> {
        &self.permissions
    }

    pub fn document_store(&self) -> Arc<dyn DocumentStore> {
        self.documents.clone()
    }

    pub fn uri_opener(&self) -> Arc<dyn UriOpener> {
        self.opener.clone()
    }

    pub fn biometrics(&self) -> Arc<dyn BiometricAuthenticator> {
        self.biometrics.clone()
    }
}
