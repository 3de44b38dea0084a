//! Read-scoped shared references to downloaded artifacts.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::error::{Result, UpdateError};
use crate::platform::{FileShare, PlatformError, ShareUri};
use crate::update::completion::Artifact;

/// Access granted through a [`SharedReference`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantScope {
    ReadOnly,
}

/// A capability to read one artifact.
///
/// Only [`SecureShareResolver::wrap`] creates these. The reference carries a
/// content URI and a content type but never the file path, and it is neither
/// `Clone` nor serializable. Dropping it revokes the grant.
pub struct SharedReference {
    uri: ShareUri,
    mime_type: String,
    scope: GrantScope,
    files: Arc<dyn FileShare>,
}

impl SharedReference {
    pub fn uri(&self) -> &ShareUri {
        &self.uri
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn scope(&self) -> GrantScope {
        self.scope
    }
}

impl fmt::Debug for SharedReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedReference")
            .field("uri", &self.uri)
            .field("mime_type", &self.mime_type)
            .field("scope", &self.scope)
            .finish()
    }
}

impl Drop for SharedReference {
    fn drop(&mut self) {
        debug!(uri = %self.uri, "Revoking shared reference");
        self.files.revoke(&self.uri);
    }
}

/// Wraps local artifacts into shared references.
#[derive(Clone)]
pub struct SecureShareResolver {
    files: Arc<dyn FileShare>,
}

impl fmt::Debug for SecureShareResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecureShareResolver").finish_non_exhaustive()
    }
}

impl SecureShareResolver {
    pub fn new(files: Arc<dyn FileShare>) -> Self {
        Self { files }
    }

    /// Grants read-only access to `artifact`.
    ///
    /// Fails with `FileNotFound` if the file does not exist right now.
    pub fn wrap(&self, artifact: &Artifact) -> Result<SharedReference> {
        let path = &artifact.local_path;
        if !path.is_file() {
            return Err(UpdateError::FileNotFound(path.clone()));
        }

        let uri = self
            .files
            .grant_read(path, &artifact.mime_type)
            .map_err(|e| match e {
                PlatformError::NotFound(_) => UpdateError::FileNotFound(path.clone()),
                other => UpdateError::Platform(other.to_string()),
            })?;
        debug!(uri = %uri, "Granted read access to artifact");

        Ok(SharedReference {
            uri,
            mime_type: artifact.mime_type.clone(),
            scope: GrantScope::ReadOnly,
            files: self.files.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mime;
    use crate::testing::FakePlatform;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn artifact(path: PathBuf) -> Artifact {
        Artifact {
            local_path: path,
            mime_type: mime::PACKAGE_ARCHIVE.to_string(),
        }
    }

    #[test]
    fn wrap_grants_read_only_reference() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("update.apk");
        std::fs::write(&path, b"apk").unwrap();

        let fake = FakePlatform::new();
        let resolver = SecureShareResolver::new(fake.clone());
        let reference = resolver.wrap(&artifact(path.clone())).unwrap();

        assert_eq!(reference.scope(), GrantScope::ReadOnly);
        assert_eq!(reference.mime_type(), mime::PACKAGE_ARCHIVE);
        assert!(!reference.uri().as_str().contains(dir.path().to_str().unwrap()));
        assert_eq!(fake.granted_path(reference.uri()), Some(path));
    }

    #[test]
    fn missing_file_is_file_not_found() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gone.apk");

        let fake = FakePlatform::new();
        let resolver = SecureShareResolver::new(fake.clone());
        let err = resolver.wrap(&artifact(path.clone())).unwrap_err();

        assert_eq!(err, UpdateError::FileNotFound(path));
        assert_eq!(fake.active_grants(), 0);
    }

    #[test]
    fn dropping_reference_revokes_grant() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("update.apk");
        std::fs::write(&path, b"apk").unwrap();

        let fake = FakePlatform::new();
        let resolver = SecureShareResolver::new(fake.clone());
        let reference = resolver.wrap(&artifact(path)).unwrap();
        let uri = reference.uri().clone();
        assert_eq!(fake.active_grants(), 1);

        drop(reference);
        assert_eq!(fake.active_grants(), 0);
        assert_eq!(fake.granted_path(&uri), None);
    }

    #[test]
    fn debug_output_has_no_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("secret-name.apk");
        std::fs::write(&path, b"apk").unwrap();

        let fake = FakePlatform::new();
        let reference = SecureShareResolver::new(fake.clone())
            .wrap(&artifact(path))
            .unwrap();

        assert!(!format!("{reference:?}").contains("secret-name"));
    }
}
