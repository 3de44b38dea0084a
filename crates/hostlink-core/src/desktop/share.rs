//! Token-addressed file grants.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use rand::Rng;
use tracing::debug;

use crate::platform::{FileShare, PlatformError, ShareUri};

struct Grant {
    path: PathBuf,
    mime_type: String,
}

/// Issues `content://<authority>/<token>` URIs for local files.
///
/// A URI carries only a random token; the file behind it is known to this
/// registry alone and stays reachable until the grant is revoked.
pub struct TokenFileShare {
    authority: String,
    grants: Mutex<HashMap<String, Grant>>,
}

impl TokenFileShare {
    pub fn new(authority: impl Into<String>) -> Self {
        Self {
            authority: authority.into(),
            grants: Mutex::new(HashMap::new()),
        }
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    /// Resolves a live grant to its file and MIME type.
    pub fn resolve(&self, uri: &ShareUri) -> Option<(PathBuf, String)> {
        let token = self.token(uri)?;
        self.grants()
            .get(token)
            .map(|g| (g.path.clone(), g.mime_type.clone()))
    }

    pub fn active_grants(&self) -> usize {
        self.grants().len()
    }

    fn token<'a>(&self, uri: &'a ShareUri) -> Option<&'a str> {
        uri.as_str()
            .strip_prefix("content://")?
            .strip_prefix(self.authority.as_str())?
            .strip_prefix('/')
    }

    fn grants(&self) -> MutexGuard<'_, HashMap<String, Grant>> {
        self.grants.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl FileShare for TokenFileShare {
    fn grant_read(&self, path: &Path, mime_type: &str) -> Result<ShareUri, PlatformError> {
        if !path.is_file() {
            return Err(PlatformError::NotFound(path.to_path_buf()));
        }

        let token = format!("{:032x}", rand::thread_rng().gen::<u128>());
        let uri = ShareUri::new(format!("content://{}/{}", self.authority, token));

        self.grants().insert(
            token,
            Grant {
                path: path.to_path_buf(),
                mime_type: mime_type.to_string(),
            },
        );
        debug!(uri = %uri, "Read grant issued");
        Ok(uri)
    }

    fn revoke(&self, uri: &ShareUri) {
        if let Some(token) = self.token(uri) {
            if self.grants().remove(token).is_some() {
                debug!(uri = %uri, "Read grant revoked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mime;
    use tempfile::TempDir;

    fn file(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("update.apk");
        std::fs::write(&path, b"apk").unwrap();
        path
    }

    #[test]
    fn uri_hides_path_and_resolves() {
        let dir = TempDir::new().unwrap();
        let path = file(&dir);
        let share = TokenFileShare::new("com.example.app.fileprovider");

        let uri = share.grant_read(&path, mime::PACKAGE_ARCHIVE).unwrap();

        assert!(uri.as_str().starts_with("content://com.example.app.fileprovider/"));
        assert!(!uri.as_str().contains("update.apk"));
        assert_eq!(
            share.resolve(&uri),
            Some((path, mime::PACKAGE_ARCHIVE.to_string()))
        );
    }

    #[test]
    fn tokens_are_unique() {
        let dir = TempDir::new().unwrap();
        let path = file(&dir);
        let share = TokenFileShare::new("auth");

        let a = share.grant_read(&path, mime::PACKAGE_ARCHIVE).unwrap();
        let b = share.grant_read(&path, mime::PACKAGE_ARCHIVE).unwrap();
        assert_ne!(a, b);
        assert_eq!(share.active_grants(), 2);
    }

    #[test]
    fn revoke_ends_access() {
        let dir = TempDir::new().unwrap();
        let share = TokenFileShare::new("auth");
        let uri = share.grant_read(&file(&dir), mime::PACKAGE_ARCHIVE).unwrap();

        share.revoke(&uri);
        assert_eq!(share.resolve(&uri), None);
        assert_eq!(share.active_grants(), 0);
    }

    #[test]
    fn foreign_authority_does_not_resolve() {
        let dir = TempDir::new().unwrap();
        let share = TokenFileShare::new("auth");
        let uri = share.grant_read(&file(&dir), mime::PACKAGE_ARCHIVE).unwrap();

        let token = uri.as_str().rsplit('/').next().unwrap();
        let forged = ShareUri::new(format!("content://other/{token}"));
        assert_eq!(share.resolve(&forged), None);
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = TempDir::new().unwrap();
        let share = TokenFileShare::new("auth");
        let err = share
            .grant_read(&dir.path().join("nope.apk"), mime::PACKAGE_ARCHIVE)
            .unwrap_err();
        assert!(matches!(err, PlatformError::NotFound(_)));
    }
}
