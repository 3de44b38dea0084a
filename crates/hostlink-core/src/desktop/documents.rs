//! Documents collection on the local filesystem.

use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};

use crate::export::{DocumentEntry, DocumentStore};
use crate::platform::PlatformError;

/// Stores documents as files under `<root>/<folder>/`.
///
/// Locations are file paths. An existing file is never overwritten: a
/// numbered name such as `report (1).pdf` is picked instead.
#[derive(Debug, Clone)]
pub struct FsDocumentStore {
    root: PathBuf,
}

impl FsDocumentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// `report.pdf` -> `report (n).pdf`
fn numbered(name: &str, n: u32) -> String {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{stem} ({n}).{ext}"),
        _ => format!("{name} ({n})"),
    }
}

impl DocumentStore for FsDocumentStore {
    fn insert(&self, entry: &DocumentEntry) -> Result<String, PlatformError> {
        let folder = self.root.join(&entry.folder);
        std::fs::create_dir_all(&folder)?;

        let mut candidate = folder.join(&entry.display_name);
        let mut n = 0;
        loop {
            match OpenOptions::new().write(true).create_new(true).open(&candidate) {
                Ok(_) => return Ok(candidate.to_string_lossy().into_owned()),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists && n < 1000 => {
                    n += 1;
                    candidate = folder.join(numbered(&entry.display_name, n));
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn write(&self, location: &str, bytes: &[u8]) -> Result<(), PlatformError> {
        std::fs::write(location, bytes)?;
        Ok(())
    }

    fn delete(&self, location: &str) -> Result<(), PlatformError> {
        match std::fs::remove_file(location) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
