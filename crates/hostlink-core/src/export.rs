//! Saving generated documents (reports) to the shared documents collection.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::mime;
use crate::platform::PlatformError;

/// Collection folder exported documents are filed under.
pub const DOCUMENTS_FOLDER: &str = "Documents";

/// Errors that can occur while exporting a document.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("invalid file name: {0:?}")]
    InvalidFileName(String),

    #[error("failed to create document record: {0}")]
    Insert(PlatformError),

    #[error("failed to write document: {0}")]
    Write(PlatformError),
}

/// Metadata for a new document record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentEntry {
    pub display_name: String,
    pub mime_type: String,
    pub folder: String,
}

/// A documents collection (media store, documents folder).
pub trait DocumentStore: Send + Sync {
    /// Creates an empty record and returns its location reference.
    fn insert(&self, entry: &DocumentEntry) -> Result<String, PlatformError>;

    fn write(&self, location: &str, bytes: &[u8]) -> Result<(), PlatformError>;

    fn delete(&self, location: &str) -> Result<(), PlatformError>;
}

/// Writes documents into a [`DocumentStore`].
#[derive(Clone)]
pub struct DocumentExporter {
    store: Arc<dyn DocumentStore>,
}

impl fmt::Debug for DocumentExporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentExporter").finish_non_exhaustive()
    }
}

impl DocumentExporter {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Saves `bytes` as `file_name` and returns the new record's location.
    ///
    /// If writing fails, the half-created record is deleted so no empty
    /// entry is left behind.
    pub fn save(&self, file_name: &str, bytes: &[u8]) -> Result<String, ExportError> {
        let name = file_name.trim();
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(ExportError::InvalidFileName(file_name.to_string()));
        }

        let entry = DocumentEntry {
            display_name: name.to_string(),
            mime_type: mime::for_file_name(name).to_string(),
            folder: DOCUMENTS_FOLDER.to_string(),
        };

        let location = self.store.insert(&entry).map_err(ExportError::Insert)?;

        if let Err(e) = self.store.write(&location, bytes) {
            if let Err(cleanup) = self.store.delete(&location) {
                warn!(location = %location, error = %cleanup, "Failed to remove orphaned document record");
            }
            return Err(ExportError::Write(e));
        }

        info!(
            location = %location,
            mime_type = %entry.mime_type,
            size = bytes.len(),
            "Document exported"
        );
        Ok(location)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeDocumentStore;

    #[test]
    fn save_records_type_and_folder() {
        let store = FakeDocumentStore::new();
        let exporter = DocumentExporter::new(store.clone());

        let location = exporter.save("attendance.pdf", b"%PDF-1.7").unwrap();

        let entries = store.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0, location);
        assert_eq!(entries[0].1.mime_type, mime::PDF);
        assert_eq!(entries[0].1.folder, DOCUMENTS_FOLDER);
        assert_eq!(store.contents(&location), Some(b"%PDF-1.7".to_vec()));
    }

    #[test]
    fn csv_and_unknown_types() {
        let store = FakeDocumentStore::new();
        let exporter = DocumentExporter::new(store.clone());

        exporter.save("report.csv", b"a,b").unwrap();
        exporter.save("report.xlsx", b"zip").unwrap();

        let types: Vec<String> = store.entries().into_iter().map(|(_, e)| e.mime_type).collect();
        assert_eq!(types, vec![mime::CSV.to_string(), mime::OCTET_STREAM.to_string()]);
    }

    #[test]
    fn write_failure_removes_orphan_record() {
        let store = FakeDocumentStore::new();
        store.fail_writes(true);
        let exporter = DocumentExporter::new(store.clone());

        let err = exporter.save("report.pdf", b"data").unwrap_err();

        assert!(matches!(err, ExportError::Write(_)));
        assert!(store.entries().is_empty());
        assert_eq!(store.deleted().len(), 1);
    }

    #[test]
    fn insert_failure_is_reported() {
        let store = FakeDocumentStore::new();
        store.fail_inserts(true);
        let exporter = DocumentExporter::new(store.clone());

        let err = exporter.save("report.pdf", b"data").unwrap_err();
        assert!(matches!(err, ExportError::Insert(_)));
        assert!(store.deleted().is_empty());
    }

    #[test]
    fn rejects_path_like_names() {
        let store = FakeDocumentStore::new();
        let exporter = DocumentExporter::new(store.clone());

        for bad in ["", "  ", "../escape.pdf", "dir/report.pdf", "a\\b.csv", ".."] {
            assert!(
                matches!(exporter.save(bad, b"x"), Err(ExportError::InvalidFileName(_))),
                "{bad}"
            );
        }
        assert!(store.entries().is_empty());
    }
}
