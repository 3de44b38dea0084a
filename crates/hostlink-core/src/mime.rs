//! Content types derived from file names.

/// Android package archive.
pub const PACKAGE_ARCHIVE: &str = "application/vnd.android.package-archive";
pub const PDF: &str = "application/pdf";
pub const CSV: &str = "text/csv";
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Returns the content type for a file name, by extension.
///
/// Unknown or missing extensions map to `application/octet-stream`.
pub fn for_file_name(name: &str) -> &'static str {
    let ext = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => ext.to_ascii_lowercase(),
        _ => return OCTET_STREAM,
    };

    match ext.as_str() {
        "apk" => PACKAGE_ARCHIVE,
        "pdf" => PDF,
        "csv" => CSV,
        _ => OCTET_STREAM,
    }
}

/// Returns true if files of this type can be handed to the package installer.
pub fn is_installable(mime_type: &str) -> bool {
    mime_type == PACKAGE_ARCHIVE
}
