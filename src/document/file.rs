use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use super::AttendanceDocument;

#[derive(Debug, Error)]
pub enum DocumentFileError {
    #[error("failed to read {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("failed to write {path}: {source}")]
    Write { path: PathBuf, source: std::io::Error },
    #[error("{path} does not contain a valid attendance document: {source}")]
    Parse { path: PathBuf, source: serde_json::Error },
    #[error("failed to encode attendance document: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Loads the attendance document from a JSON file.
///
/// A missing file is not an error: it yields an empty document, which is
/// how a fresh installation starts.
pub fn load_document<P: AsRef<Path>>(path: P) -> Result<AttendanceDocument, DocumentFileError> {
    let path = path.as_ref();
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(AttendanceDocument::default()),
        Err(source) => return Err(DocumentFileError::Read { path: path.to_path_buf(), source }),
    };

    serde_json::from_str(&raw).map_err(|source| DocumentFileError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Overwrites the data file with the pretty-printed document.
///
/// The document is written to a sibling temp file, synced, then renamed over
/// the target so a crash never leaves a half-written file behind.
pub fn save_document<P: AsRef<Path>>(path: P, document: &AttendanceDocument) -> Result<(), DocumentFileError> {
    let path = path.as_ref();
    let json = serde_json::to_string_pretty(document)?;

    let mut tmp_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    write_then_rename(&tmp_path, path, json.as_bytes()).map_err(|source| {
        // best effort, the original error is what gets reported
        let _ = fs::remove_file(&tmp_path);
        DocumentFileError::Write { path: path.to_path_buf(), source }
    })
}

fn write_then_rename(tmp_path: &Path, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = File::create(tmp_path)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);
    fs::rename(tmp_path, path)
}
