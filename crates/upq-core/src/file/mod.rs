//! File records: the immutable file handle and its mutable upload lifecycle.
//!
//! Records are only mutated by the scheduler; everything outside the crate
//! sees them through shared references.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Identifier of a record inside one scheduler. Ids are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(pub(crate) u64);

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Where the bytes of a file live.
#[derive(Debug, Clone)]
pub enum FileSource {
    Memory(Arc<[u8]>),
    Disk(PathBuf),
}

/// Name, size and payload of one file. Immutable once added.
#[derive(Debug, Clone)]
pub struct UploadFile {
    name: String,
    size: u64,
    source: FileSource,
}

impl UploadFile {
    /// In-memory file; size is the payload length.
    pub fn from_bytes(name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        let bytes: Arc<[u8]> = bytes.into();
        Self {
            name: name.into(),
            size: bytes.len() as u64,
            source: FileSource::Memory(bytes),
        }
    }

    /// File on disk. Size is taken from metadata now; bytes are read at upload time.
    pub fn from_path(path: &Path) -> io::Result<Self> {
        let meta = fs::metadata(path)?;
        if !meta.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("not a regular file: {}", path.display()),
            ));
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self {
            name,
            size: meta.len(),
            source: FileSource::Disk(path.to_path_buf()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn source(&self) -> &FileSource {
        &self.source
    }

    /// Read the full payload.
    pub fn read(&self) -> io::Result<Vec<u8>> {
        match &self.source {
            FileSource::Memory(bytes) => Ok(bytes.to_vec()),
            FileSource::Disk(path) => fs::read(path),
        }
    }
}

/// Upload state of one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileState {
    Pending,
    Uploading,
    Uploaded,
    Errored,
    Stopped,
}

impl FileState {
    pub fn as_str(self) -> &'static str {
        match self {
            FileState::Pending => "pending",
            FileState::Uploading => "uploading",
            FileState::Uploaded => "uploaded",
            FileState::Errored => "errored",
            FileState::Stopped => "stopped",
        }
    }

    /// Pending or uploading: the record still holds its batch open.
    pub fn is_active(self) -> bool {
        matches!(self, FileState::Pending | FileState::Uploading)
    }
}

impl fmt::Display for FileState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const FALLBACK_ERROR: &str = "upload failed";

/// One file's upload lifecycle.
#[derive(Debug, Clone)]
pub struct FileRecord {
    id: FileId,
    file: UploadFile,
    state: FileState,
    batch: Option<u32>,
    progress_percent: u8,
    error_message: Option<String>,
}

impl FileRecord {
    /// New records start pending with no batch; validation decides what happens next.
    pub(crate) fn new(id: FileId, file: UploadFile) -> Self {
        Self {
            id,
            file,
            state: FileState::Pending,
            batch: None,
            progress_percent: 0,
            error_message: None,
        }
    }

    pub fn id(&self) -> FileId {
        self.id
    }

    pub fn file(&self) -> &UploadFile {
        &self.file
    }

    pub fn name(&self) -> &str {
        self.file.name()
    }

    pub fn size(&self) -> u64 {
        self.file.size()
    }

    pub fn state(&self) -> FileState {
        self.state
    }

    /// Batch assigned when validation passed; `None` for files rejected by validation.
    pub fn batch(&self) -> Option<u32> {
        self.batch
    }

    pub fn progress_percent(&self) -> u8 {
        self.progress_percent
    }

    /// Bytes uploaded so far, derived from the percentage.
    pub fn progress_size(&self) -> u64 {
        (u128::from(self.progress_percent) * u128::from(self.size()) / 100) as u64
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Accept into `batch` as pending. The batch is fixed from here on.
    pub(crate) fn admit(&mut self, batch: u32) {
        if self.batch.is_none() {
            self.batch = Some(batch);
        }
        self.state = FileState::Pending;
        self.error_message = None;
        self.reset_progress();
    }

    pub(crate) fn begin_upload(&mut self) {
        self.state = FileState::Uploading;
        self.error_message = None;
        self.reset_progress();
    }

    /// Fold a progress report in. Ignored unless uploading; never moves backwards.
    /// Returns true if the percentage changed.
    pub(crate) fn advance_progress(&mut self, percent: u8) -> bool {
        if self.state != FileState::Uploading {
            return false;
        }
        let percent = percent.min(100);
        if percent <= self.progress_percent {
            return false;
        }
        self.progress_percent = percent;
        true
    }

    pub(crate) fn complete(&mut self) {
        self.state = FileState::Uploaded;
        self.progress_percent = 100;
        self.error_message = None;
    }

    pub(crate) fn mark_errored(&mut self, message: impl Into<String>) {
        let message = message.into();
        self.state = FileState::Errored;
        self.error_message = Some(if message.trim().is_empty() {
            FALLBACK_ERROR.to_string()
        } else {
            message
        });
    }

    pub(crate) fn stop(&mut self) {
        self.state = FileState::Stopped;
        self.error_message = None;
        self.reset_progress();
    }

    pub(crate) fn reset_progress(&mut self) {
        self.progress_percent = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(size: usize) -> FileRecord {
        FileRecord::new(FileId(1), UploadFile::from_bytes("a.bin", vec![0u8; size]))
    }

    #[test]
    fn progress_is_monotonic_while_uploading() {
        let mut r = record(200);
        assert!(!r.advance_progress(40), "pending records ignore progress");
        r.admit(0);
        r.begin_upload();
        assert!(r.advance_progress(40));
        assert_eq!(r.progress_size(), 80);
        assert!(!r.advance_progress(10));
        assert_eq!(r.progress_percent(), 40);
        assert!(r.advance_progress(250));
        assert_eq!(r.progress_percent(), 100);
        assert_eq!(r.progress_size(), 200);
    }

    #[test]
    fn batch_is_fixed_after_admission() {
        let mut r = record(1);
        r.admit(3);
        r.admit(7);
        assert_eq!(r.batch(), Some(3));
    }

    #[test]
    fn errored_always_carries_a_message() {
        let mut r = record(1);
        r.mark_errored("  ");
        assert_eq!(r.state(), FileState::Errored);
        assert_eq!(r.error_message(), Some("upload failed"));
        r.stop();
        assert_eq!(r.state(), FileState::Stopped);
        assert!(r.error_message().is_none());
    }

    #[test]
    fn from_path_reads_size_and_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photo.jpg");
        fs::write(&path, b"abcdef").unwrap();
        let file = UploadFile::from_path(&path).unwrap();
        assert_eq!(file.name(), "photo.jpg");
        assert_eq!(file.size(), 6);
        assert_eq!(file.read().unwrap(), b"abcdef");
        assert!(UploadFile::from_path(dir.path()).is_err());
    }
}
