//! File models shared by both transfer modes.
//!
//! A sender owns a [`Batch`] of [`OutgoingFile`]s. Each one pairs the
//! serializable [`FileRecord`] with a [`FileSource`], the handle to bytes
//! that have not been read yet. A receiver ends up with [`ReceivedFile`]s,
//! which own the reconstructed bytes.

use std::{
    future::Future,
    path::{Path, PathBuf},
    pin::Pin,
    sync::Arc,
};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::{BeamError, Result};

/// Used when neither the caller nor the file extension gives a type.
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// Metadata for one file of a batch, as it appears on the wire.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    /// Display name.
    pub name: String,
    /// Byte count.
    pub size: u64,
    /// Sender-supplied, never verified.
    pub mime_type: String,
    /// 0-based position within the batch.
    pub sequence_index: usize,
    /// Fetchable URL, present only in relay mode once the upload is done.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_locator: Option<Url>,
}

impl FileRecord {
    pub fn new(
        sequence_index: usize,
        name: impl Into<String>,
        size: u64,
        mime_type: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            size,
            mime_type: mime_type.into(),
            sequence_index,
            remote_locator: None,
        }
    }

    pub fn with_locator(mut self, locator: Url) -> Self {
        self.remote_locator = Some(locator);
        self
    }

    /// `image/*`, `video/*` or `audio/*`.
    pub fn is_media(&self) -> bool {
        let top = self
            .mime_type
            .split('/')
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        matches!(top.as_str(), "image" | "video" | "audio")
    }
}

/// A source of raw bytes owned exclusively by the sender.
///
/// Contract:
/// - `len()` is the total size and does not change.
/// - `read_all()` yields the complete contents. Both transfer modes hold a
///   whole file in memory while it is in flight, so a source is read once,
///   right before its bytes are needed.
pub trait FileSource: Send + Sync {
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read_all(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<u8>>> + Send + '_>>;
}

/// Bytes that are already in memory.
pub struct MemorySource {
    bytes: Vec<u8>,
}

impl MemorySource {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }
}

impl FileSource for MemorySource {
    fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    fn read_all(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<u8>>> + Send + '_>> {
        Box::pin(async move { Ok(self.bytes.clone()) })
    }
}

/// A file on the local filesystem, read lazily.
pub struct PathSource {
    path: PathBuf,
    len: u64,
}

impl PathSource {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let meta = tokio::fs::metadata(&path).await?;
        if !meta.is_file() {
            return Err(BeamError::Io(format!(
                "{} is not a regular file",
                path.display()
            )));
        }
        Ok(Self {
            path,
            len: meta.len(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FileSource for PathSource {
    fn len(&self) -> u64 {
        self.len
    }

    fn read_all(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<u8>>> + Send + '_>> {
        Box::pin(async move {
            log::trace!("reading {}", self.path.display());
            let bytes = tokio::fs::read(&self.path).await?;
            if bytes.len() as u64 != self.len {
                return Err(BeamError::Io(format!(
                    "{} changed size since it was selected ({} -> {} bytes)",
                    self.path.display(),
                    self.len,
                    bytes.len()
                )));
            }
            Ok(bytes)
        })
    }
}

/// One file of a batch on the sending side.
#[derive(Clone)]
pub struct OutgoingFile {
    pub record: FileRecord,
    pub source: Arc<dyn FileSource>,
}

impl std::fmt::Debug for OutgoingFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutgoingFile")
            .field("record", &self.record)
            .finish()
    }
}

/// An ordered set of files transferred as one logical operation.
///
/// Indices are assigned on insertion, so `sequence_index` values are always
/// the contiguous range `0..len()`.
#[derive(Clone, Debug, Default)]
pub struct Batch {
    files: Vec<OutgoingFile>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(
        &mut self,
        name: impl Into<String>,
        mime_type: impl Into<String>,
        source: Arc<dyn FileSource>,
    ) -> &FileRecord {
        let record = FileRecord::new(
            self.files.len(),
            name,
            source.len(),
            mime_type,
        );
        self.files.push(OutgoingFile { record, source });
        &self.files[self.files.len() - 1].record
    }

    pub fn push_bytes(
        &mut self,
        name: impl Into<String>,
        mime_type: impl Into<String>,
        bytes: impl Into<Vec<u8>>,
    ) -> &FileRecord {
        self.push(name, mime_type, Arc::new(MemorySource::new(bytes)))
    }

    /// Adds a file from disk, guessing its type from the extension.
    pub async fn push_path(
        &mut self,
        path: impl AsRef<Path>,
    ) -> Result<&FileRecord> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| {
                BeamError::Io(format!("{} has no file name", path.display()))
            })?;
        let mime_type = mime_guess::from_path(path)
            .first_or_octet_stream()
            .to_string();
        let source = PathSource::open(path).await?;
        Ok(self.push(name, mime_type, Arc::new(source)))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn files(&self) -> &[OutgoingFile] {
        &self.files
    }

    pub fn records(&self) -> Vec<FileRecord> {
        self.files
            .iter()
            .map(|f| f.record.clone())
            .collect()
    }

    pub fn total_size(&self) -> u64 {
        self.files
            .iter()
            .map(|f| f.record.size)
            .sum()
    }
}

/// A file fully reconstructed on the receiving side.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReceivedFile {
    pub record: FileRecord,
    pub bytes: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn batch_assigns_contiguous_indices() {
        let mut batch = Batch::new();
        batch.push_bytes("a.txt", "text/plain", vec![1u8; 10]);
        batch.push_bytes("b.bin", DEFAULT_MIME_TYPE, vec![2u8; 20]);

        let indices: Vec<usize> = batch
            .records()
            .iter()
            .map(|r| r.sequence_index)
            .collect();
        assert_eq!(indices, vec![0, 1]);
        assert_eq!(batch.total_size(), 30);
    }

    #[test]
    fn media_detection_looks_at_top_level_type() {
        assert!(FileRecord::new(0, "a.png", 1, "image/png").is_media());
        assert!(FileRecord::new(0, "a.mp4", 1, "Video/MP4").is_media());
        assert!(!FileRecord::new(0, "a.pdf", 1, "application/pdf").is_media());
        assert!(!FileRecord::new(0, "a", 1, "").is_media());
    }

    #[tokio::test]
    async fn push_path_reads_size_and_guesses_type() {
        let dir = TempDir::new("beam_file").unwrap();
        let path = dir.path().join("photo.png");
        std::fs::write(&path, b"not really a png").unwrap();

        let mut batch = Batch::new();
        let record = batch.push_path(&path).await.unwrap().clone();
        assert_eq!(record.name, "photo.png");
        assert_eq!(record.size, 16);
        assert_eq!(record.mime_type, "image/png");

        let bytes = batch.files()[0].source.read_all().await.unwrap();
        assert_eq!(bytes, b"not really a png");
    }

    #[tokio::test]
    async fn reading_a_file_that_changed_size_fails() {
        let dir = TempDir::new("beam_file").unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"short").unwrap();
        let source = PathSource::open(&path).await.unwrap();

        std::fs::write(&path, b"rather longer now").unwrap();
        let err = source.read_all().await.unwrap_err();
        assert!(matches!(
            err,
            BeamError::Io(reason) if reason.contains("changed size")
        ));
    }

    #[tokio::test]
    async fn push_path_rejects_directories() {
        let dir = TempDir::new("beam_file").unwrap();
        let mut batch = Batch::new();
        assert!(batch.push_path(dir.path()).await.is_err());
        assert!(batch.is_empty());
    }
}
