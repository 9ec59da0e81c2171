//! Read-only access to the text being processed
//!
//! A corpus is either a file on disk, read through positioned range reads, or
//! an in-memory buffer. Nothing in the engine ever writes to it.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::error::{EngineError, Result};

#[derive(Debug, Clone)]
pub enum Corpus {
    File { path: PathBuf, size: u64 },
    Memory(Arc<[u8]>),
}

impl Corpus {
    /// Open a file corpus, recording its size. The content is not read.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|e| EngineError::io(&path, e))?;

        if !metadata.is_file() {
            return Err(EngineError::io(
                &path,
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a regular file"),
            ));
        }

        tracing::debug!("Opened corpus {} ({} bytes)", path.display(), metadata.len());
        Ok(Corpus::File {
            path,
            size: metadata.len(),
        })
    }

    pub fn from_text(text: impl Into<String>) -> Self {
        let text: String = text.into();
        Corpus::Memory(Arc::from(text.into_bytes()))
    }

    pub fn size(&self) -> u64 {
        match self {
            Corpus::File { size, .. } => *size,
            Corpus::Memory(bytes) => bytes.len() as u64,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            Corpus::File { path, .. } => Some(path),
            Corpus::Memory(_) => None,
        }
    }

    /// Read the whole corpus as text. Invalid UTF-8 never fails the read.
    pub async fn read_all(&self) -> Result<String> {
        match self {
            Corpus::File { path, .. } => {
                let bytes = tokio::fs::read(path)
                    .await
                    .map_err(|e| EngineError::io(path, e))?;
                Ok(decode_lossy(&bytes))
            }
            Corpus::Memory(bytes) => Ok(decode_lossy(bytes)),
        }
    }

    /// Read the raw bytes of `[start, end)`, clamped to the corpus size.
    pub async fn read_bytes(&self, start: u64, end: u64) -> Result<Vec<u8>> {
        let end = end.min(self.size());
        if start >= end {
            return Ok(Vec::new());
        }

        match self {
            Corpus::File { path, .. } => read_file_range(path, start, end)
                .await
                .map_err(|e| EngineError::io(path, e)),
            Corpus::Memory(bytes) => Ok(bytes[start as usize..end as usize].to_vec()),
        }
    }

    pub async fn read_range(&self, start: u64, end: u64) -> Result<String> {
        let bytes = self.read_bytes(start, end).await?;
        Ok(decode_lossy(&bytes))
    }
}

/// Positioned read of `[start, end)` from a file.
pub async fn read_file_range(path: &Path, start: u64, end: u64) -> std::io::Result<Vec<u8>> {
    let mut file = tokio::fs::File::open(path).await?;
    file.seek(SeekFrom::Start(start)).await?;

    let len = end.saturating_sub(start);
    let mut buf = Vec::with_capacity(len as usize);
    file.take(len).read_to_end(&mut buf).await?;
    Ok(buf)
}

/// Decode UTF-8, dropping invalid sequences.
pub fn decode_lossy(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => bytes.utf8_chunks().map(|chunk| chunk.valid()).collect(),
    }
}
