//! Serialization of the final result
//!
//! Frequency results become a 2-space indented JSON object whose keys keep
//! the merge order. Unique results become one token per line with a
//! trailing newline.

use serde::ser::{Serialize, SerializeMap, Serializer};
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};

use crate::error::{EngineError, Result};
use crate::reduce::FinalResult;

/// Ordered token counts, serialized as a JSON object in slice order
struct OrderedCounts<'a>(&'a [(String, u64)]);

impl Serialize for OrderedCounts<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (word, count) in self.0 {
            map.serialize_entry(word, count)?;
        }
        map.end()
    }
}

pub fn render_counts(counts: &[(String, u64)]) -> Result<String> {
    Ok(serde_json::to_string_pretty(&OrderedCounts(counts))?)
}

pub fn render_words(words: &[String]) -> String {
    let mut output = words.join("\n");
    output.push('\n');
    output
}

pub fn render(result: &FinalResult) -> Result<String> {
    match result {
        FinalResult::Frequency(counts) => render_counts(counts),
        FinalResult::Unique(words) => Ok(render_words(words)),
    }
}

/// Output file held open from job start until the result is known
///
/// Opening does not truncate, so an existing file keeps its contents if the
/// job fails.
pub struct ResultWriter {
    path: PathBuf,
    file: File,
    created: bool,
}

impl ResultWriter {
    pub async fn create(path: &Path) -> Result<Self> {
        let existed = tokio::fs::symlink_metadata(path).await.is_ok();
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .await
            .map_err(|e| EngineError::io(path, e))?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
            created: !existed,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the file's contents with the rendered result.
    pub async fn finish(mut self, result: &FinalResult) -> Result<()> {
        let rendered = render(result)?;
        if let Err(e) = self.replace_contents(rendered.as_bytes()).await {
            return Err(EngineError::io(self.path, e));
        }

        tracing::info!(
            "Wrote {} tokens to {}",
            result.len(),
            self.path.display()
        );
        Ok(())
    }

    async fn replace_contents(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.file.set_len(0).await?;
        self.file.seek(SeekFrom::Start(0)).await?;
        self.file.write_all(bytes).await?;
        self.file.flush().await
    }

    /// Give up on the output, removing the file if this writer created it.
    pub async fn discard(self) {
        let Self {
            path,
            file,
            created,
        } = self;
        drop(file);

        if created {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                tracing::warn!("Could not remove {}: {}", path.display(), e);
            }
        }
    }
}
