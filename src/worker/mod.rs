//! Workers and their transports
//!
//! A worker maps one segment to a [`PartialResult`]. The dispatcher only sees
//! the [`Worker`] trait; whether the map runs in-process, in a child
//! process, over ssh or behind an HTTP endpoint is a transport detail.

pub mod command;
pub mod http;
pub mod local;
pub mod ssh;

pub use command::CommandWorker;
pub use http::HttpWorker;
pub use local::LocalWorker;
pub use ssh::{SshChannel, SshChannels, SshOptions, SshTarget, SshWorker};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;

use crate::corpus::{decode_lossy, read_file_range};
use crate::error::WorkerError;
use crate::reduce::PartialResult;
use crate::segment::Segment;
use crate::tokenizer::{frequency_tokens, unique_tokens, TokenPolicy};

/// Where a worker finds the text of its segment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SegmentSource {
    Text { text: String },
    /// Byte range of a file the worker reads itself
    FileRange { path: PathBuf, start: u64, end: u64 },
}

/// Everything a worker needs to process one segment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentPayload {
    pub policy: TokenPolicy,
    pub segment: Segment,
    pub source: SegmentSource,
}

impl SegmentPayload {
    pub fn text(policy: TokenPolicy, segment: Segment, text: impl Into<String>) -> Self {
        Self {
            policy,
            segment,
            source: SegmentSource::Text { text: text.into() },
        }
    }

    pub fn file_range(policy: TokenPolicy, path: impl Into<PathBuf>, start: u64, end: u64) -> Self {
        Self {
            policy,
            segment: Segment::Bytes { start, end },
            source: SegmentSource::FileRange {
                path: path.into(),
                start,
                end,
            },
        }
    }
}

#[async_trait]
pub trait Worker: Send + Sync {
    /// Stable label used in logs and error messages
    fn id(&self) -> &str;

    /// Whether the worker can open the driver's input path itself. Workers
    /// that cannot are sent segment text instead of file ranges.
    fn shares_filesystem(&self) -> bool {
        false
    }

    async fn invoke(&self, payload: SegmentPayload) -> Result<PartialResult, WorkerError>;
}

/// Count occurrences of each frequency-policy token.
pub fn map_frequency(text: &str) -> HashMap<String, u64> {
    let mut counts = HashMap::new();
    for word in frequency_tokens(text) {
        *counts.entry(word).or_insert(0) += 1;
    }
    counts
}

/// Distinct unique-policy tokens.
pub fn map_unique(text: &str) -> BTreeSet<String> {
    unique_tokens(text).into_iter().collect()
}

pub fn map_text(policy: TokenPolicy, text: &str) -> PartialResult {
    match policy {
        TokenPolicy::Frequency => PartialResult::Frequency(map_frequency(text)),
        TokenPolicy::Unique => PartialResult::Unique(map_unique(text)),
    }
}

pub async fn resolve_text(source: &SegmentSource) -> Result<String, WorkerError> {
    match source {
        SegmentSource::Text { text } => Ok(text.clone()),
        SegmentSource::FileRange { path, start, end } => {
            if start > end {
                return Err(WorkerError::Malformed(format!(
                    "file range start {start} > end {end}"
                )));
            }
            let bytes = read_file_range(path, *start, *end).await?;
            Ok(decode_lossy(&bytes))
        }
    }
}

/// Resolve the payload's text and map it, off the async executor threads.
pub async fn map_payload(payload: SegmentPayload) -> Result<PartialResult, WorkerError> {
    let text = resolve_text(&payload.source).await?;
    let policy = payload.policy;

    tokio::task::spawn_blocking(move || map_text(policy, &text))
        .await
        .map_err(|e| WorkerError::Join(e.to_string()))
}
