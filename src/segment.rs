//! Corpus partitioning
//!
//! A [`Segmenter`] divides a corpus into exactly one contiguous segment per
//! worker. Segments tile the corpus with no gap and no overlap, and no token
//! is ever cut across a segment boundary:
//!
//! - [`Segmenter::WordCount`] splits the whitespace-separated pieces of the
//!   text by count, the last segment absorbing the remainder.
//! - [`Segmenter::ByteBoundary`] picks evenly spaced byte offsets and moves
//!   each one just past the nearest whitespace byte, so only the boundary
//!   windows of the file are ever read.

use serde::{Deserialize, Serialize};

use crate::corpus::Corpus;
use crate::error::{EngineError, Result};
use crate::tokenizer::TokenPolicy;

/// Bytes scanned on each side of a byte-boundary target
pub const DEFAULT_WINDOW_SIZE: usize = 4096;

/// A half-open range of the corpus assigned to one worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "unit", rename_all = "lowercase")]
pub enum Segment {
    /// `[start, end)` word indices
    Words { start: usize, end: usize },
    /// `[start, end)` byte offsets
    Bytes { start: u64, end: u64 },
}

impl Segment {
    pub fn words(start: usize, end: usize) -> Result<Self> {
        if start > end {
            return Err(EngineError::config(format!(
                "malformed word segment: start {start} > end {end}"
            )));
        }
        Ok(Segment::Words { start, end })
    }

    pub fn bytes(start: u64, end: u64) -> Result<Self> {
        if start > end {
            return Err(EngineError::config(format!(
                "malformed byte segment: start {start} > end {end}"
            )));
        }
        Ok(Segment::Bytes { start, end })
    }

    pub fn start(&self) -> u64 {
        match self {
            Segment::Words { start, .. } => *start as u64,
            Segment::Bytes { start, .. } => *start,
        }
    }

    pub fn end(&self) -> u64 {
        match self {
            Segment::Words { end, .. } => *end as u64,
            Segment::Bytes { end, .. } => *end,
        }
    }

    pub fn len(&self) -> u64 {
        self.end() - self.start()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Display for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Segment::Words { start, end } => write!(f, "words[{start}..{end})"),
            Segment::Bytes { start, end } => write!(f, "bytes[{start}..{end})"),
        }
    }
}

/// The result of splitting a corpus
#[derive(Debug, Clone)]
pub enum Partition {
    Words {
        words: Vec<String>,
        segments: Vec<Segment>,
    },
    Bytes {
        segments: Vec<Segment>,
    },
}

impl Partition {
    pub fn segments(&self) -> &[Segment] {
        match self {
            Partition::Words { segments, .. } | Partition::Bytes { segments } => segments,
        }
    }

    /// A word partition of input holding nothing but whitespace
    pub fn is_blank(&self) -> bool {
        matches!(self, Partition::Words { words, .. } if words.is_empty())
    }

    /// Text of a word segment, its pieces joined by single spaces.
    pub fn word_text(&self, segment: &Segment) -> Option<String> {
        match (self, segment) {
            (Partition::Words { words, .. }, Segment::Words { start, end }) => {
                Some(words[*start..*end].join(" "))
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segmenter {
    WordCount,
    ByteBoundary { window: usize },
}

impl Segmenter {
    /// Frequency jobs split by word count, unique jobs by byte boundary.
    pub fn for_policy(policy: TokenPolicy, window: usize) -> Self {
        match policy {
            TokenPolicy::Frequency => Segmenter::WordCount,
            TokenPolicy::Unique => Segmenter::ByteBoundary { window },
        }
    }

    pub async fn split(&self, corpus: &Corpus, workers: usize) -> Result<Partition> {
        match self {
            Segmenter::WordCount => {
                let text = corpus.read_all().await?;
                let words: Vec<String> = text.split_whitespace().map(str::to_string).collect();
                let segments = split_word_counts(words.len(), workers)?;
                Ok(Partition::Words { words, segments })
            }
            Segmenter::ByteBoundary { window } => {
                let segments = split_byte_boundaries(corpus, workers, *window).await?;
                Ok(Partition::Bytes { segments })
            }
        }
    }
}

/// Split `total` words among `workers`: each of the first `workers - 1`
/// segments gets `total / workers` words, the last takes the rest.
pub fn split_word_counts(total: usize, workers: usize) -> Result<Vec<Segment>> {
    if workers == 0 {
        return Err(EngineError::config("at least one worker is required"));
    }

    let per_worker = total / workers;
    (0..workers)
        .map(|i| {
            let start = i * per_worker;
            let end = if i == workers - 1 {
                total
            } else {
                (i + 1) * per_worker
            };
            Segment::words(start, end)
        })
        .collect()
}

/// ASCII whitespace, vertical tab and form feed included.
pub fn is_space(byte: u8) -> bool {
    matches!(byte, b' ' | b'\t' | b'\n' | b'\r' | 0x0b | 0x0c)
}

/// Position of the first whitespace byte in `window`.
pub fn scan_forward(window: &[u8]) -> Option<usize> {
    window.iter().position(|b| is_space(*b))
}

/// Position of the last whitespace byte in `window`.
pub fn scan_backward(window: &[u8]) -> Option<usize> {
    window.iter().rposition(|b| is_space(*b))
}

/// Evenly spaced split targets `i * size / workers` for `i in 1..workers`.
pub fn byte_targets(size: u64, workers: usize) -> Vec<u64> {
    let k = workers as u128;
    (1..workers)
        .map(|i| ((i as u128 * size as u128) / k) as u64)
        .collect()
}

/// Move `mid` to the byte right after a whitespace byte.
///
/// Looks forward first, then backward within one window, then keeps
/// scanning forward to the end of the corpus. The returned offset is either
/// `size` or immediately preceded by whitespace.
pub async fn find_boundary(corpus: &Corpus, mid: u64, window: usize) -> Result<u64> {
    if window == 0 {
        return Err(EngineError::config("boundary window must be at least one byte"));
    }

    let size = corpus.size();
    if mid >= size {
        return Ok(size);
    }
    let window = window as u64;

    let forward = corpus.read_bytes(mid, mid + window).await?;
    if let Some(i) = scan_forward(&forward) {
        return Ok(mid + i as u64 + 1);
    }

    let back_start = mid.saturating_sub(window);
    let backward = corpus.read_bytes(back_start, mid).await?;
    if let Some(p) = scan_backward(&backward) {
        tracing::debug!(
            "No whitespace within {} bytes after offset {}, split moved back to {}",
            window,
            mid,
            back_start + p as u64 + 1
        );
        return Ok(back_start + p as u64 + 1);
    }

    tracing::warn!(
        "No whitespace within {} bytes around offset {}, scanning forward",
        window,
        mid
    );
    let mut pos = mid + window;
    while pos < size {
        let chunk = corpus.read_bytes(pos, pos + window).await?;
        if let Some(i) = scan_forward(&chunk) {
            return Ok(pos + i as u64 + 1);
        }
        pos += window;
    }
    Ok(size)
}

/// Split a corpus into `workers` byte segments on whitespace boundaries.
pub async fn split_byte_boundaries(
    corpus: &Corpus,
    workers: usize,
    window: usize,
) -> Result<Vec<Segment>> {
    if workers == 0 {
        return Err(EngineError::config("at least one worker is required"));
    }

    let size = corpus.size();
    let mut boundaries = Vec::with_capacity(workers + 1);
    boundaries.push(0u64);

    for mid in byte_targets(size, workers) {
        let found = find_boundary(corpus, mid, window).await?;
        let previous = *boundaries.last().unwrap_or(&0);
        boundaries.push(found.clamp(previous, size));
    }
    boundaries.push(size);

    boundaries
        .windows(2)
        .map(|pair| Segment::bytes(pair[0], pair[1]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn assert_tiles(segments: &[Segment], total: u64) {
        let mut cursor = 0;
        for segment in segments {
            assert_eq!(segment.start(), cursor, "gap or overlap at {segment}");
            assert!(segment.start() <= segment.end());
            cursor = segment.end();
        }
        assert_eq!(cursor, total);
    }

    fn assert_boundaries_safe(bytes: &[u8], segments: &[Segment]) {
        for segment in &segments[1..] {
            let b = segment.start() as usize;
            if b > 0 && b < bytes.len() {
                assert!(
                    is_space(bytes[b - 1]),
                    "boundary {b} does not follow whitespace"
                );
            }
        }
    }

    #[test]
    fn test_word_counts_last_segment_absorbs_remainder() {
        let segments = split_word_counts(10, 3).unwrap();
        assert_eq!(
            segments,
            vec![
                Segment::Words { start: 0, end: 3 },
                Segment::Words { start: 3, end: 6 },
                Segment::Words { start: 6, end: 10 },
            ]
        );
    }

    #[test]
    fn test_word_counts_fewer_words_than_workers() {
        let segments = split_word_counts(2, 4).unwrap();
        assert_eq!(segments.len(), 4);
        assert!(segments[..3].iter().all(Segment::is_empty));
        assert_eq!(segments[3], Segment::Words { start: 0, end: 2 });
    }

    #[test]
    fn test_word_counts_zero_workers_is_configuration_error() {
        let err = split_word_counts(5, 0).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_malformed_segment_rejected() {
        assert!(Segment::words(3, 2).unwrap_err().is_configuration());
        assert!(Segment::bytes(10, 9).unwrap_err().is_configuration());
        assert!(Segment::bytes(9, 9).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_word_split_of_example_text() {
        let corpus = Corpus::from_text("a a b");
        let partition = Segmenter::WordCount.split(&corpus, 2).await.unwrap();

        let segments = partition.segments().to_vec();
        assert_eq!(
            segments,
            vec![
                Segment::Words { start: 0, end: 1 },
                Segment::Words { start: 1, end: 3 },
            ]
        );
        assert_eq!(partition.word_text(&segments[0]).unwrap(), "a");
        assert_eq!(partition.word_text(&segments[1]).unwrap(), "a b");
    }

    #[test]
    fn test_scan_primitives() {
        assert_eq!(scan_forward(b"abc def"), Some(3));
        assert_eq!(scan_forward(b"abcdef"), None);
        assert_eq!(scan_backward(b"ab cd\tef"), Some(5));
        assert_eq!(scan_backward(b""), None);
        assert!(is_space(0x0b));
        assert!(!is_space(b'a'));
    }

    #[test]
    fn test_byte_targets_evenly_spaced() {
        assert_eq!(byte_targets(100, 4), vec![25, 50, 75]);
        assert!(byte_targets(100, 1).is_empty());
    }

    #[tokio::test]
    async fn test_find_boundary_mid_word_moves_past_next_whitespace() {
        // 10000 bytes of 9-letter words separated by single spaces
        let mut text = String::new();
        while text.len() < 10_000 {
            text.push_str("abcdefghi ");
        }
        text.truncate(10_000);
        let bytes = text.as_bytes().to_vec();
        assert!(!is_space(bytes[5000]));

        let corpus = Corpus::from_text(text);
        let boundary = find_boundary(&corpus, 5000, DEFAULT_WINDOW_SIZE).await.unwrap();

        let first_space = (5000..bytes.len()).find(|&i| is_space(bytes[i])).unwrap();
        assert_eq!(boundary, first_space as u64 + 1);
        assert!(boundary - 5000 <= DEFAULT_WINDOW_SIZE as u64);
    }

    #[tokio::test]
    async fn test_find_boundary_on_whitespace_byte() {
        let corpus = Corpus::from_text("cat dog");
        assert_eq!(find_boundary(&corpus, 3, 16).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_find_boundary_falls_back_to_preceding_whitespace() {
        // the token after offset 4 is longer than the window
        let corpus = Corpus::from_text(format!("ab {}", "x".repeat(64)));
        assert_eq!(find_boundary(&corpus, 10, 8).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_find_boundary_keeps_scanning_when_both_windows_are_solid() {
        let text = format!("{} tail", "y".repeat(40));
        let corpus = Corpus::from_text(text);
        assert_eq!(find_boundary(&corpus, 20, 4).await.unwrap(), 41);

        let solid = Corpus::from_text("z".repeat(40));
        assert_eq!(find_boundary(&solid, 20, 4).await.unwrap(), 40);
    }

    #[tokio::test]
    async fn test_find_boundary_rejects_zero_window() {
        let corpus = Corpus::from_text("a b");
        assert!(find_boundary(&corpus, 1, 0).await.unwrap_err().is_configuration());
    }

    #[tokio::test]
    async fn test_byte_split_of_empty_corpus() {
        let corpus = Corpus::from_text("");
        let segments = split_byte_boundaries(&corpus, 3, 16).await.unwrap();
        assert_eq!(segments.len(), 3);
        assert!(segments.iter().all(Segment::is_empty));
    }

    #[tokio::test]
    async fn test_byte_split_zero_workers_is_configuration_error() {
        let corpus = Corpus::from_text("a b c");
        let err = split_byte_boundaries(&corpus, 0, 16).await.unwrap_err();
        assert!(err.is_configuration());
    }

    proptest! {
        #[test]
        fn prop_word_split_tiles_range(total in 0usize..500, workers in 1usize..16) {
            let segments = split_word_counts(total, workers).unwrap();
            prop_assert_eq!(segments.len(), workers);
            assert_tiles(&segments, total as u64);
        }

        #[test]
        fn prop_byte_split_tiles_and_never_cuts_tokens(
            text in "[ab \n]{0,300}",
            workers in 1usize..8,
            window in 1usize..12,
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let corpus = Corpus::from_text(text.clone());
            let segments = rt
                .block_on(split_byte_boundaries(&corpus, workers, window))
                .unwrap();

            prop_assert_eq!(segments.len(), workers);
            assert_tiles(&segments, text.len() as u64);
            assert_boundaries_safe(text.as_bytes(), &segments);
        }
    }
}
