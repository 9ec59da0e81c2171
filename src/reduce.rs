//! Merging of per-segment partial results
//!
//! Both merges are associative and commutative, so neither segment
//! granularity nor the order in which workers finish affects the final
//! result.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use crate::tokenizer::TokenPolicy;

/// One worker's output for its segment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "result", rename_all = "lowercase")]
pub enum PartialResult {
    Frequency(HashMap<String, u64>),
    Unique(BTreeSet<String>),
}

impl PartialResult {
    pub fn empty(policy: TokenPolicy) -> Self {
        match policy {
            TokenPolicy::Frequency => PartialResult::Frequency(HashMap::new()),
            TokenPolicy::Unique => PartialResult::Unique(BTreeSet::new()),
        }
    }

    pub fn policy(&self) -> TokenPolicy {
        match self {
            PartialResult::Frequency(_) => TokenPolicy::Frequency,
            PartialResult::Unique(_) => TokenPolicy::Unique,
        }
    }

    /// Number of distinct tokens
    pub fn len(&self) -> usize {
        match self {
            PartialResult::Frequency(counts) => counts.len(),
            PartialResult::Unique(words) => words.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The merged, fully ordered aggregate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinalResult {
    /// Count descending, then token ascending
    Frequency(Vec<(String, u64)>),
    /// Token ascending
    Unique(Vec<String>),
}

impl FinalResult {
    pub fn len(&self) -> usize {
        match self {
            FinalResult::Frequency(counts) => counts.len(),
            FinalResult::Unique(words) => words.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A partial result whose mode does not match the job
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("expected a {expected:?} partial result, got {found:?}")]
pub struct ModeMismatch {
    pub index: usize,
    pub expected: TokenPolicy,
    pub found: TokenPolicy,
}

/// Sum counts for identical tokens.
pub fn merge_counts<'a, I>(partials: I) -> HashMap<String, u64>
where
    I: IntoIterator<Item = &'a HashMap<String, u64>>,
{
    let mut totals: HashMap<String, u64> = HashMap::new();
    for counts in partials {
        for (word, count) in counts {
            *totals.entry(word.clone()).or_insert(0) += count;
        }
    }
    totals
}

/// Order counts by count descending, ties broken by token ascending.
pub fn sort_counts(totals: HashMap<String, u64>) -> Vec<(String, u64)> {
    let mut sorted: Vec<(String, u64)> = totals.into_iter().collect();
    sorted.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    sorted
}

/// Set union of unique-token partials.
pub fn merge_sets<'a, I>(partials: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = &'a BTreeSet<String>>,
{
    partials.into_iter().flatten().cloned().collect()
}

/// Reducer for one job mode
#[derive(Debug, Clone, Copy)]
pub struct Reducer {
    policy: TokenPolicy,
}

impl Reducer {
    pub fn new(policy: TokenPolicy) -> Self {
        Self { policy }
    }

    pub fn reduce(&self, partials: &[PartialResult]) -> Result<FinalResult, ModeMismatch> {
        for (index, partial) in partials.iter().enumerate() {
            if partial.policy() != self.policy {
                return Err(ModeMismatch {
                    index,
                    expected: self.policy,
                    found: partial.policy(),
                });
            }
        }

        let result = match self.policy {
            TokenPolicy::Frequency => {
                let totals = merge_counts(partials.iter().filter_map(|p| match p {
                    PartialResult::Frequency(counts) => Some(counts),
                    PartialResult::Unique(_) => None,
                }));
                FinalResult::Frequency(sort_counts(totals))
            }
            TokenPolicy::Unique => {
                let union = merge_sets(partials.iter().filter_map(|p| match p {
                    PartialResult::Unique(words) => Some(words),
                    PartialResult::Frequency(_) => None,
                }));
                FinalResult::Unique(union.into_iter().collect())
            }
        };

        tracing::debug!(
            "Reduced {} partial results into {} distinct tokens",
            partials.len(),
            result.len()
        );
        Ok(result)
    }
}
