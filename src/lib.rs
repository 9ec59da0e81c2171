//! # wordshard
//!
//! Split a text corpus into word-boundary-safe segments, map each segment on
//! an independent worker, and merge the partial results deterministically.
//!
//! ## Usage
//!
//! ```bash
//! wordshard frequency input.txt counts.json --workers 4
//! wordshard unique input.txt words.txt --config job.toml
//! ```
//!
//! ## Modules
//!
//! - `tokenizer` - Frequency and unique token policies
//! - `corpus` - Read-only file or in-memory text
//! - `segment` - Word-count and byte-boundary splitting
//! - `worker` - The `Worker` trait and its local, command, ssh and http transports
//! - `subprocess` - Process execution behind a mockable runner
//! - `dispatch` - Concurrent fan-out of segments to workers
//! - `reduce` - Merging of partial results
//! - `output` - Writing the final result
//! - `job` - End-to-end job driver
//! - `server` - HTTP endpoint for remote workers
//! - `config` - TOML job files and environment overrides

pub mod config;
pub mod corpus;
pub mod dispatch;
pub mod error;
pub mod job;
pub mod output;
pub mod reduce;
pub mod segment;
pub mod server;
pub mod subprocess;
pub mod tokenizer;
pub mod worker;

pub use error::{EngineError, Result, WorkerError};
