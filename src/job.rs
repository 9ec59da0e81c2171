//! One end-to-end job: split, map, reduce, write
//!
//! All inputs are validated and every worker is constructed before the first
//! invocation, so configuration and IO problems surface without any remote
//! work having been started.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};
use url::Url;

use crate::config::{JobConfig, WorkerSpec};
use crate::corpus::Corpus;
use crate::dispatch::Dispatcher;
use crate::error::{EngineError, Result, WorkerError};
use crate::output::ResultWriter;
use crate::reduce::{FinalResult, Reducer};
use crate::segment::Segmenter;
use crate::subprocess::{ProcessRunner, SubprocessManager};
use crate::tokenizer::TokenPolicy;
use crate::worker::{CommandWorker, HttpWorker, LocalWorker, SshChannels, SshWorker, Worker};

/// Summary of a finished job
#[derive(Debug, Clone)]
pub struct JobReport {
    pub policy: TokenPolicy,
    /// Distinct tokens in the final result
    pub token_count: usize,
    pub workers: usize,
    pub elapsed: Duration,
    pub output: PathBuf,
}

/// Instantiate one worker per configured endpoint, in configuration order.
pub fn build_workers(
    config: &JobConfig,
    runner: Arc<dyn ProcessRunner>,
    channels: &SshChannels,
) -> Result<Vec<Arc<dyn Worker>>> {
    let ssh_options = config.ssh_options();
    let mut workers: Vec<Arc<dyn Worker>> = Vec::with_capacity(config.workers.len());

    for (index, spec) in config.workers.iter().enumerate() {
        let worker: Arc<dyn Worker> = match spec {
            WorkerSpec::Local => Arc::new(LocalWorker::new(index)),
            WorkerSpec::Command { program, args } => Arc::new(
                CommandWorker::new(
                    format!("command-{index}"),
                    Arc::clone(&runner),
                    program.clone(),
                    args.clone(),
                )
                .with_timeout(config.worker_timeout),
            ),
            WorkerSpec::Ssh { .. } => {
                let target = spec.ssh_target().ok_or_else(|| {
                    EngineError::config(format!("worker {index}: not an ssh worker"))
                })?;
                Arc::new(
                    SshWorker::new(target, &ssh_options, channels, Arc::clone(&runner))
                        .with_shared_filesystem(spec.shared_fs()),
                )
            }
            WorkerSpec::Http { url, shared_fs } => {
                let base = Url::parse(url).map_err(|e| {
                    EngineError::config(format!("worker {index}: invalid url {url:?}: {e}"))
                })?;
                let worker = HttpWorker::new(&base, config.worker_timeout).map_err(|e| {
                    EngineError::config(format!("worker {index}: {e}"))
                })?;
                Arc::new(worker.with_shared_filesystem(*shared_fs))
            }
        };
        workers.push(worker);
    }

    Ok(workers)
}

pub struct Job {
    config: JobConfig,
    subprocess: SubprocessManager,
    channels: SshChannels,
}

impl Job {
    pub fn new(config: JobConfig, subprocess: SubprocessManager) -> Self {
        Self {
            config,
            subprocess,
            channels: SshChannels::new(),
        }
    }

    pub fn config(&self) -> &JobConfig {
        &self.config
    }

    fn dispatcher(&self, policy: TokenPolicy) -> Result<Dispatcher> {
        self.config.validate()?;
        let workers = build_workers(&self.config, self.subprocess.runner(), &self.channels)?;
        Dispatcher::new(
            workers,
            Segmenter::for_policy(policy, self.config.window_size),
        )
    }

    /// Compute the final result for an already opened corpus.
    pub async fn execute(&self, policy: TokenPolicy, corpus: &Corpus) -> Result<FinalResult> {
        let dispatcher = self.dispatcher(policy)?;
        self.execute_with(&dispatcher, policy, corpus).await
    }

    async fn execute_with(
        &self,
        dispatcher: &Dispatcher,
        policy: TokenPolicy,
        corpus: &Corpus,
    ) -> Result<FinalResult> {
        info!(
            "Starting {:?} job with {} workers",
            policy,
            dispatcher.worker_count()
        );

        let reducer = Reducer::new(policy);
        let empty = || {
            info!("input is empty");
            reducer
                .reduce(&[])
                .map_err(|e| EngineError::config(e.to_string()))
        };
        if corpus.is_empty() {
            return empty();
        }

        let partition = dispatcher.partition(corpus).await?;
        if partition.is_blank() {
            return empty();
        }

        let payloads = dispatcher.payloads(corpus, &partition, policy).await?;
        let partials = dispatcher.run_all(payloads).await?;
        let ids = dispatcher.worker_ids();

        reducer.reduce(&partials).map_err(|e| EngineError::Worker {
            index: e.index,
            worker: ids.get(e.index).cloned().unwrap_or_default(),
            source: WorkerError::Malformed(e.to_string()),
        })
    }

    /// Run the job from `input` to `output`.
    pub async fn run(&self, policy: TokenPolicy, input: &Path, output: &Path) -> Result<JobReport> {
        let started = Instant::now();

        let corpus = Corpus::open(input).await?;
        let dispatcher = self.dispatcher(policy)?;
        let writer = ResultWriter::create(output).await?;

        let result = match self.execute_with(&dispatcher, policy, &corpus).await {
            Ok(result) => result,
            Err(e) => {
                writer.discard().await;
                return Err(e);
            }
        };
        writer.finish(&result).await?;

        let report = JobReport {
            policy,
            token_count: result.len(),
            workers: self.config.workers.len(),
            elapsed: started.elapsed(),
            output: output.to_path_buf(),
        };
        debug!("Job finished: {:?}", report);
        Ok(report)
    }
}
