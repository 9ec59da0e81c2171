use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use super::{SegmentPayload, Worker};
use crate::error::WorkerError;
use crate::reduce::PartialResult;
use crate::subprocess::{ExitStatus, ProcessCommand, ProcessError, ProcessRunner};

/// Runs a worker process per invocation
///
/// The payload goes to the child's stdin as JSON and the child prints the
/// partial result as JSON on stdout, the contract of `wordshard map`.
pub struct CommandWorker {
    id: String,
    runner: Arc<dyn ProcessRunner>,
    program: String,
    args: Vec<String>,
    timeout: Option<Duration>,
}

impl CommandWorker {
    pub fn new(
        id: impl Into<String>,
        runner: Arc<dyn ProcessRunner>,
        program: impl Into<String>,
        args: Vec<String>,
    ) -> Self {
        Self {
            id: id.into(),
            runner,
            program: program.into(),
            args,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

/// Turn a finished worker process into its partial result.
pub fn parse_worker_output(
    status: &ExitStatus,
    stdout: &str,
    stderr: &str,
) -> Result<PartialResult, WorkerError> {
    match status {
        ExitStatus::Success => {
            let partial: PartialResult = serde_json::from_str(stdout.trim())?;
            Ok(partial)
        }
        ExitStatus::Error(code) => Err(WorkerError::Exit {
            code: *code,
            stderr: stderr.trim().to_string(),
        }),
        ExitStatus::Signal(signal) => Err(WorkerError::Signal(*signal)),
    }
}

#[async_trait]
impl Worker for CommandWorker {
    fn id(&self) -> &str {
        &self.id
    }

    /// The child runs on this host.
    fn shares_filesystem(&self) -> bool {
        true
    }

    async fn invoke(&self, payload: SegmentPayload) -> Result<PartialResult, WorkerError> {
        let input = serde_json::to_string(&payload)?;
        let command = ProcessCommand::new(&self.program)
            .args(&self.args)
            .stdin(input)
            .timeout(self.timeout);

        let output = match self.runner.run(command).await {
            Ok(output) => output,
            Err(ProcessError::Timeout(_)) => return Err(WorkerError::Timeout),
            Err(e) => return Err(e.into()),
        };
        parse_worker_output(&output.status, &output.stdout, &output.stderr)
    }
}
