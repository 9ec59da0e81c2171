use async_trait::async_trait;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;

use super::error::ProcessError;

/// Variables a worker process (or ssh) may need from the driver's environment
const INHERITED_ENV: &[&str] = &[
    "PATH",
    "HOME",
    "USER",
    "TMPDIR",
    "LANG",
    "LC_ALL",
    "SSH_AUTH_SOCK",
    "RUST_LOG",
];

/// One process invocation: program, arguments, optional stdin and deadline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessCommand {
    pub program: String,
    pub args: Vec<String>,
    pub stdin: Option<String>,
    pub timeout: Option<Duration>,
}

impl ProcessCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdin: None,
            timeout: None,
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.args
            .extend(args.into_iter().map(|s| s.as_ref().to_string()));
        self
    }

    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Shell-quoted command line, for logs and errors
    pub fn display(&self) -> String {
        shell_words::join(std::iter::once(&self.program).chain(&self.args))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Success,
    Error(i32),
    Signal(i32),
}

impl ExitStatus {
    pub fn success(&self) -> bool {
        matches!(self, ExitStatus::Success)
    }

    fn from_std(status: std::process::ExitStatus) -> Self {
        if status.success() {
            return ExitStatus::Success;
        }
        if let Some(code) = status.code() {
            return ExitStatus::Error(code);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return ExitStatus::Signal(signal);
            }
        }
        ExitStatus::Error(1)
    }
}

#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

impl ProcessOutput {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            status: ExitStatus::Success,
            stdout: stdout.into(),
            stderr: String::new(),
            duration: Duration::ZERO,
        }
    }

    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            status: ExitStatus::Error(code),
            stdout: String::new(),
            stderr: stderr.into(),
            duration: Duration::ZERO,
        }
    }
}

#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(&self, command: ProcessCommand) -> Result<ProcessOutput, ProcessError>;
}

/// Runs commands as child processes with a reduced environment.
///
/// Stdin is written while stdout and stderr are drained, so a child that
/// exits without reading its input still reports its own exit status and
/// stderr. The child is killed when the deadline passes.
pub struct TokioProcessRunner;

impl TokioProcessRunner {
    fn command(command: &ProcessCommand) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&command.program);
        cmd.args(&command.args).env_clear();

        for var in INHERITED_ENV {
            if let Some(value) = std::env::var_os(var) {
                cmd.env(var, value);
            }
        }

        cmd.stdin(if command.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
        cmd
    }

    fn spawn_error(error: std::io::Error, command: &ProcessCommand) -> ProcessError {
        if error.kind() == std::io::ErrorKind::NotFound {
            ProcessError::CommandNotFound(command.program.clone())
        } else {
            ProcessError::SpawnFailed {
                command: command.display(),
                source: error,
            }
        }
    }
}

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(&self, command: ProcessCommand) -> Result<ProcessOutput, ProcessError> {
        let started = Instant::now();
        tracing::debug!("Executing subprocess: {}", command.display());

        let mut child = Self::command(&command)
            .spawn()
            .map_err(|e| Self::spawn_error(e, &command))?;

        let pipe = child.stdin.take();
        let input = command.stdin.clone();
        let feed = async move {
            match (pipe, input) {
                (Some(mut pipe), Some(input)) => {
                    pipe.write_all(input.as_bytes()).await?;
                    pipe.shutdown().await
                }
                _ => Ok(()),
            }
        };
        let exchange = async move { tokio::join!(feed, child.wait_with_output()) };

        let (fed, output) = match command.timeout {
            Some(limit) => tokio::time::timeout(limit, exchange)
                .await
                .map_err(|_| ProcessError::Timeout(limit))?,
            None => exchange.await,
        };
        let output = output?;
        let status = ExitStatus::from_std(output.status);

        if let Err(e) = fed {
            if status.success() {
                return Err(ProcessError::Io(e));
            }
            tracing::trace!("{} stopped reading stdin: {}", command.program, e);
        }

        let result = ProcessOutput {
            status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            duration: started.elapsed(),
        };

        match result.status {
            ExitStatus::Success => tracing::debug!(
                "Subprocess completed in {:?}: {}",
                result.duration,
                command.program
            ),
            ExitStatus::Error(code) => tracing::debug!(
                "Subprocess exited with {} in {:?}: {}",
                code,
                result.duration,
                command.display()
            ),
            ExitStatus::Signal(signal) => tracing::warn!(
                "Subprocess terminated by signal {} in {:?}: {}",
                signal,
                result.duration,
                command.display()
            ),
        }

        Ok(result)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::process::ExitStatusExt;

    #[test]
    fn test_exit_status_from_raw_wait_status() {
        let from_raw = |raw| ExitStatus::from_std(std::process::ExitStatus::from_raw(raw));

        assert_eq!(from_raw(0), ExitStatus::Success);
        // exit code lives in the high byte
        assert_eq!(from_raw(3 << 8), ExitStatus::Error(3));
        assert_eq!(from_raw(9), ExitStatus::Signal(9));
    }

    #[test]
    fn test_display_quotes_arguments() {
        let command = ProcessCommand::new("ssh").args(["-p", "22", "node1", "wordshard map"]);
        assert_eq!(command.display(), "ssh -p 22 node1 'wordshard map'");
    }
}
