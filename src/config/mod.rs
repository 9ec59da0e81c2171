//! Job configuration
//!
//! Everything a job needs is passed in explicitly: a TOML file, CLI flags,
//! and a small set of `WORDSHARD_*` environment overrides. Nothing is read
//! from ambient state later on.

use humantime_serde::re::humantime::parse_duration;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{EngineError, Result};
use crate::segment::DEFAULT_WINDOW_SIZE;
use crate::worker::ssh::{default_control_dir, DEFAULT_CONTROL_PERSIST, DEFAULT_SSH_PORT};
use crate::worker::{SshOptions, SshTarget};

pub mod loader;


pub use loader::ConfigLoader;

pub const ENV_WINDOW_SIZE: &str = "WORDSHARD_WINDOW_SIZE";
pub const ENV_SSH_CONTROL_DIR: &str = "WORDSHARD_SSH_CONTROL_DIR";
pub const ENV_SSH_PERSIST: &str = "WORDSHARD_SSH_PERSIST";

fn default_window_size() -> usize {
    DEFAULT_WINDOW_SIZE
}

fn default_ssh_port() -> u16 {
    DEFAULT_SSH_PORT
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobConfig {
    /// Bytes scanned around each byte-boundary split target
    #[serde(default = "default_window_size")]
    pub window_size: usize,

    /// Upper bound for a single remote invocation; unbounded when absent
    #[serde(default, with = "humantime_serde")]
    pub worker_timeout: Option<Duration>,

    #[serde(default)]
    pub ssh: SshConfig,

    #[serde(default)]
    pub workers: Vec<WorkerSpec>,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            worker_timeout: None,
            ssh: SshConfig::default(),
            workers: Vec::new(),
        }
    }
}

/// One worker endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase", deny_unknown_fields)]
pub enum WorkerSpec {
    Local,
    Command {
        program: String,
        #[serde(default)]
        args: Vec<String>,
    },
    /// `shared_fs` declares that the remote host sees the input file at
    /// the driver's path, so it may be sent byte ranges instead of text.
    Ssh {
        host: String,
        #[serde(default)]
        user: Option<String>,
        #[serde(default = "default_ssh_port")]
        port: u16,
        #[serde(default)]
        shared_fs: bool,
    },
    Http {
        url: String,
        #[serde(default)]
        shared_fs: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SshConfig {
    pub program: String,
    /// Directory for control sockets; `$HOME/.ssh` when unset
    pub control_dir: Option<PathBuf>,
    #[serde(with = "humantime_serde")]
    pub control_persist: Duration,
    pub remote_command: Vec<String>,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            program: "ssh".to_string(),
            control_dir: None,
            control_persist: DEFAULT_CONTROL_PERSIST,
            remote_command: vec!["wordshard".to_string(), "map".to_string()],
        }
    }
}

impl JobConfig {
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| EngineError::config(format!("invalid job file: {e}")))
    }

    /// Apply `WORDSHARD_*` overrides from the process environment.
    pub fn merge_env_vars(&mut self) -> Result<()> {
        self.merge_env_from(|key| std::env::var(key).ok())
    }

    pub fn merge_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_WINDOW_SIZE) {
            self.window_size = value.trim().parse().map_err(|_| {
                EngineError::config(format!(
                "{ENV_WINDOW_SIZE} must be a byte count, got {value:?}"
            ))
            })?;
        }

        if let Some(value) = lookup(ENV_SSH_CONTROL_DIR) {
            self.ssh.control_dir = Some(PathBuf::from(value));
        }

        if let Some(value) = lookup(ENV_SSH_PERSIST) {
            self.ssh.control_persist = parse_duration(value.trim()).map_err(|e| {
                EngineError::config(format!("{ENV_SSH_PERSIST} is not a duration: {e}"))
            })?;
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.window_size == 0 {
            return Err(EngineError::config("window_size must be at least 1 byte"));
        }

        if self.ssh.remote_command.is_empty() {
            return Err(EngineError::config("ssh.remote_command must not be empty"));
        }

        for (index, spec) in self.workers.iter().enumerate() {
            match spec {
                WorkerSpec::Local => {}
                WorkerSpec::Command { program, .. } => {
                    if program.trim().is_empty() {
                        return Err(EngineError::config(format!(
                            "worker {index}: command program must not be empty"
                        )));
                    }
                }
                WorkerSpec::Ssh { host, .. } => {
                    if host.trim().is_empty() {
                        return Err(EngineError::config(format!(
                            "worker {index}: ssh host must not be empty"
                        )));
                    }
                }
                WorkerSpec::Http { url, .. } => {
                    url::Url::parse(url).map_err(|e| {
                        EngineError::config(format!("worker {index}: invalid url {url:?}: {e}"))
                    })?;
                }
            }
        }

        Ok(())
    }

    /// Append `count` in-process workers.
    pub fn add_local_workers(&mut self, count: usize) {
        self.workers
            .extend(std::iter::repeat(WorkerSpec::Local).take(count));
    }

    pub fn ssh_options(&self) -> SshOptions {
        SshOptions {
            program: self.ssh.program.clone(),
            control_dir: self
                .ssh
                .control_dir
                .clone()
                .unwrap_or_else(default_control_dir),
            control_persist: self.ssh.control_persist,
            remote_command: self.ssh.remote_command.clone(),
            timeout: self.worker_timeout,
        }
    }
}

impl WorkerSpec {
    pub fn ssh_target(&self) -> Option<SshTarget> {
        match self {
            WorkerSpec::Ssh { host, user, port, .. } => {
                let target = SshTarget::new(host.clone()).with_port(*port);
                Some(match user {
                    Some(user) => target.with_user(user.clone()),
                    None => target,
                })
            }
            _ => None,
        }
    }

    pub fn shared_fs(&self) -> bool {
        match self {
            WorkerSpec::Local | WorkerSpec::Command { .. } => true,
            WorkerSpec::Ssh { shared_fs, .. } | WorkerSpec::Http { shared_fs, .. } => *shared_fs,
        }
    }
}
