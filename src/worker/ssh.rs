//! Worker processes on remote hosts over ssh
//!
//! Every invocation is an `ssh` process using connection multiplexing
//! (`ControlMaster=auto` with a per user/host/port control socket kept alive
//! for `ControlPersist`), so only the first invocation against a host pays
//! for the handshake. Workers addressing the same host share one
//! [`SshChannel`] and take turns on it; different hosts never wait on each
//! other.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{CommandWorker, SegmentPayload, Worker};
use crate::error::WorkerError;
use crate::reduce::PartialResult;
use crate::subprocess::ProcessRunner;

pub const DEFAULT_SSH_PORT: u16 = 22;
pub const DEFAULT_CONTROL_PERSIST: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SshTarget {
    pub user: Option<String>,
    pub host: String,
    pub port: u16,
}

impl SshTarget {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            user: None,
            host: host.into(),
            port: DEFAULT_SSH_PORT,
        }
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// `user@host`, or just `host` when no user is configured
    pub fn destination(&self) -> String {
        match &self.user {
            Some(user) => format!("{}@{}", user, self.host),
            None => self.host.clone(),
        }
    }
}

impl std::fmt::Display for SshTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ssh://{}:{}", self.destination(), self.port)
    }
}

#[derive(Debug, Clone)]
pub struct SshOptions {
    pub program: String,
    pub control_dir: PathBuf,
    pub control_persist: Duration,
    /// Command run on the remote host; must speak the `wordshard map` protocol
    pub remote_command: Vec<String>,
    pub timeout: Option<Duration>,
}

impl Default for SshOptions {
    fn default() -> Self {
        Self {
            program: "ssh".to_string(),
            control_dir: default_control_dir(),
            control_persist: DEFAULT_CONTROL_PERSIST,
            remote_command: vec!["wordshard".to_string(), "map".to_string()],
            timeout: None,
        }
    }
}

pub fn default_control_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".ssh"))
        .unwrap_or_else(std::env::temp_dir)
}

impl SshOptions {
    /// Control socket path; ssh expands the tokens per user, host and port.
    pub fn control_path(&self) -> PathBuf {
        self.control_dir.join("wordshard-%r@%h:%p")
    }

    pub fn ssh_args(&self, target: &SshTarget) -> Vec<String> {
        vec![
            "-o".to_string(),
            "ControlMaster=auto".to_string(),
            "-o".to_string(),
            format!("ControlPath={}", self.control_path().display()),
            "-o".to_string(),
            format!("ControlPersist={}s", self.control_persist.as_secs()),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-p".to_string(),
            target.port.to_string(),
            target.destination(),
            "--".to_string(),
            shell_words::join(&self.remote_command),
        ]
    }
}

/// One multiplexed connection to a host
#[derive(Debug)]
pub struct SshChannel {
    target: SshTarget,
    turn: tokio::sync::Mutex<()>,
    invocations: AtomicUsize,
}

impl SshChannel {
    fn new(target: SshTarget) -> Self {
        Self {
            target,
            turn: tokio::sync::Mutex::new(()),
            invocations: AtomicUsize::new(0),
        }
    }

    pub fn target(&self) -> &SshTarget {
        &self.target
    }

    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }
}

/// Channels keyed by target, shared by every worker of a job
#[derive(Debug, Default)]
pub struct SshChannels {
    channels: Mutex<HashMap<SshTarget, Arc<SshChannel>>>,
}

impl SshChannels {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn channel(&self, target: &SshTarget) -> Arc<SshChannel> {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        channels
            .entry(target.clone())
            .or_insert_with(|| Arc::new(SshChannel::new(target.clone())))
            .clone()
    }

    pub fn len(&self) -> usize {
        self.channels
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct SshWorker {
    channel: Arc<SshChannel>,
    inner: CommandWorker,
    shared_fs: bool,
}

impl SshWorker {
    pub fn new(
        target: SshTarget,
        options: &SshOptions,
        channels: &SshChannels,
        runner: Arc<dyn ProcessRunner>,
    ) -> Self {
        let inner = CommandWorker::new(
            target.to_string(),
            runner,
            options.program.clone(),
            options.ssh_args(&target),
        )
        .with_timeout(options.timeout);

        Self {
            channel: channels.channel(&target),
            inner,
            shared_fs: false,
        }
    }

    /// Declare that the host sees the driver's input at the same path.
    pub fn with_shared_filesystem(mut self, shared_fs: bool) -> Self {
        self.shared_fs = shared_fs;
        self
    }

    pub fn channel(&self) -> &Arc<SshChannel> {
        &self.channel
    }
}

#[async_trait]
impl Worker for SshWorker {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn shares_filesystem(&self) -> bool {
        self.shared_fs
    }

    async fn invoke(&self, payload: SegmentPayload) -> Result<PartialResult, WorkerError> {
        let _turn = self.channel.turn.lock().await;
        let n = self.channel.invocations.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!(
            "Invoking {} over {} (invocation {} on this channel)",
            payload.segment,
            self.channel.target,
            n
        );
        self.inner.invoke(payload).await
    }
}
