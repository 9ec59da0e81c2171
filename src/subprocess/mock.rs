//! Scripted [`ProcessRunner`] for exercising command and ssh workers
//! without spawning anything.

use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::error::ProcessError;
use super::runner::{ProcessCommand, ProcessOutput, ProcessRunner};

type Matcher = Box<dyn Fn(&ProcessCommand) -> bool + Send + Sync>;
type Responder = Box<dyn Fn(&ProcessCommand) -> Result<ProcessOutput, ProcessError> + Send + Sync>;

struct Script {
    program: String,
    matcher: Option<Matcher>,
    respond: Responder,
    remaining: Option<usize>,
}

impl Script {
    fn accepts(&self, command: &ProcessCommand) -> bool {
        self.program == command.program
            && self.remaining != Some(0)
            && self.matcher.as_ref().is_none_or(|m| m(command))
    }
}

/// Answers commands from scripts registered with [`MockProcessRunner::on`].
///
/// Scripts are tried in registration order; the first one accepting a
/// command answers it. Every command is recorded, answered or not.
#[derive(Clone, Default)]
pub struct MockProcessRunner {
    scripts: Arc<Mutex<Vec<Script>>>,
    calls: Arc<Mutex<Vec<ProcessCommand>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start scripting the answer for `program`.
    pub fn on(&self, program: &str) -> ScriptBuilder {
        ScriptBuilder {
            runner: self.clone(),
            program: program.to_string(),
            matcher: None,
            remaining: None,
        }
    }

    pub fn calls(&self) -> Vec<ProcessCommand> {
        lock(&self.calls).clone()
    }

    pub fn call_count(&self, program: &str) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|call| call.program == program)
            .count()
    }
}

#[async_trait]
impl ProcessRunner for MockProcessRunner {
    async fn run(&self, command: ProcessCommand) -> Result<ProcessOutput, ProcessError> {
        lock(&self.calls).push(command.clone());

        let mut scripts = lock(&self.scripts);
        let script = scripts
            .iter_mut()
            .find(|script| script.accepts(&command))
            .ok_or_else(|| ProcessError::Unscripted(command.display()))?;

        if let Some(remaining) = script.remaining.as_mut() {
            *remaining -= 1;
        }
        (script.respond)(&command)
    }
}

pub struct ScriptBuilder {
    runner: MockProcessRunner,
    program: String,
    matcher: Option<Matcher>,
    remaining: Option<usize>,
}

impl ScriptBuilder {
    /// Only answer commands satisfying `matcher`.
    pub fn when<F>(mut self, matcher: F) -> Self
    where
        F: Fn(&ProcessCommand) -> bool + Send + Sync + 'static,
    {
        self.matcher = Some(Box::new(matcher));
        self
    }

    /// Answer at most `times` commands.
    pub fn limit(mut self, times: usize) -> Self {
        self.remaining = Some(times);
        self
    }

    pub fn respond_with<F>(self, respond: F)
    where
        F: Fn(&ProcessCommand) -> Result<ProcessOutput, ProcessError> + Send + Sync + 'static,
    {
        lock(&self.runner.scripts).push(Script {
            program: self.program,
            matcher: self.matcher,
            respond: Box::new(respond),
            remaining: self.remaining,
        });
    }

    /// Exit successfully, printing `stdout`.
    pub fn stdout(self, stdout: impl Into<String>) {
        let stdout = stdout.into();
        self.respond_with(move |_| Ok(ProcessOutput::success(stdout.clone())));
    }

    /// Exit with `code`, printing `stderr`.
    pub fn exit(self, code: i32, stderr: impl Into<String>) {
        let stderr = stderr.into();
        self.respond_with(move |_| Ok(ProcessOutput::failed(code, stderr.clone())));
    }
}
