//! Process execution behind a trait, so remote workers can be driven by a
//! scripted runner in tests.

pub mod error;
pub mod mock;
pub mod runner;

#[cfg(test)]
mod tests;

pub use error::ProcessError;
pub use mock::{MockProcessRunner, ScriptBuilder};
pub use runner::{ExitStatus, ProcessCommand, ProcessOutput, ProcessRunner, TokioProcessRunner};

use std::sync::Arc;

#[derive(Clone)]
pub struct SubprocessManager {
    runner: Arc<dyn ProcessRunner>,
}

impl SubprocessManager {
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self { runner }
    }

    pub fn production() -> Self {
        Self::new(Arc::new(TokioProcessRunner))
    }

    pub fn mock() -> (Self, MockProcessRunner) {
        let mock = MockProcessRunner::new();
        let runner = Arc::new(mock.clone()) as Arc<dyn ProcessRunner>;
        (Self::new(runner), mock)
    }

    pub fn runner(&self) -> Arc<dyn ProcessRunner> {
        Arc::clone(&self.runner)
    }
}

impl Default for SubprocessManager {
    fn default() -> Self {
        Self::production()
    }
}
