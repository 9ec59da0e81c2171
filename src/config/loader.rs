use std::path::Path;
use tokio::fs;

use super::JobConfig;
use crate::error::{EngineError, Result};

pub struct ConfigLoader;

impl ConfigLoader {
    /// Read a job file, apply environment overrides and validate.
    pub async fn load(path: &Path) -> Result<JobConfig> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| EngineError::io(path, e))?;

        let mut config = JobConfig::from_toml(&content)?;
        config.merge_env_vars()?;
        config.validate()?;

        tracing::debug!(
            "Loaded job file {} with {} workers",
            path.display(),
            config.workers.len()
        );
        Ok(config)
    }

    /// Load the job file when one is given, otherwise start from defaults.
    pub async fn load_or_default(path: Option<&Path>) -> Result<JobConfig> {
        match path {
            Some(path) => Self::load(path).await,
            None => {
                let mut config = JobConfig::default();
                config.merge_env_vars()?;
                config.validate()?;
                Ok(config)
            }
        }
    }
}
