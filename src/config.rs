//! Runner Configuration
//!
//! Settings of the job runner, read from the environment with defaults.
//! Command-line flags override individual values afterwards.
//!
//! | Variable                           | Default                 |
//! |------------------------------------|-------------------------|
//! | `FLOWRUNNER_STORAGE_URL`           | `http://localhost:3000` |
//! | `FLOWRUNNER_REQUEST_TIMEOUT_SECS`  | `10`                    |
//! | `FLOWRUNNER_CODE_TIMEOUT_SECS`     | `30`                    |
//! | `FLOWRUNNER_ARTIFACTS_DIR`         | `artifacts`             |

use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use log::debug;
use thiserror::Error;

use crate::execution::Executors;
use crate::executors::code::DEFAULT_CODE_TIMEOUT;
use crate::executors::{ExecutorError, HttpStorageExecutor, IntegrationRegistry, ScriptCodeExecutor};

pub const STORAGE_URL_VAR: &str = "FLOWRUNNER_STORAGE_URL";
pub const REQUEST_TIMEOUT_VAR: &str = "FLOWRUNNER_REQUEST_TIMEOUT_SECS";
pub const CODE_TIMEOUT_VAR: &str = "FLOWRUNNER_CODE_TIMEOUT_SECS";
pub const ARTIFACTS_DIR_VAR: &str = "FLOWRUNNER_ARTIFACTS_DIR";

const DEFAULT_STORAGE_URL: &str = "http://localhost:3000";
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_ARTIFACTS_DIR: &str = "artifacts";

/// Errors raised while reading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} must be a positive number of seconds, got '{value}'")]
    InvalidTimeout { var: &'static str, value: String },

    #[error("{var} must not be empty")]
    Empty { var: &'static str },
}

/// Job runner settings.
#[derive(Debug, Clone, PartialEq)]
pub struct RunnerConfig {
    /// Base URL of the storage service
    pub storage_url: String,

    /// Timeout of a single storage request
    pub request_timeout: Duration,

    /// Timeout of a single code artifact run
    pub code_timeout: Duration,

    /// Directory code artifacts are resolved in
    pub artifacts_dir: PathBuf,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            storage_url: DEFAULT_STORAGE_URL.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            code_timeout: DEFAULT_CODE_TIMEOUT,
            artifacts_dir: PathBuf::from(DEFAULT_ARTIFACTS_DIR),
        }
    }
}

fn parse_timeout(var: &'static str, value: &str) -> Result<Duration, ConfigError> {
    match value.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(ConfigError::InvalidTimeout {
            var,
            value: value.to_string(),
        }),
    }
}

fn non_empty(var: &'static str, value: String) -> Result<String, ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Empty { var });
    }
    Ok(trimmed.to_string())
}

impl RunnerConfig {
    /// Reads the configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Reads the configuration through `lookup`, falling back to defaults
    /// for unset variables.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(url) = lookup(STORAGE_URL_VAR) {
            config.storage_url = non_empty(STORAGE_URL_VAR, url)?;
        }
        if let Some(value) = lookup(REQUEST_TIMEOUT_VAR) {
            config.request_timeout = parse_timeout(REQUEST_TIMEOUT_VAR, &value)?;
        }
        if let Some(value) = lookup(CODE_TIMEOUT_VAR) {
            config.code_timeout = parse_timeout(CODE_TIMEOUT_VAR, &value)?;
        }
        if let Some(dir) = lookup(ARTIFACTS_DIR_VAR) {
            config.artifacts_dir = PathBuf::from(non_empty(ARTIFACTS_DIR_VAR, dir)?);
        }

        debug!("Loaded configuration: {:?}", config);
        Ok(config)
    }

    /// Builds the default executors for a job holding `worker_token`.
    pub fn executors(&self, worker_token: Option<String>) -> Result<Executors, ExecutorError> {
        let code = ScriptCodeExecutor::new(self.artifacts_dir.clone()).with_timeout(self.code_timeout);
        let storage = HttpStorageExecutor::new(self.storage_url.clone(), worker_token, self.request_timeout)?;

        Ok(Executors::new(
            Arc::new(code),
            Arc::new(IntegrationRegistry::new()),
            Arc::new(storage),
        ))
    }
}
