//! Step Executors
//!
//! The side-effecting boundary of the engine. Action handlers resolve
//! their inputs and hand them to one of three executors:
//!
//! - [`CodeExecutor`]: runs a user code artifact
//! - [`IntegrationExecutor`]: dispatches to a named integration action
//! - [`StorageExecutor`]: reads and writes scoped key/value entries
//!
//! Every call is awaited before the next step starts. Errors returned here
//! never escape a handler: they become a failed step result.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub mod code;
pub mod integration;
pub mod storage;

#[cfg(test)]
pub(crate) mod testing;

pub use code::ScriptCodeExecutor;
pub use integration::{Integration, IntegrationAction, IntegrationRegistry};
pub use storage::{HttpStorageExecutor, StoreScope};

/// Errors raised by step executors.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("integration '{0}' not found")]
    IntegrationNotFound(String),

    #[error("action '{action}' not found on integration '{integration}'")]
    ActionNotFound { integration: String, action: String },

    #[error("code artifact '{0}' not found")]
    ArtifactNotFound(String),

    #[error("no interpreter configured for artifact '{0}'")]
    UnsupportedArtifact(String),

    #[error("{0}")]
    Failed(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("storage request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("storage service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExecutorError {
    /// Shorthand for an error raised by the executed logic itself.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Runs user code artifacts.
#[async_trait]
pub trait CodeExecutor: Send + Sync {
    /// Runs `artifact` with the resolved `input` and returns its result.
    async fn execute(&self, artifact: &str, input: Value) -> Result<Value, ExecutorError>;
}

/// Dispatches named integration actions.
#[async_trait]
pub trait IntegrationExecutor: Send + Sync {
    /// Runs `action` of `integration` with the resolved `input`.
    ///
    /// Unknown names fail with [`ExecutorError::IntegrationNotFound`] or
    /// [`ExecutorError::ActionNotFound`], distinct from errors raised by
    /// the action itself.
    async fn execute(&self, integration: &str, action: &str, input: Value) -> Result<Value, ExecutorError>;
}

/// Key/value storage reached over the network.
///
/// Keys passed here are already scoped; see [`StoreScope`].
#[async_trait]
pub trait StorageExecutor: Send + Sync {
    /// Reads a value, `None` when the key is absent.
    async fn get(&self, key: &str) -> Result<Option<Value>, ExecutorError>;

    /// Writes a value and returns what the store recorded.
    async fn put(&self, key: &str, value: Value) -> Result<Value, ExecutorError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_errors_are_distinct() {
        let missing = ExecutorError::IntegrationNotFound("slack".to_string());
        let missing_action = ExecutorError::ActionNotFound {
            integration: "slack".to_string(),
            action: "send".to_string(),
        };
        let failed = ExecutorError::failed("channel archived");

        assert_eq!(missing.to_string(), "integration 'slack' not found");
        assert_eq!(missing_action.to_string(), "action 'send' not found on integration 'slack'");
        assert_eq!(failed.to_string(), "channel archived");
    }
}
