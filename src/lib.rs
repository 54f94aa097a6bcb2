//! FlowRunner - Flow Execution Engine
//!
//! Runs trigger-driven automation flows: a trigger followed by a chain of
//! typed actions (code, named integrations, key/value storage, responses
//! and loops over items), producing a replay-able execution trace.
//!
//! # Architecture
//!
//! The library is organized into four main modules:
//!
//! - [`workflow`]: Typed action tree, job parsing and validation
//! - [`execution`]: Interpreter, action handlers, trace and variable resolution
//! - [`executors`]: Code, integration and storage boundaries with default implementations
//! - [`config`]: Runner settings from the environment
//!
//! # Example
//!
//! ```rust,no_run
//! use flowrunner::config::RunnerConfig;
//! use flowrunner::execution::FlowRunner;
//! use flowrunner::{load_job_document, parse_job};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RunnerConfig::from_env()?;
//!     let job = parse_job(&load_job_document("job.yaml")?)?;
//!
//!     let runner = FlowRunner::new(config.executors(job.worker_token.clone())?);
//!     let output = runner.run(&job).await;
//!     println!("{:?}", output.status);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod execution;
pub mod executors;
pub mod workflow;

// Re-export commonly used types
pub use error::FlowError;
pub use execution::{ExecutionOutput, ExecutionStatus, FlowRunner};
pub use workflow::model::{Action, ActionKind, Flow, Job};
pub use workflow::parser::{load_job_document, parse_job};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "FlowRunner";

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_library_version() {
        assert!(!VERSION.is_empty());
        assert!(VERSION.contains('.'));
    }

    #[test]
    fn test_app_name() {
        assert_eq!(APP_NAME, "FlowRunner");
    }

    #[test]
    fn test_module_exports_action() {
        let action = Action::code("score", "score.js", json!({}));
        assert_eq!(action.name, "score");
        assert_eq!(action.kind.label(), "Code");
    }

    #[test]
    fn test_module_exports_parse_job() {
        let job = parse_job(&json!({ "flow": { "trigger": { "kind": "Empty" } } })).unwrap();
        assert!(job.flow.is_empty());
    }
}
