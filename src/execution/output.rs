//! Execution Output
//!
//! The terminal artifact of a run: overall status, the final trace, timing
//! and, on failure, a single pointer to the step that failed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::trace::ExecutionTrace;

/// Setup phase reported when the job document cannot be read.
pub const LOAD_JOB_PHASE: &str = "load_job";

/// Setup phase reported when the flow cannot be built from the document.
pub const BUILD_FLOW_PHASE: &str = "build_flow";

/// Overall status of a run.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Succeeded,
    Failed,
}

/// The one authoritative failure of a run.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionError {
    /// Failed step, or the setup phase that failed before any step ran
    pub step_name: String,
    pub message: String,
}

/// Result of one flow run.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionOutput {
    pub status: ExecutionStatus,

    pub execution_state: ExecutionTrace,

    /// Total wall-clock duration in milliseconds
    pub duration_ms: u64,

    pub started_at: DateTime<Utc>,

    /// Output of the last top-level `Response` step that ran
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ExecutionError>,
}

impl ExecutionOutput {
    /// Builds the output of a run that reached its first action.
    ///
    /// Status comes from the trace: the first failed top-level entry in
    /// insertion order is reported, whatever the chain result says.
    pub fn from_trace(
        trace: ExecutionTrace,
        chain_succeeded: bool,
        started_at: DateTime<Utc>,
        duration_ms: u64,
        response: Option<Value>,
    ) -> Self {
        let error = match trace.first_failure() {
            Some((name, output)) => Some(ExecutionError {
                step_name: name.to_string(),
                message: output
                    .error_message
                    .clone()
                    .unwrap_or_else(|| format!("step '{}' failed", name)),
            }),
            None if !chain_succeeded => Some(ExecutionError {
                step_name: String::new(),
                message: "flow stopped before completing".to_string(),
            }),
            None => None,
        };

        Self {
            status: if error.is_some() {
                ExecutionStatus::Failed
            } else {
                ExecutionStatus::Succeeded
            },
            execution_state: trace,
            duration_ms,
            started_at,
            response,
            error,
        }
    }

    /// Builds the output of a run that failed before any step ran.
    pub fn setup_failure(phase: &str, message: impl Into<String>, started_at: DateTime<Utc>, duration_ms: u64) -> Self {
        Self {
            status: ExecutionStatus::Failed,
            execution_state: ExecutionTrace::new(),
            duration_ms,
            started_at,
            response: None,
            error: Some(ExecutionError {
                step_name: phase.to_string(),
                message: message.into(),
            }),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Succeeded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::trace::{AncestorPath, StepOutput};
    use serde_json::json;

    fn trace_with(entries: Vec<(&str, StepOutput)>) -> ExecutionTrace {
        let mut trace = ExecutionTrace::new();
        for (name, output) in entries {
            trace.insert(&AncestorPath::root(), name, output);
        }
        trace
    }

    #[test]
    fn test_success_has_no_error() {
        let trace = trace_with(vec![("a", StepOutput::succeeded(json!({}), json!(1)))]);
        let output = ExecutionOutput::from_trace(trace, true, Utc::now(), 3, None);

        assert!(output.is_success());
        assert!(output.error.is_none());
    }

    #[test]
    fn test_first_failure_wins() {
        let trace = trace_with(vec![
            ("a", StepOutput::succeeded(json!({}), json!(1))),
            ("b", StepOutput::failed(json!({}), "first")),
            ("c", StepOutput::failed(json!({}), "second")),
        ]);
        let output = ExecutionOutput::from_trace(trace, false, Utc::now(), 3, None);

        assert_eq!(output.status, ExecutionStatus::Failed);
        assert_eq!(
            output.error,
            Some(ExecutionError {
                step_name: "b".to_string(),
                message: "first".to_string(),
            })
        );
    }

    #[test]
    fn test_setup_failure_names_phase() {
        let output = ExecutionOutput::setup_failure(BUILD_FLOW_PHASE, "bad kind", Utc::now(), 0);

        assert!(!output.is_success());
        assert!(output.execution_state.is_empty());
        assert_eq!(output.error.unwrap().step_name, "build_flow");
    }

    #[test]
    fn test_serialized_shape() {
        let trace = trace_with(vec![("reply", StepOutput::succeeded(json!({}), json!("ok")))]);
        let output = ExecutionOutput::from_trace(trace, true, Utc::now(), 12, Some(json!("ok")));
        let value = serde_json::to_value(&output).unwrap();

        assert_eq!(value["status"], json!("SUCCEEDED"));
        assert_eq!(value["durationMs"], json!(12));
        assert_eq!(value["response"], json!("ok"));
        assert_eq!(value["executionState"]["reply"]["output"], json!("ok"));
        assert!(value.get("startedAt").is_some());
        assert!(value.get("error").is_none());
    }
}
