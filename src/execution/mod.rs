//! Flow Execution Module
//!
//! Runtime side of the engine: the trace a run builds, the resolver that
//! reads it, the handler for each action kind and the interpreter that
//! ties them together.
//!
//! # Architecture
//!
//! - [`engine`]: Flow interpreter and [`FlowRunner`]
//! - [`step`]: Code, integration, storage and response handlers
//! - [`loop_step`]: Loop-on-items handler
//! - [`trace`]: Execution trace, step outputs and ancestor paths
//! - [`variables`]: `${...}` placeholder resolution
//! - [`output`]: Execution output of a finished run

pub mod engine;
pub mod loop_step;
pub mod output;
pub mod step;
pub mod trace;
pub mod variables;

pub use engine::{load_job, run_chain, Executors, FlowRunner, RunContext};
pub use output::{ExecutionError, ExecutionOutput, ExecutionStatus};
pub use trace::{AncestorPath, ExecutionTrace, LoopOutput, StepOutput, StepStatus, StepValue};
pub use variables::VariableResolver;
