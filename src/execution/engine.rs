//! Flow Execution Engine
//!
//! The interpreter that walks a flow's action chains:
//! - Seeds the trace with the trigger entry
//! - Runs each chain strictly in `nextAction` order, stopping at the first failure
//! - Re-enters itself for every loop iteration, scoped by an [`AncestorPath`]
//! - Wraps the final trace into an [`ExecutionOutput`]
//!
//! A run is a single task: every executor call is awaited before the next
//! step starts and the trace is owned by the run's [`RunContext`], so
//! independent runs share nothing mutable.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use log::{debug, error, info};
use serde_json::Value;

use crate::error::FlowError;
use crate::executors::{CodeExecutor, IntegrationExecutor, StorageExecutor};
use crate::workflow::model::{Action, ActionKind, Job};
use crate::workflow::parser::{load_job_document, parse_job};

use super::output::{ExecutionOutput, BUILD_FLOW_PHASE, LOAD_JOB_PHASE};
use super::step::execute_action;
use super::trace::{AncestorPath, ExecutionTrace, StepOutput};
use super::variables::VariableResolver;

/// Trace entry holding the trigger's payload.
pub const TRIGGER_STEP: &str = "trigger";

/// Future returned by [`run_chain`].
pub type ChainFuture<'a> = Pin<Box<dyn Future<Output = bool> + Send + 'a>>;

/// The executors a run talks to.
#[derive(Clone)]
pub struct Executors {
    pub code: Arc<dyn CodeExecutor>,
    pub integrations: Arc<dyn IntegrationExecutor>,
    pub storage: Arc<dyn StorageExecutor>,
}

impl Executors {
    pub fn new(
        code: Arc<dyn CodeExecutor>,
        integrations: Arc<dyn IntegrationExecutor>,
        storage: Arc<dyn StorageExecutor>,
    ) -> Self {
        Self {
            code,
            integrations,
            storage,
        }
    }
}

/// Mutable state of one run.
///
/// Handlers read the trace through [`RunContext::resolver`]; the
/// interpreter and the loop handler are the only writers.
pub struct RunContext {
    pub trace: ExecutionTrace,
    pub execution_id: String,
    pub flow_version_id: String,
    pub configs: IndexMap<String, Value>,
    pub executors: Executors,
}

impl RunContext {
    /// Creates an empty context for `job`.
    pub fn new(job: &Job, executors: Executors) -> Self {
        Self {
            trace: ExecutionTrace::new(),
            execution_id: job.execution_id.clone(),
            flow_version_id: job.flow_version_id.clone(),
            configs: job.configs.clone(),
            executors,
        }
    }

    /// Records the trigger entry that every run starts from.
    pub fn seed_trigger(&mut self, job: &Job) {
        let seed = StepOutput::succeeded(job.flow.trigger.settings.clone(), job.trigger_payload.clone());
        self.trace.insert(&AncestorPath::root(), TRIGGER_STEP, seed);
    }

    /// Resolver for a step running at `path`.
    pub fn resolver<'a>(&'a self, path: &'a AncestorPath) -> VariableResolver<'a> {
        VariableResolver::new(&self.trace, path, &self.configs)
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Failed output for a job that never reached its first step.
fn setup_failure(phase: &str, error: &FlowError, started_at: DateTime<Utc>, clock: Instant) -> Box<ExecutionOutput> {
    error!("Setup phase '{}' failed: {}", phase, error);
    Box::new(ExecutionOutput::setup_failure(
        phase,
        error.to_string(),
        started_at,
        elapsed_ms(clock),
    ))
}

fn build_job(document: &Value, started_at: DateTime<Utc>, clock: Instant) -> Result<Job, Box<ExecutionOutput>> {
    parse_job(document).map_err(|e| setup_failure(BUILD_FLOW_PHASE, &e, started_at, clock))
}

/// Reads the job document at `path` and builds its job.
///
/// A file that cannot be read or parsed fails the `load_job` phase, an
/// invalid flow fails the `build_flow` phase. Either way the error is the
/// finished output of the run, with an empty trace.
pub fn load_job(path: &str) -> Result<Job, Box<ExecutionOutput>> {
    let started_at = Utc::now();
    let clock = Instant::now();

    let document = load_job_document(path).map_err(|e| setup_failure(LOAD_JOB_PHASE, &e, started_at, clock))?;
    build_job(&document, started_at, clock)
}

/// Runs the chain starting at `head` in the scope addressed by `path`.
///
/// Each step's output is recorded under its name before the next step
/// starts. Returns false as soon as a step fails; the remaining steps of
/// the chain are not attempted. An empty chain succeeds.
pub fn run_chain<'a>(ctx: &'a mut RunContext, head: Option<&'a Action>, path: &'a AncestorPath) -> ChainFuture<'a> {
    Box::pin(async move {
        let mut current = head;

        while let Some(action) = current {
            let started = Instant::now();
            let mut output = execute_action(action, ctx, path).await;
            output.duration_ms = elapsed_ms(started);

            let failed = output.is_failed();
            if failed {
                error!(
                    "Step '{}' failed: {}",
                    action.name,
                    output.error_message.as_deref().unwrap_or("unknown error")
                );
            } else {
                debug!("Step '{}' completed in {}ms", action.name, output.duration_ms);
            }

            if !ctx.trace.insert(path, &action.name, output) {
                error!("No trace scope at {} for step '{}'", path, action.name);
                return false;
            }
            if failed {
                return false;
            }

            current = action.next_action.as_deref();
        }

        true
    })
}

/// Runs jobs against a fixed set of executors.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// use flowrunner::execution::{Executors, FlowRunner};
/// use flowrunner::executors::{HttpStorageExecutor, IntegrationRegistry, ScriptCodeExecutor};
/// use flowrunner::load_job_document;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let document = load_job_document("job.json")?;
///     let storage = HttpStorageExecutor::new("http://localhost:3000", None, Duration::from_secs(10))?;
///     let runner = FlowRunner::new(Executors::new(
///         Arc::new(ScriptCodeExecutor::new("artifacts")),
///         Arc::new(IntegrationRegistry::new()),
///         Arc::new(storage),
///     ));
///
///     let output = runner.run_document(&document).await;
///     println!("{}", serde_json::to_string_pretty(&output)?);
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct FlowRunner {
    executors: Executors,
}

impl FlowRunner {
    pub fn new(executors: Executors) -> Self {
        Self { executors }
    }

    /// Runs `job` to completion or first failure.
    pub async fn run(&self, job: &Job) -> ExecutionOutput {
        let started_at = Utc::now();
        let clock = Instant::now();

        info!(
            "Starting execution '{}' of flow '{}' ({} actions)",
            job.execution_id,
            job.flow_version_id,
            job.flow.len()
        );

        let mut ctx = RunContext::new(job, self.executors.clone());
        ctx.seed_trigger(job);

        let root = AncestorPath::root();
        let succeeded = run_chain(&mut ctx, job.flow.first_action(), &root).await;
        let response = last_response(job, &ctx.trace);

        let output = ExecutionOutput::from_trace(ctx.trace, succeeded, started_at, elapsed_ms(clock), response);
        match &output.error {
            None => info!("Execution '{}' succeeded in {}ms", job.execution_id, output.duration_ms),
            Some(e) => error!(
                "Execution '{}' failed at step '{}': {}",
                job.execution_id, e.step_name, e.message
            ),
        }
        output
    }

    /// Builds a job from a raw document and runs it.
    ///
    /// Construction errors produce a failed output naming the
    /// `build_flow` phase; no step runs in that case.
    pub async fn run_document(&self, document: &Value) -> ExecutionOutput {
        match build_job(document, Utc::now(), Instant::now()) {
            Ok(job) => self.run(&job).await,
            Err(output) => *output,
        }
    }
}

/// Output of the last top-level `Response` step that succeeded.
fn last_response(job: &Job, trace: &ExecutionTrace) -> Option<Value> {
    let head = job.flow.first_action()?;
    head.iter_chain()
        .filter(|action| matches!(action.kind, ActionKind::Response(_)))
        .filter_map(|action| trace.steps().get(&action.name))
        .filter(|output| !output.is_failed())
        .last()
        .and_then(|output| output.lookup(&[]))
}
