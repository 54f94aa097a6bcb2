//! Loop-On-Items Handler
//!
//! Runs a nested chain once per item of a resolved list:
//!
//! 1. Resolve `items` against the trace as it stands before the loop
//! 2. Record an initial entry so other steps see a defined shape
//! 3. Per item: update the summary in place, open an empty iteration
//!    scope, run the nested chain under `(loop, index)`
//! 4. Stop at the first failing iteration and report its nested error
//!
//! Nested results are written straight into the loop's own entry, so the
//! iteration history is never copied while the loop runs.

use std::mem;

use log::{debug, info, warn};
use serde_json::{json, Value};

use crate::workflow::model::{Action, LoopSettings};

use super::engine::{run_chain, RunContext};
use super::trace::{AncestorPath, LoopOutput, Scope, StepOutput, StepStatus};

/// Describes a resolved value for error messages.
fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Message of the first failed step recorded in an iteration scope.
fn first_nested_error(scope: &Scope) -> Option<(String, String)> {
    scope.iter().find(|(_, output)| output.is_failed()).map(|(name, output)| {
        let message = output
            .error_message
            .clone()
            .unwrap_or_else(|| format!("step '{}' failed", name));
        (name.clone(), message)
    })
}

/// Executes a `LoopOnItems` step named `name` at `path`.
pub async fn execute_loop(
    name: &str,
    settings: &LoopSettings,
    body: Option<&Action>,
    ctx: &mut RunContext,
    path: &AncestorPath,
) -> StepOutput {
    let resolved = ctx.resolver(path).resolve(&settings.items);
    let items = match &resolved {
        Value::Array(items) => items.clone(),
        other => {
            let message = format!("items must resolve to an array, got {}", type_name(other));
            return StepOutput::failed(json!({ "items": resolved }), message);
        }
    };
    let input = json!({ "items": resolved });

    ctx.trace.insert(
        path,
        name,
        StepOutput::for_loop(input.clone(), LoopOutput::default(), StepStatus::Succeeded),
    );

    info!("Loop '{}' starting over {} items", name, items.len());

    let mut failure = None;
    for (index, item) in items.into_iter().enumerate() {
        match ctx.trace.get_exact_mut(path, name).and_then(StepOutput::as_loop_mut) {
            Some(summary) => {
                summary.current_iteration = index + 1;
                summary.current_item = Some(item);
                summary.iterations.push(Scope::new());
            }
            None => {
                failure = Some(format!("loop entry '{}' missing from trace at {}", name, path));
                break;
            }
        }

        let Some(head) = body else {
            continue;
        };

        let iteration = path.push(name, index);
        debug!("Loop '{}' iteration {} at {}", name, index + 1, iteration);

        if !run_chain(ctx, Some(head), &iteration).await {
            let nested = ctx.trace.scope(&iteration).and_then(first_nested_error);
            let message = match nested {
                Some((step, message)) => {
                    warn!("Loop '{}' stopped at iteration {}: step '{}' failed", name, index + 1, step);
                    message
                }
                None => format!("iteration {} failed", index + 1),
            };
            failure = Some(message);
            break;
        }
    }

    let summary = ctx
        .trace
        .get_exact_mut(path, name)
        .and_then(StepOutput::as_loop_mut)
        .map(mem::take)
        .unwrap_or_default();

    match failure {
        Some(message) => StepOutput::for_loop(input, summary, StepStatus::Failed).with_error(message),
        None => {
            info!("Loop '{}' completed {} iterations", name, summary.iterations.len());
            StepOutput::for_loop(input, summary, StepStatus::Succeeded)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::execution::engine::Executors;
    use crate::executors::testing::{FakeCode, MemoryStorage};
    use crate::executors::{ExecutorError, IntegrationRegistry};
    use crate::workflow::model::{Flow, Job, Trigger};

    fn context(code: Arc<FakeCode>, payload: Value) -> RunContext {
        let job = Job::new("run-1", "flow-1", Flow::new(Trigger::webhook(None))).with_trigger_payload(payload);
        let mut ctx = RunContext::new(
            &job,
            Executors::new(code, Arc::new(IntegrationRegistry::new()), Arc::new(MemoryStorage::new())),
        );
        ctx.seed_trigger(&job);
        ctx
    }

    fn loop_settings(items: Value) -> LoopSettings {
        LoopSettings { items }
    }

    #[tokio::test]
    async fn test_loop_runs_body_per_item() {
        let code = Arc::new(FakeCode::echo());
        let mut ctx = context(code.clone(), json!({ "items": ["a", "b", "c"] }));
        let body = Action::code("visit", "visit.js", json!({ "item": "${each.currentItem}" }));

        let output = execute_loop(
            "each",
            &loop_settings(json!("${trigger.items}")),
            Some(&body),
            &mut ctx,
            &AncestorPath::root(),
        )
        .await;

        assert_eq!(output.status, StepStatus::Succeeded);
        assert_eq!(code.call_count("visit.js"), 3);

        let summary = output.as_loop().unwrap();
        assert_eq!(summary.current_iteration, 3);
        assert_eq!(summary.current_item, Some(json!("c")));
        assert_eq!(summary.iterations.len(), 3);
        assert_eq!(summary.iterations[1]["visit"].lookup(&[]), Some(json!({ "item": "b" })));
    }

    #[tokio::test]
    async fn test_loop_stops_at_failing_item() {
        let code = Arc::new(FakeCode::new(|_, input| {
            if input["item"] == json!("b") {
                Err(ExecutorError::failed("cannot handle b"))
            } else {
                Ok(input.clone())
            }
        }));
        let mut ctx = context(code.clone(), json!({}));
        let body = Action::code("visit", "visit.js", json!({ "item": "${each.currentItem}" }));

        let output = execute_loop(
            "each",
            &loop_settings(json!(["a", "b", "c"])),
            Some(&body),
            &mut ctx,
            &AncestorPath::root(),
        )
        .await;

        assert!(output.is_failed());
        assert_eq!(output.error_message.as_deref(), Some("cannot handle b"));
        assert_eq!(code.call_count("visit.js"), 2);

        let summary = output.as_loop().unwrap();
        assert_eq!(summary.iterations.len(), 2);
        assert_eq!(summary.iterations[0]["visit"].status, StepStatus::Succeeded);
        assert_eq!(summary.iterations[1]["visit"].status, StepStatus::Failed);
    }

    #[tokio::test]
    async fn test_empty_items() {
        let code = Arc::new(FakeCode::echo());
        let mut ctx = context(code.clone(), json!({}));
        let body = Action::code("visit", "visit.js", json!({}));

        let output = execute_loop("each", &loop_settings(json!([])), Some(&body), &mut ctx, &AncestorPath::root()).await;

        assert_eq!(output.status, StepStatus::Succeeded);
        assert_eq!(output.as_loop(), Some(&LoopOutput::default()));
        assert_eq!(code.calls().len(), 0);
    }

    #[tokio::test]
    async fn test_loop_without_body_counts_items() {
        let mut ctx = context(Arc::new(FakeCode::echo()), json!({}));

        let output = execute_loop("count", &loop_settings(json!([1, 2])), None, &mut ctx, &AncestorPath::root()).await;

        let summary = output.as_loop().unwrap();
        assert_eq!(output.status, StepStatus::Succeeded);
        assert_eq!(summary.current_iteration, 2);
        assert_eq!(summary.iterations, vec![Scope::new(), Scope::new()]);
    }

    #[tokio::test]
    async fn test_non_array_items_fail() {
        let mut ctx = context(Arc::new(FakeCode::echo()), json!({ "items": "abc" }));

        let output = execute_loop(
            "each",
            &loop_settings(json!("${trigger.items}")),
            None,
            &mut ctx,
            &AncestorPath::root(),
        )
        .await;

        assert!(output.is_failed());
        assert_eq!(
            output.error_message.as_deref(),
            Some("items must resolve to an array, got a string")
        );
        assert!(output.as_loop().is_none());
    }

    #[tokio::test]
    async fn test_summary_visible_during_iteration() {
        let code = Arc::new(FakeCode::echo());
        let mut ctx = context(code.clone(), json!({}));
        let body = Action::code(
            "peek",
            "peek.js",
            json!({ "n": "${each.currentIteration}", "label": "item ${each.currentItem}" }),
        );

        execute_loop("each", &loop_settings(json!(["x", "y"])), Some(&body), &mut ctx, &AncestorPath::root()).await;

        let inputs: Vec<Value> = code.calls().into_iter().map(|(_, input)| input).collect();
        assert_eq!(
            inputs,
            vec![json!({ "n": 1, "label": "item x" }), json!({ "n": 2, "label": "item y" })]
        );
    }
}
