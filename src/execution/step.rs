//! Action Handlers
//!
//! One handler per action kind. Each handler resolves its settings against
//! the trace, performs its work through an executor and returns exactly
//! one [`StepOutput`]. Executor errors are folded into a failed output and
//! never propagate past the handler.

use log::{debug, warn};
use serde_json::{json, Value};

use crate::workflow::model::{
    Action, ActionKind, CodeSettings, IntegrationSettings, ResponseSettings, StorageOperation, StorageSettings,
};

use super::engine::RunContext;
use super::loop_step::execute_loop;
use super::trace::{AncestorPath, StepOutput};

/// Runs the handler for `action`'s kind.
///
/// Only the loop handler writes to the trace itself; every other handler
/// reads it through the resolver and leaves insertion to the interpreter.
pub async fn execute_action(action: &Action, ctx: &mut RunContext, path: &AncestorPath) -> StepOutput {
    debug!("Executing {} step '{}' at {}", action.kind.label(), action.name, path);

    match &action.kind {
        ActionKind::Code(settings) => execute_code(settings, ctx, path).await,
        ActionKind::NamedIntegration(settings) => execute_integration(settings, ctx, path).await,
        ActionKind::Storage(settings) => execute_storage(settings, ctx, path).await,
        ActionKind::Response(settings) => execute_response(settings, ctx, path),
        ActionKind::LoopOnItems {
            settings,
            first_loop_action,
        } => execute_loop(&action.name, settings, first_loop_action.as_deref(), ctx, path).await,
    }
}

async fn execute_code(settings: &CodeSettings, ctx: &RunContext, path: &AncestorPath) -> StepOutput {
    let resolved = ctx.resolver(path).resolve(&settings.input);
    let input = json!({ "artifact": settings.artifact, "input": resolved });

    match ctx.executors.code.execute(&settings.artifact, resolved).await {
        Ok(output) => StepOutput::succeeded(input, output),
        Err(e) => StepOutput::failed(input, e.to_string()),
    }
}

async fn execute_integration(settings: &IntegrationSettings, ctx: &RunContext, path: &AncestorPath) -> StepOutput {
    let resolved = ctx.resolver(path).resolve(&settings.input);
    let input = json!({
        "integrationName": settings.integration_name,
        "actionName": settings.action_name,
        "input": resolved,
    });

    match ctx
        .executors
        .integrations
        .execute(&settings.integration_name, &settings.action_name, resolved)
        .await
    {
        Ok(output) => StepOutput::succeeded(input, output),
        Err(e) => StepOutput::failed(input, e.to_string()),
    }
}

/// Converts a resolved key into its string form.
///
/// Only non-empty strings and numbers are usable keys.
fn storage_key(resolved: &Value) -> Result<String, String> {
    match resolved {
        Value::String(key) if key.trim().is_empty() => Err("storage key must not be empty".to_string()),
        Value::String(key) => Ok(key.clone()),
        Value::Number(number) => Ok(number.to_string()),
        other => Err(format!("storage key must resolve to a string or number, got {}", other)),
    }
}

async fn execute_storage(settings: &StorageSettings, ctx: &RunContext, path: &AncestorPath) -> StepOutput {
    let resolver = ctx.resolver(path);
    let resolved_key = resolver.resolve(&settings.key);
    let resolved_value = settings.value.as_ref().map(|value| resolver.resolve(value));

    let mut input = json!({
        "operation": settings.operation,
        "key": resolved_key,
        "scope": settings.scope,
    });
    if let Some(value) = &resolved_value {
        input["value"] = value.clone();
    }

    let key = match storage_key(&resolved_key) {
        Ok(key) => key,
        Err(message) => return StepOutput::failed(input, message),
    };
    let scoped_key = settings
        .scope
        .scoped_key(&ctx.flow_version_id, &ctx.execution_id, &key);

    let result = match settings.operation {
        StorageOperation::Get => ctx
            .executors
            .storage
            .get(&scoped_key)
            .await
            .map(|found| found.unwrap_or(Value::Null)),
        StorageOperation::Put => {
            let value = resolved_value.unwrap_or(Value::Null);
            ctx.executors.storage.put(&scoped_key, value).await
        }
    };

    match result {
        Ok(output) => StepOutput::succeeded(input, output),
        Err(e) => {
            warn!("Storage request for '{}' failed: {}", scoped_key, e);
            StepOutput::failed(input, e.to_string())
        }
    }
}

fn execute_response(settings: &ResponseSettings, ctx: &RunContext, path: &AncestorPath) -> StepOutput {
    let output = ctx.resolver(path).resolve(&settings.output);
    StepOutput::succeeded(json!({ "output": output }), output)
}
