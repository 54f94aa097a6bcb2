//! Flow Validation
//!
//! Structural checks run once a flow has been built:
//! - Step name validation (non-empty, not reserved)
//! - Name uniqueness across the whole tree, nested loop chains included
//! - References to unknown steps (reported as warnings only, they resolve to `null`)
//!
//! Chains are owned boxes, so cycles cannot be expressed and need no check.

use std::collections::HashSet;

use log::{debug, info, warn};
use serde_json::Value;

use crate::error::FlowError;
use crate::execution::variables::{extract_references, parse_reference};

use super::model::{Action, ActionKind, Flow};

/// Names that are resolver roots and cannot be used by steps.
pub const RESERVED_NAMES: &[&str] = &["trigger", "configs"];

/// Validation error types for user-friendly error messages.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    EmptyStepName,
    DuplicateStepName(String),
    ReservedStepName(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyStepName => write!(f, "Step has empty or whitespace-only name"),
            Self::DuplicateStepName(name) => write!(f, "Duplicate step name: '{}'", name),
            Self::ReservedStepName(name) => {
                write!(f, "Step name '{}' is reserved", name)
            }
        }
    }
}

/// Validates a single action's own fields.
fn validate_action(action: &Action) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if action.name.trim().is_empty() {
        errors.push(ValidationError::EmptyStepName);
        return errors;
    }

    if RESERVED_NAMES.contains(&action.name.as_str()) {
        errors.push(ValidationError::ReservedStepName(action.name.clone()));
    }

    if let ActionKind::LoopOnItems {
        first_loop_action: None,
        ..
    } = &action.kind
    {
        debug!("Loop '{}' has no nested actions", action.name);
    }

    errors
}

/// Collects every validation problem in the flow.
pub fn collect_errors(flow: &Flow) -> Vec<ValidationError> {
    let mut all_errors = Vec::new();
    let mut seen_names: HashSet<&str> = HashSet::new();

    for action in flow.actions() {
        all_errors.extend(validate_action(action));

        if !action.name.is_empty() && !seen_names.insert(action.name.as_str()) {
            all_errors.push(ValidationError::DuplicateStepName(action.name.clone()));
        }
    }

    all_errors
}

/// Settings values of an action that may hold placeholders.
fn templates(action: &Action) -> Vec<&Value> {
    match &action.kind {
        ActionKind::Code(settings) => vec![&settings.input],
        ActionKind::NamedIntegration(settings) => vec![&settings.input],
        ActionKind::Storage(settings) => {
            let mut values = vec![&settings.key];
            values.extend(settings.value.as_ref());
            values
        }
        ActionKind::Response(settings) => vec![&settings.output],
        ActionKind::LoopOnItems { settings, .. } => vec![&settings.items],
    }
}

fn collect_strings<'a>(value: &'a Value, out: &mut Vec<&'a str>) {
    match value {
        Value::String(text) => out.push(text),
        Value::Array(items) => items.iter().for_each(|item| collect_strings(item, out)),
        Value::Object(map) => map.values().for_each(|nested| collect_strings(nested, out)),
        _ => {}
    }
}

/// Finds placeholders whose root is neither a step of the flow nor a
/// reserved root, as `(step name, reference)` pairs.
pub fn unknown_references(flow: &Flow) -> Vec<(String, String)> {
    let actions = flow.actions();
    let known: HashSet<&str> = actions
        .iter()
        .map(|action| action.name.as_str())
        .chain(RESERVED_NAMES.iter().copied())
        .collect();

    let mut unknown = Vec::new();
    for action in &actions {
        let mut strings = Vec::new();
        for value in templates(action) {
            collect_strings(value, &mut strings);
        }
        for reference in strings.into_iter().flat_map(extract_references) {
            let root = parse_reference(&reference).and_then(|segments| segments.into_iter().next());
            if !root.is_some_and(|root| known.contains(root.as_str())) {
                unknown.push((action.name.clone(), reference));
            }
        }
    }
    unknown
}

/// Validates the entire flow structure.
pub fn validate_flow(flow: &Flow) -> Result<(), FlowError> {
    let all_errors = collect_errors(flow);

    if !all_errors.is_empty() {
        let error_messages: Vec<String> = all_errors.iter().map(|e| e.to_string()).collect();
        return Err(FlowError::Validation(error_messages.join("\n")));
    }

    for (step, reference) in unknown_references(flow) {
        warn!("Step '{}' references unknown value '${{{}}}'", step, reference);
    }

    info!("Flow validated: {} actions", flow.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::model::Trigger;
    use serde_json::json;

    fn flow_of(actions: Vec<Action>) -> Flow {
        Flow::new(Trigger::webhook(Action::chain(actions)))
    }

    #[test]
    fn test_valid_flow() {
        let flow = flow_of(vec![
            Action::code("a", "a.js", json!({})),
            Action::response("b", json!(1)),
        ]);
        assert!(validate_flow(&flow).is_ok());
    }

    #[test]
    fn test_empty_flow_is_valid() {
        assert!(validate_flow(&flow_of(vec![])).is_ok());
    }

    #[test]
    fn test_duplicate_names() {
        let flow = flow_of(vec![
            Action::response("same", json!(1)),
            Action::response("same", json!(2)),
        ]);
        let errors = collect_errors(&flow);
        assert_eq!(errors, vec![ValidationError::DuplicateStepName("same".to_string())]);
    }

    #[test]
    fn test_duplicate_names_across_nesting() {
        let flow = flow_of(vec![Action::loop_on_items(
            "outer",
            json!([]),
            Action::chain(vec![Action::response("outer", json!(1))]),
        )]);
        let result = validate_flow(&flow);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Duplicate step name: 'outer'"));
    }

    #[test]
    fn test_reserved_names() {
        let flow = flow_of(vec![
            Action::response("trigger", json!(1)),
            Action::response("configs", json!(2)),
        ]);
        let errors = collect_errors(&flow);
        assert_eq!(errors.len(), 2);
        assert!(errors.contains(&ValidationError::ReservedStepName("trigger".to_string())));
        assert!(errors.contains(&ValidationError::ReservedStepName("configs".to_string())));
    }

    #[test]
    fn test_empty_name() {
        let flow = flow_of(vec![Action::response("   ", json!(1))]);
        assert_eq!(collect_errors(&flow), vec![ValidationError::EmptyStepName]);
    }

    #[test]
    fn test_unknown_references() {
        let flow = flow_of(vec![
            Action::code("a", "a.js", json!({ "x": "${trigger.x}", "r": "${configs.region}" })),
            Action::loop_on_items(
                "each",
                json!("${a.items}"),
                Action::chain(vec![Action::code("b", "b.js", json!({ "items": ["${each.currentItem}", "id ${ghost.id}"] }))]),
            ),
            Action::response("reply", json!("${typo.value}")),
        ]);

        assert_eq!(
            unknown_references(&flow),
            vec![
                ("b".to_string(), "ghost.id".to_string()),
                ("reply".to_string(), "typo.value".to_string()),
            ]
        );
        // unknown references never fail validation
        assert!(validate_flow(&flow).is_ok());
    }

    #[test]
    fn test_validation_error_display() {
        assert_eq!(
            ValidationError::DuplicateStepName("x".to_string()).to_string(),
            "Duplicate step name: 'x'"
        );
        assert_eq!(
            ValidationError::EmptyStepName.to_string(),
            "Step has empty or whitespace-only name"
        );
    }
}
