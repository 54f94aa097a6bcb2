//! Variable Resolution
//!
//! Replaces `${...}` placeholders inside step settings with values read
//! from the execution trace.
//!
//! # Placeholder Syntax
//!
//! - `${trigger.body.id}` - field of the trigger payload
//! - `${step_name.items[0].name}` - field of a step's output
//! - `${loop_name.currentItem}` - current item of an enclosing loop
//! - `${configs.region}` - named configuration value of the job
//!
//! # Resolution Rules
//!
//! A string made of exactly one placeholder is replaced by the referenced
//! JSON value, keeping its type. The match is exact: any text around the
//! placeholder, whitespace included, makes it an embedded one, so
//! `" ${x} "` keeps its padding. Placeholders embedded in longer text are
//! rendered into the text (strings verbatim, everything else as compact
//! JSON). A reference that cannot be resolved yields `null` in both cases:
//! the dependent step sees the gap, the resolver itself never fails.

use indexmap::IndexMap;
use serde_json::{Map, Value};

use super::trace::{value_at, AncestorPath, ExecutionTrace};

/// Root name under which job configuration values are exposed.
pub const CONFIGS_ROOT: &str = "configs";

const OPEN: &str = "${";
const CLOSE: char = '}';

/// Read-only view used to resolve placeholders for one step.
///
/// Lookups follow the step's ancestor path, so a step inside a loop sees
/// the results of its own iteration first, then those of enclosing scopes.
#[derive(Debug, Clone, Copy)]
pub struct VariableResolver<'a> {
    trace: &'a ExecutionTrace,
    path: &'a AncestorPath,
    configs: &'a IndexMap<String, Value>,
}

impl<'a> VariableResolver<'a> {
    pub fn new(
        trace: &'a ExecutionTrace,
        path: &'a AncestorPath,
        configs: &'a IndexMap<String, Value>,
    ) -> Self {
        Self {
            trace,
            path,
            configs,
        }
    }

    /// Returns a copy of `value` with every placeholder resolved.
    ///
    /// # Example
    ///
    /// ```
    /// use flowrunner::execution::trace::{AncestorPath, ExecutionTrace, StepOutput};
    /// use flowrunner::execution::variables::VariableResolver;
    /// use indexmap::IndexMap;
    /// use serde_json::json;
    ///
    /// let mut trace = ExecutionTrace::new();
    /// let root = AncestorPath::root();
    /// trace.insert(&root, "trigger", StepOutput::succeeded(json!({}), json!({ "value": 5 })));
    ///
    /// let configs = IndexMap::new();
    /// let resolver = VariableResolver::new(&trace, &root, &configs);
    /// let resolved = resolver.resolve(&json!({ "x": "${trigger.value}", "label": "v=${trigger.value}" }));
    /// assert_eq!(resolved, json!({ "x": 5, "label": "v=5" }));
    /// ```
    pub fn resolve(&self, value: &Value) -> Value {
        match value {
            Value::String(text) => self.resolve_string(text),
            Value::Array(items) => Value::Array(items.iter().map(|item| self.resolve(item)).collect()),
            Value::Object(map) => {
                let mut resolved = Map::with_capacity(map.len());
                for (key, nested) in map {
                    resolved.insert(key.clone(), self.resolve(nested));
                }
                Value::Object(resolved)
            }
            _ => value.clone(),
        }
    }

    /// Looks up a single reference such as `step.items[0].id`.
    ///
    /// Returns `None` when any part of the reference is missing.
    pub fn lookup(&self, expression: &str) -> Option<Value> {
        let segments = parse_reference(expression)?;
        let (root, rest) = segments.split_first()?;

        if root == CONFIGS_ROOT {
            let (key, rest) = rest.split_first()?;
            return value_at(self.configs.get(key)?, rest).cloned();
        }

        self.trace.get(self.path, root)?.lookup(rest)
    }

    fn resolve_string(&self, text: &str) -> Value {
        if let Some(expression) = whole_placeholder(text) {
            return self.lookup(expression).unwrap_or(Value::Null);
        }
        if !text.contains(OPEN) {
            return Value::String(text.to_string());
        }

        let mut rendered = String::with_capacity(text.len());
        let mut remainder = text;

        while let Some(start) = remainder.find(OPEN) {
            rendered.push_str(&remainder[..start]);
            let after_open = &remainder[start + OPEN.len()..];
            let Some(end) = after_open.find(CLOSE) else {
                // unterminated placeholder stays verbatim
                rendered.push_str(&remainder[start..]);
                remainder = "";
                break;
            };
            let value = self.lookup(after_open[..end].trim()).unwrap_or(Value::Null);
            rendered.push_str(&render(&value));
            remainder = &after_open[end + 1..];
        }

        rendered.push_str(remainder);
        Value::String(rendered)
    }
}

/// Returns the expression if `text` is exactly one placeholder.
fn whole_placeholder(text: &str) -> Option<&str> {
    let inner = text.strip_prefix(OPEN)?.strip_suffix(CLOSE)?;
    if inner.contains(CLOSE) || inner.contains(OPEN) {
        return None;
    }
    Some(inner.trim())
}

/// Renders a value for embedding in a larger string.
fn render(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Splits `step.items[0].name` into `["step", "items", "0", "name"]`.
///
/// Returns `None` for empty references or empty bracket segments.
pub fn parse_reference(expression: &str) -> Option<Vec<String>> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut chars = expression.trim().chars();

    while let Some(character) = chars.next() {
        match character {
            '.' => {
                if !current.is_empty() {
                    segments.push(std::mem::take(&mut current));
                }
            }
            '[' => {
                if !current.is_empty() {
                    segments.push(std::mem::take(&mut current));
                }
                let inner: String = chars.by_ref().take_while(|c| *c != ']').collect();
                let inner = inner.trim().trim_matches(|c| c == '"' || c == '\'');
                if inner.is_empty() {
                    return None;
                }
                segments.push(inner.to_string());
            }
            _ => current.push(character),
        }
    }

    if !current.is_empty() {
        segments.push(current);
    }

    if segments.is_empty() {
        None
    } else {
        Some(segments)
    }
}

/// Extracts the raw expressions of every placeholder in `text`.
pub fn extract_references(text: &str) -> Vec<String> {
    let mut expressions = Vec::new();
    let mut remainder = text;

    while let Some(start) = remainder.find(OPEN) {
        let after_open = &remainder[start + OPEN.len()..];
        let Some(end) = after_open.find(CLOSE) else {
            break;
        };
        let expression = after_open[..end].trim();
        if !expression.is_empty() {
            expressions.push(expression.to_string());
        }
        remainder = &after_open[end + 1..];
    }

    expressions
}
