//! Execution Trace
//!
//! The append/update log of step results for one run.
//!
//! Top-level steps live in an insertion-ordered map keyed by step name. A
//! loop keeps the results of its nested chain inside its own entry, one
//! scope per iteration, so the same step name at iteration 3 and at
//! iteration 7 never collide. An [`AncestorPath`] of `(loop name, index)`
//! pairs addresses the scope a nested step writes into.
//!
//! The trace is mutated in place by the interpreter and the loop handler;
//! entries are never removed during a run.
//!
//! Loop summaries serialize with the same field names a code step could
//! produce, so every loop entry also carries `"outputKind": "LOOP_ON_ITEMS"`.
//! Reading a trace back relies on that marker alone, never on the shape
//! of `output`.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

/// One scope of step results, keyed by step name in insertion order.
pub type Scope = IndexMap<String, StepOutput>;

/// Final status of a single step.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    Succeeded,
    Failed,
}

/// Output payload of a `LoopOnItems` step.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LoopOutput {
    /// 1-based index of the iteration in progress (or last run)
    pub current_iteration: usize,

    /// Item of the iteration in progress, undefined before the first one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_item: Option<Value>,

    /// Nested step results, one scope per iteration
    pub iterations: Vec<Scope>,
}

/// The shape a loop has before its first iteration.
impl Default for LoopOutput {
    fn default() -> Self {
        Self {
            current_iteration: 1,
            current_item: None,
            iterations: Vec::new(),
        }
    }
}

/// Marks entries whose `output` is not a plain value.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum OutputKind {
    LoopOnItems,
}

/// The value a step produced.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum StepValue {
    Loop(LoopOutput),
    Value(Value),
}

impl StepValue {
    fn kind(&self) -> Option<OutputKind> {
        match self {
            Self::Loop(_) => Some(OutputKind::LoopOnItems),
            Self::Value(_) => None,
        }
    }
}

impl Default for StepValue {
    fn default() -> Self {
        Self::Value(Value::Null)
    }
}

/// Result record of one executed step.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(try_from = "StepRecord")]
pub struct StepOutput {
    /// Resolved settings the step ran with
    pub input: Value,

    pub output: StepValue,

    pub status: StepStatus,

    pub error_message: Option<String>,

    /// Wall-clock duration in milliseconds
    pub duration_ms: u64,
}

/// Serialized form of a [`StepOutput`].
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StepRecordRef<'a> {
    input: &'a Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_kind: Option<OutputKind>,
    output: &'a StepValue,
    status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_message: Option<&'a str>,
    duration_ms: u64,
}

impl Serialize for StepOutput {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        StepRecordRef {
            input: &self.input,
            output_kind: self.output.kind(),
            output: &self.output,
            status: self.status,
            error_message: self.error_message.as_deref(),
            duration_ms: self.duration_ms,
        }
        .serialize(serializer)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StepRecord {
    input: Value,
    #[serde(default)]
    output_kind: Option<OutputKind>,
    output: Value,
    status: StepStatus,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    duration_ms: u64,
}

impl TryFrom<StepRecord> for StepOutput {
    type Error = serde_json::Error;

    fn try_from(record: StepRecord) -> Result<Self, Self::Error> {
        let output = match record.output_kind {
            Some(OutputKind::LoopOnItems) => StepValue::Loop(serde_json::from_value(record.output)?),
            None => StepValue::Value(record.output),
        };
        Ok(Self {
            input: record.input,
            output,
            status: record.status,
            error_message: record.error_message,
            duration_ms: record.duration_ms,
        })
    }
}

impl StepOutput {
    /// A successful step result.
    pub fn succeeded(input: Value, output: Value) -> Self {
        Self {
            input,
            output: StepValue::Value(output),
            status: StepStatus::Succeeded,
            error_message: None,
            duration_ms: 0,
        }
    }

    /// A failed step result carrying the error message.
    pub fn failed(input: Value, message: impl Into<String>) -> Self {
        Self {
            input,
            output: StepValue::Value(Value::Null),
            status: StepStatus::Failed,
            error_message: Some(message.into()),
            duration_ms: 0,
        }
    }

    /// A loop result with the given summary and history.
    pub fn for_loop(input: Value, output: LoopOutput, status: StepStatus) -> Self {
        Self {
            input,
            output: StepValue::Loop(output),
            status,
            error_message: None,
            duration_ms: 0,
        }
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    pub fn is_failed(&self) -> bool {
        self.status == StepStatus::Failed
    }

    pub fn as_loop(&self) -> Option<&LoopOutput> {
        match &self.output {
            StepValue::Loop(output) => Some(output),
            StepValue::Value(_) => None,
        }
    }

    pub fn as_loop_mut(&mut self) -> Option<&mut LoopOutput> {
        match &mut self.output {
            StepValue::Loop(output) => Some(output),
            StepValue::Value(_) => None,
        }
    }

    /// Reads a field of this step's output.
    ///
    /// An empty path returns the whole output. Loop outputs are navigated
    /// field by field so that reading `currentItem` does not serialize the
    /// whole iteration history.
    pub fn lookup(&self, path: &[String]) -> Option<Value> {
        match &self.output {
            StepValue::Value(value) => value_at(value, path).cloned(),
            StepValue::Loop(output) => {
                let Some((field, rest)) = path.split_first() else {
                    return serde_json::to_value(output).ok();
                };
                match field.as_str() {
                    "currentIteration" if rest.is_empty() => Some(Value::from(output.current_iteration)),
                    "currentItem" => output
                        .current_item
                        .as_ref()
                        .and_then(|item| value_at(item, rest))
                        .cloned(),
                    "iterations" => {
                        let history = serde_json::to_value(&output.iterations).ok()?;
                        value_at(&history, rest).cloned()
                    }
                    _ => None,
                }
            }
        }
    }
}

/// Navigates `path` inside `value`; array segments must be indices.
pub(crate) fn value_at<'a>(value: &'a Value, path: &[String]) -> Option<&'a Value> {
    path.iter().try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Position inside nested loops: `(loop step name, iteration index)` pairs,
/// outermost first.
///
/// Paths are immutable; [`AncestorPath::push`] returns a new path for the
/// callee and the caller keeps its own, so leaving an iteration is simply
/// dropping the child path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AncestorPath {
    frames: Vec<(String, usize)>,
}

impl AncestorPath {
    /// The empty, top-level path.
    pub fn root() -> Self {
        Self::default()
    }

    /// Returns a new path one loop iteration deeper.
    pub fn push(&self, loop_name: &str, index: usize) -> Self {
        let mut frames = self.frames.clone();
        frames.push((loop_name.to_string(), index));
        Self { frames }
    }

    pub fn is_root(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn frames(&self) -> &[(String, usize)] {
        &self.frames
    }
}

impl fmt::Display for AncestorPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.frames.is_empty() {
            return write!(f, "/");
        }
        for (name, index) in &self.frames {
            write!(f, "/{}[{}]", name, index)?;
        }
        Ok(())
    }
}

/// Step results of one run.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(transparent)]
pub struct ExecutionTrace {
    steps: Scope,
}

impl ExecutionTrace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Top-level entries in insertion order.
    pub fn steps(&self) -> &Scope {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// The scope addressed by `path`.
    pub fn scope(&self, path: &AncestorPath) -> Option<&Scope> {
        let mut scope = &self.steps;
        for (loop_name, index) in path.frames() {
            scope = scope.get(loop_name)?.as_loop()?.iterations.get(*index)?;
        }
        Some(scope)
    }

    /// Mutable access to the scope addressed by `path`.
    pub fn scope_mut(&mut self, path: &AncestorPath) -> Option<&mut Scope> {
        let mut scope = &mut self.steps;
        for (loop_name, index) in path.frames() {
            scope = scope
                .get_mut(loop_name)?
                .as_loop_mut()?
                .iterations
                .get_mut(*index)?;
        }
        Some(scope)
    }

    /// Inserts or replaces the entry for `name` in the scope at `path`.
    ///
    /// Replacing keeps the entry's original position. Returns false when
    /// `path` does not address an existing scope.
    pub fn insert(&mut self, path: &AncestorPath, name: &str, output: StepOutput) -> bool {
        match self.scope_mut(path) {
            Some(scope) => {
                scope.insert(name.to_string(), output);
                true
            }
            None => false,
        }
    }

    /// The entry for `name` in exactly the scope at `path`.
    pub fn get_exact(&self, path: &AncestorPath, name: &str) -> Option<&StepOutput> {
        self.scope(path)?.get(name)
    }

    pub fn get_exact_mut(&mut self, path: &AncestorPath, name: &str) -> Option<&mut StepOutput> {
        self.scope_mut(path)?.get_mut(name)
    }

    /// Looks `name` up as seen from `path`: the innermost iteration scope
    /// first, then each enclosing scope out to the top level.
    pub fn get(&self, path: &AncestorPath, name: &str) -> Option<&StepOutput> {
        let mut visible = Vec::with_capacity(path.depth() + 1);
        let mut scope = &self.steps;
        visible.push(scope);
        for (loop_name, index) in path.frames() {
            match scope
                .get(loop_name)
                .and_then(StepOutput::as_loop)
                .and_then(|output| output.iterations.get(*index))
            {
                Some(inner) => {
                    scope = inner;
                    visible.push(scope);
                }
                None => break,
            }
        }
        visible.iter().rev().find_map(|scope| scope.get(name))
    }

    /// First failed top-level entry in insertion order.
    pub fn first_failure(&self) -> Option<(&str, &StepOutput)> {
        self.steps
            .iter()
            .find(|(_, output)| output.is_failed())
            .map(|(name, output)| (name.as_str(), output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn loop_entry(iterations: usize) -> StepOutput {
        StepOutput::for_loop(
            json!({}),
            LoopOutput {
                current_iteration: iterations,
                current_item: None,
                iterations: (0..iterations).map(|_| Scope::new()).collect(),
            },
            StepStatus::Succeeded,
        )
    }

    #[test]
    fn test_insert_and_get_top_level() {
        let mut trace = ExecutionTrace::new();
        let root = AncestorPath::root();
        assert!(trace.insert(&root, "a", StepOutput::succeeded(json!({}), json!(1))));

        assert_eq!(trace.len(), 1);
        assert_eq!(trace.get(&root, "a").unwrap().lookup(&[]), Some(json!(1)));
    }

    #[test]
    fn test_insert_replaces_in_place() {
        let mut trace = ExecutionTrace::new();
        let root = AncestorPath::root();
        trace.insert(&root, "a", StepOutput::succeeded(json!({}), json!(1)));
        trace.insert(&root, "b", StepOutput::succeeded(json!({}), json!(2)));
        trace.insert(&root, "a", StepOutput::failed(json!({}), "boom"));

        let names: Vec<&String> = trace.steps().keys().collect();
        assert_eq!(names, vec!["a", "b"]);
        assert!(trace.get(&root, "a").unwrap().is_failed());
    }

    #[test]
    fn test_nested_scopes_do_not_collide() {
        let mut trace = ExecutionTrace::new();
        let root = AncestorPath::root();
        trace.insert(&root, "loop", loop_entry(2));

        let first = root.push("loop", 0);
        let second = root.push("loop", 1);
        assert!(trace.insert(&first, "inner", StepOutput::succeeded(json!({}), json!("a"))));
        assert!(trace.insert(&second, "inner", StepOutput::succeeded(json!({}), json!("b"))));

        assert_eq!(trace.get(&first, "inner").unwrap().lookup(&[]), Some(json!("a")));
        assert_eq!(trace.get(&second, "inner").unwrap().lookup(&[]), Some(json!("b")));
        assert!(trace.get(&root, "inner").is_none());
        assert_eq!(trace.len(), 1);
    }

    #[test]
    fn test_get_falls_back_to_enclosing_scopes() {
        let mut trace = ExecutionTrace::new();
        let root = AncestorPath::root();
        trace.insert(&root, "before", StepOutput::succeeded(json!({}), json!(42)));
        trace.insert(&root, "loop", loop_entry(1));

        let inside = root.push("loop", 0);
        assert_eq!(trace.get(&inside, "before").unwrap().lookup(&[]), Some(json!(42)));
        assert!(trace.get(&inside, "loop").is_some());
        assert!(trace.get_exact(&inside, "before").is_none());
    }

    #[test]
    fn test_insert_into_missing_scope() {
        let mut trace = ExecutionTrace::new();
        let path = AncestorPath::root().push("ghost", 0);
        assert!(!trace.insert(&path, "x", StepOutput::succeeded(json!({}), json!(1))));
    }

    #[test]
    fn test_first_failure_in_insertion_order() {
        let mut trace = ExecutionTrace::new();
        let root = AncestorPath::root();
        trace.insert(&root, "ok", StepOutput::succeeded(json!({}), json!(1)));
        trace.insert(&root, "bad1", StepOutput::failed(json!({}), "first"));
        trace.insert(&root, "bad2", StepOutput::failed(json!({}), "second"));

        let (name, output) = trace.first_failure().unwrap();
        assert_eq!(name, "bad1");
        assert_eq!(output.error_message.as_deref(), Some("first"));
    }

    #[test]
    fn test_loop_lookup_fields() {
        let output = StepOutput::for_loop(
            json!({}),
            LoopOutput {
                current_iteration: 2,
                current_item: Some(json!({ "id": 7 })),
                iterations: vec![Scope::new(), Scope::new()],
            },
            StepStatus::Succeeded,
        );

        assert_eq!(output.lookup(&["currentIteration".to_string()]), Some(json!(2)));
        assert_eq!(
            output.lookup(&["currentItem".to_string(), "id".to_string()]),
            Some(json!(7))
        );
        assert_eq!(output.lookup(&["iterations".to_string()]), Some(json!([{}, {}])));
        assert_eq!(output.lookup(&["unknown".to_string()]), None);
    }

    #[test]
    fn test_value_at_arrays_and_objects() {
        let value = json!({ "items": [{ "name": "a" }, { "name": "b" }] });
        let path: Vec<String> = vec!["items".into(), "1".into(), "name".into()];
        assert_eq!(value_at(&value, &path), Some(&json!("b")));

        let bad: Vec<String> = vec!["items".into(), "x".into()];
        assert_eq!(value_at(&value, &bad), None);
    }

    #[test]
    fn test_ancestor_path_push_is_non_destructive() {
        let root = AncestorPath::root();
        let child = root.push("outer", 2);
        let grandchild = child.push("inner", 0);

        assert!(root.is_root());
        assert_eq!(child.depth(), 1);
        assert_eq!(grandchild.depth(), 2);
        assert_eq!(grandchild.to_string(), "/outer[2]/inner[0]");
        assert_eq!(root.to_string(), "/");
    }

    #[test]
    fn test_serialized_shape() {
        let mut trace = ExecutionTrace::new();
        let root = AncestorPath::root();
        trace.insert(&root, "loop", StepOutput::for_loop(json!({ "items": [] }), LoopOutput::default(), StepStatus::Succeeded));
        trace.insert(&root, "bad", StepOutput::failed(json!({}), "nope"));

        let value = serde_json::to_value(&trace).unwrap();
        assert_eq!(
            value["loop"]["output"],
            json!({ "currentIteration": 1, "iterations": [] })
        );
        assert_eq!(value["loop"]["outputKind"], "LOOP_ON_ITEMS");
        assert_eq!(value["bad"]["status"], "FAILED");
        assert_eq!(value["bad"]["errorMessage"], "nope");
        assert_eq!(value["bad"]["output"], Value::Null);
        assert!(value["bad"].get("outputKind").is_none());
    }

    #[test]
    fn test_read_back_keeps_loop_and_value_apart() {
        let mut trace = ExecutionTrace::new();
        let root = AncestorPath::root();
        let lookalike = json!({ "currentIteration": 2, "iterations": [] });
        trace.insert(&root, "code", StepOutput::succeeded(json!({}), lookalike.clone()));
        trace.insert(&root, "each", loop_entry(2));
        assert!(trace.insert(&root.push("each", 1), "inner", StepOutput::succeeded(json!({}), lookalike.clone())));

        let text = serde_json::to_string(&trace).unwrap();
        let restored: ExecutionTrace = serde_json::from_str(&text).unwrap();

        assert_eq!(restored, trace);
        assert_eq!(restored.steps()["code"].output, StepValue::Value(lookalike.clone()));
        assert!(restored.steps()["each"].as_loop().is_some());
        let inner = restored.get_exact(&root.push("each", 1), "inner").unwrap();
        assert_eq!(inner.output, StepValue::Value(lookalike));
    }

    #[test]
    fn test_read_back_rejects_malformed_loop() {
        let text = r#"{ "each": { "input": {}, "outputKind": "LOOP_ON_ITEMS", "output": 3, "status": "SUCCEEDED" } }"#;
        assert!(serde_json::from_str::<ExecutionTrace>(text).is_err());
    }
}
