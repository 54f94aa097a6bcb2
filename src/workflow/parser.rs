//! Flow Parser
//!
//! Builds the typed action tree from an untyped job document.
//!
//! Dispatch is by the `kind` discriminator of each action node. Every kind
//! checks its own required settings up front, so an incomplete flow fails
//! here instead of halfway through a run. Building is pure: only
//! [`load_job_document`] touches the filesystem.
//!
//! Each action nests its successor one level deeper through `nextAction`,
//! so long flows produce deeply nested documents. JSON documents are read
//! without a depth limit. YAML documents are limited by `serde_yaml` to
//! 128 levels of nesting, which is roughly 125 chained actions; longer
//! flows have to be written as JSON.

use std::fs;
use std::path::Path;

use chrono::Utc;
use indexmap::IndexMap;
use log::{debug, info};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::FlowError;

use super::model::{
    Action, ActionKind, CodeSettings, Flow, IntegrationSettings, Job, LoopSettings,
    ResponseSettings, StorageOperation, StorageSettings, Trigger, TriggerKind,
};
use super::validator::validate_flow;

/// Default flow version used when a job does not name one.
const DEFAULT_FLOW_VERSION: &str = "default";

/// Action kinds recognised by the factory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KindTag {
    Code,
    NamedIntegration,
    Storage,
    Response,
    LoopOnItems,
}

impl KindTag {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "Code" | "CODE" => Some(Self::Code),
            "NamedIntegration" | "NAMED_INTEGRATION" => Some(Self::NamedIntegration),
            "Storage" | "STORAGE" => Some(Self::Storage),
            "Response" | "RESPONSE" => Some(Self::Response),
            "LoopOnItems" | "LOOP_ON_ITEMS" => Some(Self::LoopOnItems),
            _ => None,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobDocument {
    #[serde(default = "default_execution_id")]
    execution_id: String,
    #[serde(default = "default_flow_version")]
    flow_version_id: String,
    #[serde(default)]
    worker_token: Option<String>,
    #[serde(default)]
    configs: Vec<ConfigEntry>,
    #[serde(default)]
    trigger_payload: Value,
    flow: Value,
}

#[derive(Deserialize)]
struct ConfigEntry {
    key: String,
    #[serde(default)]
    value: Value,
}

fn default_execution_id() -> String {
    format!("run-{}", Utc::now().format("%Y%m%dT%H%M%S%3f"))
}

fn default_flow_version() -> String {
    DEFAULT_FLOW_VERSION.to_string()
}

/// Reads a job document from disk.
///
/// Files ending in `.yaml` or `.yml` are parsed as YAML, anything else as JSON.
/// JSON nesting depth is unbounded; see the module docs for the YAML limit.
///
/// # Example
///
/// ```rust,no_run
/// use flowrunner::workflow::parser::{load_job_document, parse_job};
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let document = load_job_document("job.json")?;
///     let job = parse_job(&document)?;
///     println!("Loaded {} actions", job.flow.len());
///     Ok(())
/// }
/// ```
pub fn load_job_document(path: &str) -> Result<Value, FlowError> {
    info!("Loading job from: {}", path);

    let content = fs::read_to_string(path).map_err(|source| FlowError::Io {
        path: path.to_string(),
        source,
    })?;

    debug!("Job content loaded ({} bytes)", content.len());

    let is_yaml = Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"))
        .unwrap_or(false);

    if is_yaml {
        serde_yaml::from_str(&content).map_err(|e| FlowError::Parse(e.to_string()))
    } else {
        parse_json_unbounded(&content).map_err(|e| FlowError::Parse(e.to_string()))
    }
}

/// Parses JSON of any nesting depth, growing the stack on demand.
fn parse_json_unbounded(content: &str) -> Result<Value, serde_json::Error> {
    let mut deserializer = serde_json::Deserializer::from_str(content);
    deserializer.disable_recursion_limit();
    let value = Value::deserialize(serde_stacker::Deserializer::new(&mut deserializer))?;
    deserializer.end()?;
    Ok(value)
}

/// Builds a [`Job`] from a job document.
pub fn parse_job(document: &Value) -> Result<Job, FlowError> {
    let raw: JobDocument =
        serde_json::from_value(document.clone()).map_err(|e| FlowError::Parse(e.to_string()))?;

    let flow = build_flow(&raw.flow)?;

    let mut configs = IndexMap::new();
    for entry in raw.configs {
        configs.insert(entry.key, entry.value);
    }

    info!(
        "Parsed job '{}': {} actions, {} configs",
        raw.execution_id,
        flow.len(),
        configs.len()
    );

    Ok(Job {
        execution_id: raw.execution_id,
        flow_version_id: raw.flow_version_id,
        worker_token: raw.worker_token,
        configs,
        trigger_payload: raw.trigger_payload,
        flow,
    })
}

/// Builds and validates a flow from a `{ "trigger": {...} }` document.
pub fn build_flow(document: &Value) -> Result<Flow, FlowError> {
    let object = as_object(document, "flow")?;
    let trigger = object
        .get("trigger")
        .ok_or(FlowError::MissingField("trigger"))?;

    let flow = Flow::new(build_trigger(trigger)?);
    validate_flow(&flow)?;
    Ok(flow)
}

/// Builds the trigger and the action chain hanging off it.
pub fn build_trigger(document: &Value) -> Result<Trigger, FlowError> {
    let object = as_object(document, "trigger")?;
    let settings = object
        .get("settings")
        .cloned()
        .unwrap_or_else(|| Value::Object(Map::new()));

    let kind = match object.get("kind").and_then(Value::as_str).unwrap_or("Empty") {
        "Empty" | "EMPTY" => TriggerKind::Empty,
        "Webhook" | "WEBHOOK" => TriggerKind::Webhook,
        "Schedule" | "SCHEDULE" => TriggerKind::Schedule {
            cron_expression: required_string(&settings, "trigger", "cronExpression")?,
        },
        "Component" | "COMPONENT" => TriggerKind::Component {
            integration_name: required_string(&settings, "trigger", "integrationName")?,
            trigger_name: required_string(&settings, "trigger", "triggerName")?,
        },
        other => return Err(FlowError::UnknownTriggerKind(other.to_string())),
    };

    Ok(Trigger {
        kind,
        settings,
        next_action: build_optional(object.get("nextAction"))?,
    })
}

/// Builds a single action node and, recursively, everything it links to.
pub fn build_action(document: &Value) -> Result<Action, FlowError> {
    let object = as_object(document, "action")?;

    let name = object
        .get("name")
        .and_then(Value::as_str)
        .ok_or(FlowError::MissingField("name"))?
        .trim()
        .to_string();

    let raw_kind = object
        .get("kind")
        .and_then(Value::as_str)
        .ok_or(FlowError::MissingField("kind"))?;

    let tag = KindTag::parse(raw_kind).ok_or_else(|| FlowError::UnknownActionKind {
        name: name.clone(),
        kind: raw_kind.to_string(),
    })?;

    let empty = Value::Object(Map::new());
    let settings = object.get("settings").unwrap_or(&empty);
    as_object(settings, &format!("settings of '{}'", name))?;

    let kind = match tag {
        KindTag::Code => {
            require(settings, &name, "artifact")?;
            let code: CodeSettings = decode(settings, &name)?;
            if code.artifact.trim().is_empty() {
                return Err(FlowError::missing_setting(&name, "artifact"));
            }
            ActionKind::Code(code)
        }
        KindTag::NamedIntegration => {
            require(settings, &name, "integrationName")?;
            require(settings, &name, "actionName")?;
            let integration: IntegrationSettings = decode(settings, &name)?;
            if integration.integration_name.trim().is_empty() {
                return Err(FlowError::missing_setting(&name, "integrationName"));
            }
            if integration.action_name.trim().is_empty() {
                return Err(FlowError::missing_setting(&name, "actionName"));
            }
            ActionKind::NamedIntegration(integration)
        }
        KindTag::Storage => {
            require(settings, &name, "operation")?;
            require(settings, &name, "key")?;
            let storage: StorageSettings = decode(settings, &name)?;
            if storage.operation == StorageOperation::Put && storage.value.is_none() {
                return Err(FlowError::missing_setting(&name, "value"));
            }
            ActionKind::Storage(storage)
        }
        KindTag::Response => {
            // `output: null` is a legitimate response, only absence is an error
            if !settings.as_object().is_some_and(|map| map.contains_key("output")) {
                return Err(FlowError::missing_setting(&name, "output"));
            }
            ActionKind::Response(decode::<ResponseSettings>(settings, &name)?)
        }
        KindTag::LoopOnItems => {
            require(settings, &name, "items")?;
            ActionKind::LoopOnItems {
                settings: decode::<LoopSettings>(settings, &name)?,
                first_loop_action: build_optional(object.get("firstLoopAction"))?,
            }
        }
    };

    debug!("Built {} action '{}'", kind.label(), name);

    Ok(Action {
        name,
        display_name: object
            .get("displayName")
            .and_then(Value::as_str)
            .map(str::to_string),
        kind,
        next_action: build_optional(object.get("nextAction"))?,
    })
}

/// Builds an optional linked action; `null` and absence both mean "none".
fn build_optional(document: Option<&Value>) -> Result<Option<Box<Action>>, FlowError> {
    match document {
        None | Some(Value::Null) => Ok(None),
        Some(value) => Ok(Some(Box::new(build_action(value)?))),
    }
}

fn as_object<'a>(value: &'a Value, context: &str) -> Result<&'a Map<String, Value>, FlowError> {
    value.as_object().ok_or_else(|| FlowError::NotAnObject {
        context: context.to_string(),
    })
}

/// Fails unless `field` is present and not null.
fn require(settings: &Value, action: &str, field: &'static str) -> Result<(), FlowError> {
    match settings.get(field) {
        None | Some(Value::Null) => Err(FlowError::missing_setting(action, field)),
        Some(_) => Ok(()),
    }
}

fn required_string(settings: &Value, action: &str, field: &'static str) -> Result<String, FlowError> {
    settings
        .get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| FlowError::missing_setting(action, field))
}

fn decode<T: DeserializeOwned>(settings: &Value, action: &str) -> Result<T, FlowError> {
    serde_json::from_value(settings.clone()).map_err(|source| FlowError::InvalidSettings {
        action: action.to_string(),
        source,
    })
}
