//! Flow Data Model
//!
//! Typed, in-memory representation of a flow: a trigger followed by a
//! singly-linked chain of actions. Loops own a second, nested chain.
//!
//! # Example JSON Format
//!
//! ```json
//! {
//!   "trigger": {
//!     "kind": "Webhook",
//!     "nextAction": {
//!       "kind": "LoopOnItems",
//!       "name": "each_order",
//!       "settings": { "items": "${trigger.orders}" },
//!       "firstLoopAction": {
//!         "kind": "Code",
//!         "name": "price_order",
//!         "settings": { "artifact": "price.js", "input": { "order": "${each_order.currentItem}" } }
//!       },
//!       "nextAction": {
//!         "kind": "Response",
//!         "name": "reply",
//!         "settings": { "output": "${each_order.iterations}" }
//!       }
//!     }
//!   }
//! }
//! ```

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::executors::storage::StoreScope;

/// Settings of a `Code` action.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CodeSettings {
    /// Opaque reference to the code artifact to run
    pub artifact: String,

    /// Input object, may contain `${...}` placeholders
    #[serde(default)]
    pub input: Value,
}

/// Settings of a `NamedIntegration` action.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationSettings {
    pub integration_name: String,
    pub action_name: String,
    #[serde(default)]
    pub input: Value,
}

/// Storage operation performed by a `Storage` action.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageOperation {
    #[serde(alias = "GET")]
    Get,
    #[serde(alias = "PUT")]
    Put,
}

/// Settings of a `Storage` action.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StorageSettings {
    pub operation: StorageOperation,

    /// Key template, must resolve to a string or a number
    pub key: Value,

    /// Value template (required for `Put`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,

    #[serde(default)]
    pub scope: StoreScope,
}

/// Settings of a `Response` action.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResponseSettings {
    pub output: Value,
}

/// Settings of a `LoopOnItems` action.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LoopSettings {
    /// Template that must resolve to an array
    pub items: Value,
}

/// The closed set of action kinds with their kind-specific payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionKind {
    Code(CodeSettings),
    NamedIntegration(IntegrationSettings),
    Storage(StorageSettings),
    Response(ResponseSettings),
    LoopOnItems {
        settings: LoopSettings,
        first_loop_action: Option<Box<Action>>,
    },
}

impl ActionKind {
    /// Canonical discriminator string of this kind.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Code(_) => "Code",
            Self::NamedIntegration(_) => "NamedIntegration",
            Self::Storage(_) => "Storage",
            Self::Response(_) => "Response",
            Self::LoopOnItems { .. } => "LoopOnItems",
        }
    }
}

/// A single node of the action tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    /// Unique name of the step within the flow
    pub name: String,

    /// Optional human-readable label
    pub display_name: Option<String>,

    pub kind: ActionKind,

    /// Next action in this chain
    pub next_action: Option<Box<Action>>,
}

impl Action {
    /// Creates an action with no successor.
    pub fn new(name: impl Into<String>, kind: ActionKind) -> Self {
        Self {
            name: name.into().trim().to_string(),
            display_name: None,
            kind,
            next_action: None,
        }
    }

    /// Creates a `Code` action.
    ///
    /// # Example
    ///
    /// ```
    /// use flowrunner::workflow::Action;
    /// use serde_json::json;
    ///
    /// let step = Action::code("double", "double.js", json!({ "x": "${trigger.value}" }));
    /// assert_eq!(step.kind.label(), "Code");
    /// ```
    pub fn code(name: impl Into<String>, artifact: impl Into<String>, input: Value) -> Self {
        Self::new(
            name,
            ActionKind::Code(CodeSettings {
                artifact: artifact.into(),
                input,
            }),
        )
    }

    /// Creates a `NamedIntegration` action.
    pub fn integration(
        name: impl Into<String>,
        integration_name: impl Into<String>,
        action_name: impl Into<String>,
        input: Value,
    ) -> Self {
        Self::new(
            name,
            ActionKind::NamedIntegration(IntegrationSettings {
                integration_name: integration_name.into(),
                action_name: action_name.into(),
                input,
            }),
        )
    }

    /// Creates a `Storage` action.
    pub fn storage(name: impl Into<String>, settings: StorageSettings) -> Self {
        Self::new(name, ActionKind::Storage(settings))
    }

    /// Creates a `Response` action.
    pub fn response(name: impl Into<String>, output: Value) -> Self {
        Self::new(name, ActionKind::Response(ResponseSettings { output }))
    }

    /// Creates a `LoopOnItems` action running `body` once per item.
    pub fn loop_on_items(name: impl Into<String>, items: Value, body: Option<Box<Action>>) -> Self {
        Self::new(
            name,
            ActionKind::LoopOnItems {
                settings: LoopSettings { items },
                first_loop_action: body,
            },
        )
    }

    /// Sets the next action.
    pub fn with_next(mut self, next: Action) -> Self {
        self.next_action = Some(Box::new(next));
        self
    }

    /// Links a list of actions into a chain, returning its head.
    pub fn chain(actions: Vec<Action>) -> Option<Box<Action>> {
        actions.into_iter().rev().fold(None, |next, mut action| {
            action.next_action = next;
            Some(Box::new(action))
        })
    }

    /// Iterates this action and its successors in `nextAction` order.
    pub fn iter_chain(&self) -> ChainIter<'_> {
        ChainIter {
            current: Some(self),
        }
    }

    /// Collects every action reachable from this one, nested chains included,
    /// in depth-first order.
    pub fn walk<'a>(&'a self, visited: &mut Vec<&'a Action>) {
        for action in self.iter_chain() {
            visited.push(action);
            if let ActionKind::LoopOnItems {
                first_loop_action: Some(body),
                ..
            } = &action.kind
            {
                body.walk(visited);
            }
        }
    }
}

/// Iterator over one chain of actions.
pub struct ChainIter<'a> {
    current: Option<&'a Action>,
}

impl<'a> Iterator for ChainIter<'a> {
    type Item = &'a Action;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.current?;
        self.current = current.next_action.as_deref();
        Some(current)
    }
}

/// Kind of trigger that started the flow.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum TriggerKind {
    Empty,
    Webhook,
    Schedule {
        cron_expression: String,
    },
    #[serde(rename_all = "camelCase")]
    Component {
        integration_name: String,
        trigger_name: String,
    },
}

/// Root of a flow.
#[derive(Debug, Clone, PartialEq)]
pub struct Trigger {
    pub kind: TriggerKind,

    /// Raw trigger settings, recorded as the seed step's input
    pub settings: Value,

    pub next_action: Option<Box<Action>>,
}

impl Trigger {
    /// Creates a webhook trigger followed by `next_action`.
    pub fn webhook(next_action: Option<Box<Action>>) -> Self {
        Self {
            kind: TriggerKind::Webhook,
            settings: Value::Object(Default::default()),
            next_action,
        }
    }
}

/// A complete flow definition.
#[derive(Debug, Clone, PartialEq)]
pub struct Flow {
    pub trigger: Trigger,
}

impl Flow {
    pub fn new(trigger: Trigger) -> Self {
        Self { trigger }
    }

    /// Head of the top-level action chain.
    pub fn first_action(&self) -> Option<&Action> {
        self.trigger.next_action.as_deref()
    }

    /// Every action of the flow, nested chains included.
    pub fn actions(&self) -> Vec<&Action> {
        let mut visited = Vec::new();
        if let Some(head) = self.first_action() {
            head.walk(&mut visited);
        }
        visited
    }

    /// Returns the number of actions in the flow.
    pub fn len(&self) -> usize {
        self.actions().len()
    }

    /// Returns true if the trigger has no actions.
    pub fn is_empty(&self) -> bool {
        self.trigger.next_action.is_none()
    }
}

/// One run's worth of input: the flow plus everything it may reference.
#[derive(Debug, Clone)]
pub struct Job {
    /// Identifier of this run (scopes run-level storage)
    pub execution_id: String,

    /// Identifier of the flow definition (scopes flow-level storage)
    pub flow_version_id: String,

    /// Bearer credential for the storage boundary
    pub worker_token: Option<String>,

    /// Named configuration values, exposed as `${configs.<key>}`
    pub configs: IndexMap<String, Value>,

    /// Output of the trigger, exposed as `${trigger...}`
    pub trigger_payload: Value,

    pub flow: Flow,
}

impl Job {
    /// Creates a job with empty configs and a null trigger payload.
    pub fn new(execution_id: impl Into<String>, flow_version_id: impl Into<String>, flow: Flow) -> Self {
        Self {
            execution_id: execution_id.into(),
            flow_version_id: flow_version_id.into(),
            worker_token: None,
            configs: IndexMap::new(),
            trigger_payload: Value::Null,
            flow,
        }
    }

    pub fn with_trigger_payload(mut self, payload: Value) -> Self {
        self.trigger_payload = payload;
        self
    }

    pub fn with_config(mut self, key: impl Into<String>, value: Value) -> Self {
        self.configs.insert(key.into(), value);
        self
    }

    pub fn with_worker_token(mut self, token: impl Into<String>) -> Self {
        self.worker_token = Some(token.into());
        self
    }
}
