//! Named Integration Registry
//!
//! In-process lookup of integration actions: first by integration name,
//! then by action name within that integration. No transport is implied;
//! each registered action decides how it reaches its service.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info};
use serde_json::Value;

use super::{ExecutorError, IntegrationExecutor};

/// A single action offered by an integration.
#[async_trait]
pub trait IntegrationAction: Send + Sync {
    async fn run(&self, input: Value) -> Result<Value, ExecutorError>;
}

/// A named group of actions.
#[derive(Clone, Default)]
pub struct Integration {
    name: String,
    actions: HashMap<String, Arc<dyn IntegrationAction>>,
}

impl Integration {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            actions: HashMap::new(),
        }
    }

    /// Registers an action under `action_name`, replacing any previous one.
    pub fn with_action(mut self, action_name: impl Into<String>, action: impl IntegrationAction + 'static) -> Self {
        self.actions.insert(action_name.into(), Arc::new(action));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Names of the registered actions, sorted.
    pub fn action_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.actions.keys().map(String::as_str).collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for Integration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Integration")
            .field("name", &self.name)
            .field("actions", &self.action_names())
            .finish()
    }
}

/// Registry of integrations available to a run.
#[derive(Debug, Clone, Default)]
pub struct IntegrationRegistry {
    integrations: HashMap<String, Integration>,
}

impl IntegrationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an integration, replacing one with the same name.
    pub fn register(&mut self, integration: Integration) {
        info!(
            "Registered integration '{}' ({} actions)",
            integration.name,
            integration.actions.len()
        );
        self.integrations.insert(integration.name.clone(), integration);
    }

    pub fn with_integration(mut self, integration: Integration) -> Self {
        self.register(integration);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Integration> {
        self.integrations.get(name)
    }

    pub fn len(&self) -> usize {
        self.integrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.integrations.is_empty()
    }
}

#[async_trait]
impl IntegrationExecutor for IntegrationRegistry {
    async fn execute(&self, integration: &str, action: &str, input: Value) -> Result<Value, ExecutorError> {
        let found = self
            .integrations
            .get(integration)
            .ok_or_else(|| ExecutorError::IntegrationNotFound(integration.to_string()))?;

        let handler = found
            .actions
            .get(action)
            .ok_or_else(|| ExecutorError::ActionNotFound {
                integration: integration.to_string(),
                action: action.to_string(),
            })?;

        debug!("Dispatching {}.{}", integration, action);
        handler.run(input).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl IntegrationAction for Echo {
        async fn run(&self, input: Value) -> Result<Value, ExecutorError> {
            Ok(json!({ "echo": input }))
        }
    }

    struct Broken;

    #[async_trait]
    impl IntegrationAction for Broken {
        async fn run(&self, _input: Value) -> Result<Value, ExecutorError> {
            Err(ExecutorError::failed("rate limited"))
        }
    }

    fn registry() -> IntegrationRegistry {
        IntegrationRegistry::new().with_integration(
            Integration::new("demo")
                .with_action("echo", Echo)
                .with_action("broken", Broken),
        )
    }

    #[tokio::test]
    async fn test_dispatches_to_action() {
        let result = registry().execute("demo", "echo", json!({ "a": 1 })).await.unwrap();
        assert_eq!(result, json!({ "echo": { "a": 1 } }));
    }

    #[tokio::test]
    async fn test_integration_not_found() {
        let err = registry().execute("missing", "echo", json!({})).await.unwrap_err();
        assert!(matches!(err, ExecutorError::IntegrationNotFound(ref name) if name == "missing"));
    }

    #[tokio::test]
    async fn test_action_not_found() {
        let err = registry().execute("demo", "teleport", json!({})).await.unwrap_err();
        assert!(matches!(err, ExecutorError::ActionNotFound { ref action, .. } if action == "teleport"));
    }

    #[tokio::test]
    async fn test_action_error_passes_through() {
        let err = registry().execute("demo", "broken", json!({})).await.unwrap_err();
        assert_eq!(err.to_string(), "rate limited");
    }

    #[test]
    fn test_registry_listing() {
        let registry = registry();
        assert_eq!(registry.len(), 1);
        assert!(!registry.is_empty());
        assert_eq!(registry.get("demo").unwrap().action_names(), vec!["broken", "echo"]);
        assert!(registry.get("other").is_none());
    }
}
