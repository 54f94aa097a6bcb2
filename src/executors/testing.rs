//! In-memory executors for tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use super::{CodeExecutor, ExecutorError, StorageExecutor};

type Behavior = Box<dyn Fn(&str, &Value) -> Result<Value, ExecutorError> + Send + Sync>;

/// Code executor that records every call and answers with a closure.
pub(crate) struct FakeCode {
    calls: Mutex<Vec<(String, Value)>>,
    behavior: Behavior,
}

impl FakeCode {
    pub(crate) fn new(behavior: impl Fn(&str, &Value) -> Result<Value, ExecutorError> + Send + Sync + 'static) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            behavior: Box::new(behavior),
        }
    }

    /// Returns its input unchanged.
    pub(crate) fn echo() -> Self {
        Self::new(|_, input| Ok(input.clone()))
    }

    pub(crate) fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn call_count(&self, artifact: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _)| name == artifact)
            .count()
    }
}

#[async_trait]
impl CodeExecutor for FakeCode {
    async fn execute(&self, artifact: &str, input: Value) -> Result<Value, ExecutorError> {
        self.calls.lock().unwrap().push((artifact.to_string(), input.clone()));
        (self.behavior)(artifact, &input)
    }
}

/// Storage held in a map.
#[derive(Default)]
pub(crate) struct MemoryStorage {
    entries: Mutex<HashMap<String, Value>>,
}

impl MemoryStorage {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn entry(&self, key: &str) -> Option<Value> {
        self.entries.lock().unwrap().get(key).cloned()
    }

    pub(crate) fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.lock().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl StorageExecutor for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<Value>, ExecutorError> {
        Ok(self.entry(key))
    }

    async fn put(&self, key: &str, value: Value) -> Result<Value, ExecutorError> {
        self.entries.lock().unwrap().insert(key.to_string(), value.clone());
        Ok(value)
    }
}

/// Storage whose every request fails.
pub(crate) struct UnavailableStorage;

#[async_trait]
impl StorageExecutor for UnavailableStorage {
    async fn get(&self, _key: &str) -> Result<Option<Value>, ExecutorError> {
        Err(ExecutorError::Status {
            status: 503,
            body: "unavailable".to_string(),
        })
    }

    async fn put(&self, _key: &str, _value: Value) -> Result<Value, ExecutorError> {
        Err(ExecutorError::Status {
            status: 503,
            body: "unavailable".to_string(),
        })
    }
}
