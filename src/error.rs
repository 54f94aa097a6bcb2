//! Construction Errors
//!
//! Errors raised while turning a job document into a runnable flow.
//! All of these are fatal: they abort the run before any step executes.

use thiserror::Error;

/// Errors produced while loading a job or building its action tree.
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("failed to read job file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse job document: {0}")]
    Parse(String),

    #[error("{context} must be an object")]
    NotAnObject { context: String },

    #[error("action is missing required field '{0}'")]
    MissingField(&'static str),

    #[error("action '{name}' has unknown kind '{kind}'")]
    UnknownActionKind { name: String, kind: String },

    #[error("unknown trigger kind '{0}'")]
    UnknownTriggerKind(String),

    #[error("'{action}' is missing required setting '{field}'")]
    MissingSetting { action: String, field: &'static str },

    #[error("'{action}' has invalid settings: {source}")]
    InvalidSettings {
        action: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid flow:\n{0}")]
    Validation(String),
}

impl FlowError {
    pub(crate) fn missing_setting(action: &str, field: &'static str) -> Self {
        Self::MissingSetting {
            action: action.to_string(),
            field,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_kind_names_the_kind() {
        let err = FlowError::UnknownActionKind {
            name: "step_1".to_string(),
            kind: "BRANCH".to_string(),
        };
        let message = err.to_string();
        assert!(message.contains("BRANCH"));
        assert!(message.contains("step_1"));
    }

    #[test]
    fn test_missing_setting_message() {
        let err = FlowError::missing_setting("step_2", "artifact");
        assert_eq!(err.to_string(), "'step_2' is missing required setting 'artifact'");
    }
}
