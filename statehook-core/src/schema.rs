//! Serialized workflow schemas.
//!
//! A schema is the data-only form of a definition. Guards and effects appear
//! as declarative configs that the factory compiles:
//!
//! ```json
//! {
//!   "id": "review",
//!   "name": "Review flow",
//!   "initialState": "START",
//!   "states": [
//!     {"name": "START", "onExit": [{"type": "log", "mode": "sync", "params": {"message": "bye"}}]},
//!     {"name": "END"}
//!   ],
//!   "transitions": [
//!     {"from": "START", "to": "END", "event": "NEXT",
//!      "conditions": [{"field": "data", "operator": "eq", "value": "valid"}]}
//!   ]
//! }
//! ```

use crate::action::ActionMode;
use crate::error::CoreError;
use crate::guard::Operator;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Reference to a registered action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionConfig {
    #[serde(rename = "type")]
    pub action_type: String,

    #[serde(default)]
    pub mode: ActionMode,

    /// Handler-specific parameters.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub params: Value,
}

/// Declarative guard: `field operator value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionConfig {
    /// Dotted path into the context.
    pub field: String,

    pub operator: Operator,

    #[serde(default)]
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedState {
    pub name: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub on_enter: Vec<ActionConfig>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub on_exit: Vec<ActionConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedTransition {
    pub from: String,
    pub to: String,
    pub event: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<ConditionConfig>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<ActionConfig>,
}

/// Persisted workflow definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSchema {
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub name: String,

    pub initial_state: String,

    #[serde(default)]
    pub states: Vec<SerializedState>,

    #[serde(default)]
    pub transitions: Vec<SerializedTransition>,
}

impl WorkflowSchema {
    /// Parses and validates a schema from JSON text.
    pub fn from_json_str(s: &str) -> Result<Self, CoreError> {
        let schema: Self = serde_json::from_str(s)?;
        schema.validate()?;
        Ok(schema)
    }

    /// Parses and validates a schema from YAML text.
    pub fn from_yaml_str(s: &str) -> Result<Self, CoreError> {
        let schema: Self = serde_yaml::from_str(s)?;
        schema.validate()?;
        Ok(schema)
    }

    /// Loads a schema file. `.yaml`/`.yml` files are parsed as YAML,
    /// everything else as JSON.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| CoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml_str(&content),
            _ => Self::from_json_str(&content),
        }
    }

    /// Checks the structural requirements the compiler relies on.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.initial_state.is_empty() {
            return Err(CoreError::InvalidSchema {
                reason: "initialState must not be empty".to_string(),
            });
        }

        if let Some(pos) = self.states.iter().position(|s| s.name.is_empty()) {
            return Err(CoreError::InvalidSchema {
                reason: format!("state #{} has an empty name", pos),
            });
        }

        for (i, t) in self.transitions.iter().enumerate() {
            if t.from.is_empty() || t.to.is_empty() || t.event.is_empty() {
                return Err(CoreError::InvalidSchema {
                    reason: format!("transition #{} needs from, to and event", i),
                });
            }
        }

        Ok(())
    }

    /// Hash of the schema content, used to detect updates.
    pub fn checksum(&self) -> String {
        // Serializing plain structs and JSON values cannot fail.
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        hex::encode(hasher.finalize())
    }
}
