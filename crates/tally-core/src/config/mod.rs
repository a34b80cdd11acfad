//! YAML configuration for models, prompts and evaluation runs.
//!
//! Layout under a config root:
//!
//! ```text
//! <root>/models/<name>.yaml
//! <root>/prompts/<category>.yaml
//! <root>/evaluation.yaml
//! ```

pub mod evaluation;
pub mod manager;
pub mod model;
pub mod prompt;

pub use evaluation::EvaluationConfig;
pub use manager::ConfigManager;
pub use model::ModelConfig;
pub use prompt::{PromptConfig, PromptTemplate};

use serde_yaml::Value;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("config error: {0}")]
pub struct ConfigError(pub String);

impl ConfigError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigKind {
    Model,
    Prompt,
    Evaluation,
}

impl ConfigKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ConfigKind::Model => "MODEL",
            ConfigKind::Prompt => "PROMPT",
            ConfigKind::Evaluation => "EVALUATION",
        }
    }

    /// Top-level key a document may wrap its content in.
    pub fn section_key(self) -> &'static str {
        match self {
            ConfigKind::Model => "model",
            ConfigKind::Prompt => "prompt",
            ConfigKind::Evaluation => "evaluation",
        }
    }
}

impl std::fmt::Display for ConfigKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed config section built from a YAML document.
pub trait ConfigSection: Sized + Send + Sync + 'static {
    const KIND: ConfigKind;

    fn from_value(raw: Value, source: &str) -> Result<Self, ConfigError>;
}

pub fn read_yaml(path: &Path) -> Result<Value, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        ConfigError(format!("failed to read config {}: {}", path.display(), e))
    })?;
    serde_yaml::from_str(&text)
        .map_err(|e| ConfigError(format!("failed to parse YAML {}: {}", path.display(), e)))
}

/// Returns the `key:` sub-mapping when the document is wrapped in it.
pub(crate) fn unwrap_section(doc: Value, key: &str) -> Value {
    match doc {
        Value::Mapping(mut m) => match m.remove(key) {
            Some(inner @ Value::Mapping(_)) => inner,
            Some(other) => {
                m.insert(Value::String(key.to_string()), other);
                Value::Mapping(m)
            }
            None => Value::Mapping(m),
        },
        other => other,
    }
}

/// Dot-notation lookup: `get_value(&doc, "inference.temperature")`.
pub fn get_value<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .filter(|p| !p.is_empty())
        .try_fold(doc, |node, key| node.as_mapping()?.get(key))
}

pub(crate) fn require_keys(doc: &Value, keys: &[&str], source: &str) -> Result<(), ConfigError> {
    let map = doc
        .as_mapping()
        .ok_or_else(|| ConfigError(format!("{}: expected a mapping at top level", source)))?;
    let missing: Vec<&str> = keys
        .iter()
        .copied()
        .filter(|k| !map.contains_key(*k))
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ConfigError(format!(
            "{}: missing required fields: {}",
            source,
            missing.join(", ")
        )))
    }
}

pub(crate) fn decode<T: serde::de::DeserializeOwned>(
    raw: &Value,
    source: &str,
) -> Result<T, ConfigError> {
    serde_yaml::from_value(raw.clone()).map_err(|e| ConfigError(format!("{}: {}", source, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dot_lookup_walks_mappings() {
        let doc: Value = serde_yaml::from_str("a:\n  b:\n    c: 3\n  d: [1]\n").unwrap();
        assert_eq!(get_value(&doc, "a.b.c").and_then(Value::as_i64), Some(3));
        assert!(get_value(&doc, "a.d.x").is_none());
        assert!(get_value(&doc, "missing").is_none());
    }

    #[test]
    fn section_wrapper_is_optional() {
        let wrapped: Value = serde_yaml::from_str("model:\n  name: x\n").unwrap();
        let bare: Value = serde_yaml::from_str("name: x\n").unwrap();
        assert_eq!(unwrap_section(wrapped, "model"), unwrap_section(bare, "model"));
    }

    #[test]
    fn required_keys_are_listed() {
        let doc: Value = serde_yaml::from_str("name: x\n").unwrap();
        let err = require_keys(&doc, &["name", "type", "parameters"], "models/x.yaml").unwrap_err();
        assert_eq!(
            err.to_string(),
            "config error: models/x.yaml: missing required fields: type, parameters"
        );
    }
}
