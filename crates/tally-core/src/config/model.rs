use super::{decode, require_keys, unwrap_section, ConfigError, ConfigKind, ConfigSection};
use crate::image::ImageProcessorConfig;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::BTreeMap;

pub const DEFAULT_PROCESSING_TIMEOUT_SECS: f64 = 60.0;
pub const DEFAULT_LOADING_TIMEOUT_SECS: f64 = 300.0;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HardwareConfig {
    #[serde(default)]
    pub gpu_required: bool,
    #[serde(default)]
    pub gpu_memory_min: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InferenceConfig {
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub system_prompt: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_delay")]
    pub delay_seconds: f64,
    #[serde(default = "default_backoff")]
    pub backoff_factor: f64,
    #[serde(default = "default_max_delay")]
    pub max_delay_seconds: f64,
}

fn default_attempts() -> u32 {
    3
}
fn default_delay() -> f64 {
    1.0
}
fn default_backoff() -> f64 {
    2.0
}
fn default_max_delay() -> f64 {
    30.0
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_attempts(),
            delay_seconds: default_delay(),
            backoff_factor: default_backoff(),
            max_delay_seconds: default_max_delay(),
        }
    }
}

/// One model definition, `models/<name>.yaml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub model_type: String,
    /// Provider-specific settings (endpoint, model tag, canned responses).
    pub parameters: BTreeMap<String, Value>,
    /// Prompt formatter to apply; defaults to `basic`.
    #[serde(default)]
    pub prompt_format: Option<String>,
    #[serde(default)]
    pub hardware: Option<HardwareConfig>,
    #[serde(default)]
    pub inference: InferenceConfig,
    #[serde(default)]
    pub timeout_seconds: Option<f64>,
    #[serde(default)]
    pub loading_timeout_seconds: Option<f64>,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub preprocessing: Option<ImageProcessorConfig>,
    #[serde(skip)]
    pub raw: Value,
}

impl ModelConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::new("model name must not be empty"));
        }
        if self.model_type.trim().is_empty() {
            return Err(ConfigError::new(format!("model '{}': type must not be empty", self.name)));
        }
        if let Some(hw) = &self.hardware {
            if hw.gpu_required && hw.gpu_memory_min.is_none() {
                return Err(ConfigError::new(format!(
                    "model '{}': hardware.gpu_memory_min is required when gpu_required is true",
                    self.name
                )));
            }
        }
        if let Some(t) = self.inference.temperature {
            if t < 0.0 {
                return Err(ConfigError::new(format!(
                    "model '{}': inference.temperature must be >= 0 (got {})",
                    self.name, t
                )));
            }
        }
        for (key, v) in [
            ("timeout_seconds", self.timeout_seconds),
            ("loading_timeout_seconds", self.loading_timeout_seconds),
        ] {
            if matches!(v, Some(s) if s.is_nan() || s <= 0.0) {
                return Err(ConfigError::new(format!(
                    "model '{}': {} must be positive",
                    self.name, key
                )));
            }
        }
        Ok(())
    }

    pub fn processing_timeout(&self) -> f64 {
        self.timeout_seconds.unwrap_or(DEFAULT_PROCESSING_TIMEOUT_SECS)
    }

    pub fn loading_timeout(&self) -> f64 {
        self.loading_timeout_seconds
            .unwrap_or(DEFAULT_LOADING_TIMEOUT_SECS)
    }

    pub fn prompt_format(&self) -> &str {
        self.prompt_format.as_deref().unwrap_or("basic")
    }

    pub fn parameter_str(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).and_then(Value::as_str)
    }

    pub fn get_value(&self, path: &str) -> Option<&Value> {
        super::get_value(&self.raw, path)
    }
}

impl ConfigSection for ModelConfig {
    const KIND: ConfigKind = ConfigKind::Model;

    fn from_value(doc: Value, source: &str) -> Result<Self, ConfigError> {
        let raw = unwrap_section(doc, ConfigKind::Model.section_key());
        require_keys(&raw, &["name", "type", "parameters"], source)?;
        let mut cfg: ModelConfig = decode(&raw, source)?;
        cfg.raw = raw;
        cfg.validate()?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> Result<ModelConfig, ConfigError> {
        ModelConfig::from_value(serde_yaml::from_str(yaml).unwrap(), "test")
    }

    #[test]
    fn parses_wrapped_document_with_defaults() {
        let cfg = parse(
            "model:\n  name: llava\n  type: ollama\n  parameters:\n    model: llava:13b\n  inference:\n    temperature: 0.1\n",
        )
        .unwrap();
        assert_eq!(cfg.model_type, "ollama");
        assert_eq!(cfg.parameter_str("model"), Some("llava:13b"));
        assert_eq!(cfg.processing_timeout(), 60.0);
        assert_eq!(cfg.loading_timeout(), 300.0);
        assert_eq!(cfg.retry, RetrySettings::default());
        assert_eq!(cfg.prompt_format(), "basic");
        assert_eq!(
            cfg.get_value("inference.temperature").and_then(Value::as_f64),
            Some(0.1)
        );
    }

    #[test]
    fn requires_name_type_parameters() {
        let err = parse("name: x\ntype: fake\n").unwrap_err();
        assert!(err.to_string().contains("missing required fields: parameters"));
    }

    #[test]
    fn gpu_requirement_needs_memory() {
        let err = parse("name: x\ntype: fake\nparameters: {}\nhardware:\n  gpu_required: true\n")
            .unwrap_err();
        assert!(err.to_string().contains("gpu_memory_min"));
    }

    #[test]
    fn negative_temperature_rejected() {
        let err = parse("name: x\ntype: fake\nparameters: {}\ninference:\n  temperature: -0.5\n")
            .unwrap_err();
        assert!(err.to_string().contains("temperature must be >= 0"));
    }
}
