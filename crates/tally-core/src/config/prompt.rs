use super::{decode, unwrap_section, ConfigError, ConfigKind, ConfigSection};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigInfo {
    pub name: String,
    pub description: String,
    pub version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormatInstructions {
    #[serde(default)]
    pub output_format: Option<String>,
    #[serde(default)]
    pub required_fields: Vec<String>,
    #[serde(default)]
    pub validation_rules: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptExample {
    #[serde(default)]
    pub input: Option<String>,
    pub output: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptMetadata {
    pub source: String,
    #[serde(default)]
    pub examples: Vec<PromptExample>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Locations for positioned prompts: a plain list or named regions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Locations {
    List(Vec<String>),
    Named(BTreeMap<String, String>),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FewShotExample {
    Pair { input: String, output: String },
    Text(String),
}

/// One prompt entry of a `prompts/<category>.yaml` file. Strategy-specific
/// keys are optional and only read by the strategy that needs them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptTemplate {
    pub name: String,
    pub text: String,
    pub category: String,
    pub field_to_extract: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub format_instructions: Option<FormatInstructions>,
    #[serde(default)]
    pub metadata: Option<PromptMetadata>,

    /// detailed: named sections (context, instructions, examples, requirements, ...)
    #[serde(default)]
    pub sections: BTreeMap<String, String>,
    /// positioned
    #[serde(default)]
    pub locations: Option<Locations>,
    /// few_shot
    #[serde(default)]
    pub examples: Vec<FewShotExample>,
    /// step_by_step
    #[serde(default)]
    pub introduction: Option<String>,
    #[serde(default)]
    pub steps: Vec<String>,
    #[serde(default)]
    pub conclusion: Option<String>,
    /// template
    #[serde(default)]
    pub template: Option<String>,
    /// chain: names of prompts in the same file, rendered in order
    #[serde(default)]
    pub chain: Vec<String>,
}

impl PromptTemplate {
    pub fn basic(name: &str, text: &str, field: &str) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
            category: "basic".into(),
            field_to_extract: field.into(),
            description: None,
            version: None,
            format_instructions: None,
            metadata: None,
            sections: BTreeMap::new(),
            locations: None,
            examples: Vec::new(),
            introduction: None,
            steps: Vec::new(),
            conclusion: None,
            template: None,
            chain: Vec::new(),
        }
    }
}

const REQUIRED_PROMPT_FIELDS: &[&str] = &["name", "text", "category", "field_to_extract"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromptConfig {
    pub config_info: Option<ConfigInfo>,
    pub prompts: Vec<PromptTemplate>,
    #[serde(skip)]
    pub raw: Value,
}

impl PromptConfig {
    pub fn get_prompt(&self, name: &str) -> Option<&PromptTemplate> {
        self.prompts.iter().find(|p| p.name == name)
    }

    pub fn get_prompts_by_field(&self, field: &str) -> Vec<&PromptTemplate> {
        self.prompts
            .iter()
            .filter(|p| p.field_to_extract == field)
            .collect()
    }

    pub fn get_prompts_by_category(&self, category: &str) -> Vec<&PromptTemplate> {
        self.prompts.iter().filter(|p| p.category == category).collect()
    }

    pub fn get_value(&self, path: &str) -> Option<&Value> {
        super::get_value(&self.raw, path)
    }
}

impl ConfigSection for PromptConfig {
    const KIND: ConfigKind = ConfigKind::Prompt;

    fn from_value(doc: Value, source: &str) -> Result<Self, ConfigError> {
        let raw = unwrap_section(doc, ConfigKind::Prompt.section_key());

        let config_info = match raw.get("config_info") {
            Some(info) => {
                for field in ["name", "description", "version"] {
                    if info.get(field).is_none() {
                        return Err(ConfigError(format!(
                            "{}: Missing required field in config_info: {}",
                            source, field
                        )));
                    }
                }
                Some(decode::<ConfigInfo>(info, source)?)
            }
            None => None,
        };

        let items = raw
            .get("prompts")
            .ok_or_else(|| {
                ConfigError(format!(
                    "{}: Configuration must contain a 'prompts' section",
                    source
                ))
            })?
            .as_sequence()
            .ok_or_else(|| ConfigError(format!("{}: Prompts must be a list", source)))?;

        let mut prompts = Vec::with_capacity(items.len());
        for (idx, item) in items.iter().enumerate() {
            for field in REQUIRED_PROMPT_FIELDS {
                if item.get(*field).is_none() {
                    return Err(ConfigError(format!(
                        "{}: prompt #{}: Missing required field in prompt: {}",
                        source,
                        idx + 1,
                        field
                    )));
                }
            }
            if let Some(meta) = item.get("metadata") {
                if !meta.is_mapping() {
                    return Err(ConfigError(format!(
                        "{}: prompt #{}: Prompt metadata must be a dictionary",
                        source,
                        idx + 1
                    )));
                }
                if meta.get("source").is_none() {
                    return Err(ConfigError(format!(
                        "{}: prompt #{}: Prompt metadata must include a source",
                        source,
                        idx + 1
                    )));
                }
            }
            prompts.push(decode::<PromptTemplate>(item, source)?);
        }

        Ok(Self {
            config_info,
            prompts,
            raw,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"
config_info:
  name: basic prompts
  description: simple extraction prompts
  version: "1.0"
prompts:
  - name: basic_work_order
    text: "Extract the work order number from this invoice."
    category: basic
    field_to_extract: work_order
    metadata:
      source: manual
      examples:
        - output: "12345"
  - name: basic_total
    text: "What is the total amount?"
    category: basic
    field_to_extract: cost
  - name: located_total
    text: "Find the total."
    category: positioned
    field_to_extract: cost
    locations:
      bottom_right: usually near the signature line
"#;

    fn parse(yaml: &str) -> Result<PromptConfig, ConfigError> {
        PromptConfig::from_value(serde_yaml::from_str(yaml).unwrap(), "prompts/basic.yaml")
    }

    #[test]
    fn lookups_by_field_category_and_name() {
        let cfg = parse(DOC).unwrap();
        assert_eq!(cfg.prompts.len(), 3);
        assert_eq!(cfg.get_prompts_by_field("cost").len(), 2);
        assert_eq!(cfg.get_prompts_by_category("basic").len(), 2);
        let wo = cfg.get_prompt("basic_work_order").unwrap();
        assert_eq!(wo.metadata.as_ref().unwrap().examples[0].output, "12345");
        assert!(matches!(
            cfg.get_prompt("located_total").unwrap().locations,
            Some(Locations::Named(_))
        ));
        assert_eq!(
            cfg.get_value("config_info.version").and_then(Value::as_str),
            Some("1.0")
        );
    }

    #[test]
    fn prompt_fields_are_required() {
        let err = parse("prompts:\n  - name: a\n    text: b\n    category: basic\n").unwrap_err();
        assert!(err
            .to_string()
            .ends_with("prompt #1: Missing required field in prompt: field_to_extract"));
    }

    #[test]
    fn prompts_must_be_a_list() {
        let err = parse("prompts: {}\n").unwrap_err();
        assert!(err.to_string().ends_with("Prompts must be a list"));
    }

    #[test]
    fn metadata_requires_source() {
        let err = parse(
            "prompts:\n  - name: a\n    text: b\n    category: basic\n    field_to_extract: cost\n    metadata:\n      examples: []\n",
        )
        .unwrap_err();
        assert!(err.to_string().ends_with("Prompt metadata must include a source"));
    }

    #[test]
    fn config_info_requires_all_fields() {
        let err = parse("config_info:\n  name: x\nprompts: []\n").unwrap_err();
        assert!(err
            .to_string()
            .ends_with("Missing required field in config_info: description"));
    }
}
