use super::strategies::PromptStrategy;
use super::template::render;
use super::{PromptData, PromptError};
use crate::config::{PromptConfig, PromptTemplate};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const WORK_ORDER_INSTRUCTIONS: &str =
    " The work order number should be exactly 5 alphanumeric characters. Preserve any leading zeros.";
pub const COST_INSTRUCTIONS: &str = " Return the amount as a decimal number with exactly 2 decimal places. Do not include currency symbols or separators.";

/// What to generate a prompt for.
#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    pub field_type: String,
    /// Replaces the built-in format instructions when set.
    pub format_instructions: Option<String>,
    pub examples: Vec<String>,
}

impl GenerationRequest {
    pub fn for_field(field_type: impl Into<String>) -> Self {
        Self {
            field_type: field_type.into(),
            ..Self::default()
        }
    }
}

/// Direct prompts: the first template for a field, the field's format
/// instructions, then any examples.
#[derive(Debug, Clone)]
pub struct BasicPromptGenerator {
    config: Arc<PromptConfig>,
    by_name: BTreeMap<String, usize>,
    by_field: BTreeMap<String, Vec<usize>>,
}

impl BasicPromptGenerator {
    pub fn new(config: Arc<PromptConfig>) -> Result<Self, PromptError> {
        if config.prompts.is_empty() {
            return Err(PromptError::Config(
                "Configuration must include at least one prompt".into(),
            ));
        }
        let mut by_name = BTreeMap::new();
        let mut by_field: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (i, p) in config.prompts.iter().enumerate() {
            if p.name.is_empty() || p.text.is_empty() {
                return Err(PromptError::Config("Prompts must have name and text".into()));
            }
            if p.field_to_extract.is_empty() {
                return Err(PromptError::Config("Prompts must specify field_to_extract".into()));
            }
            by_name.insert(p.name.clone(), i);
            by_field.entry(p.field_to_extract.clone()).or_default().push(i);
        }
        Ok(Self {
            config,
            by_name,
            by_field,
        })
    }

    pub fn get_template(&self, name: &str) -> Option<&PromptTemplate> {
        self.by_name.get(name).map(|&i| &self.config.prompts[i])
    }

    pub fn get_templates_for_field(&self, field_type: &str) -> Vec<&PromptTemplate> {
        self.by_field
            .get(field_type)
            .map(|idx| idx.iter().map(|&i| &self.config.prompts[i]).collect())
            .unwrap_or_default()
    }

    pub fn generate(&self, request: &GenerationRequest) -> Result<String, PromptError> {
        let template = self.select(None, request)?;
        Ok(finish(&template.text, request))
    }

    /// Pipeline form: the named template (or the first for the field) is
    /// rendered with each invoice's data before the instructions are added.
    pub fn strategy(
        &self,
        name: Option<&str>,
        request: GenerationRequest,
    ) -> Result<BasicGeneratorStrategy, PromptError> {
        let text = self.select(name, &request)?.text.clone();
        Ok(BasicGeneratorStrategy { text, request })
    }

    fn select(
        &self,
        name: Option<&str>,
        request: &GenerationRequest,
    ) -> Result<&PromptTemplate, PromptError> {
        if request.field_type.is_empty() {
            return Err(PromptError::Config("Context must include field_type".into()));
        }
        match name {
            Some(n) => self
                .get_template(n)
                .ok_or_else(|| PromptError::NotFound(n.to_string())),
            None => self
                .get_templates_for_field(&request.field_type)
                .into_iter()
                .next()
                .ok_or_else(|| PromptError::NoPrompts(request.field_type.clone())),
        }
    }
}

fn finish(text: &str, request: &GenerationRequest) -> String {
    let instructions = match request.format_instructions.as_deref() {
        Some(custom) if !custom.is_empty() => custom,
        _ => match request.field_type.as_str() {
            "work_order" => WORK_ORDER_INSTRUCTIONS,
            "cost" => COST_INSTRUCTIONS,
            _ => "",
        },
    };
    let mut prompt = format!("{}{}", text, instructions);
    if !request.examples.is_empty() {
        prompt.push_str("\n\nExamples:\n");
        prompt.push_str(&request.examples.join("\n"));
    }
    prompt
}

pub struct BasicGeneratorStrategy {
    text: String,
    request: GenerationRequest,
}

impl PromptStrategy for BasicGeneratorStrategy {
    fn name(&self) -> &'static str {
        "basic"
    }

    fn generate(&self, data: &PromptData) -> Result<String, PromptError> {
        Ok(finish(&render(&self.text, data)?, &self.request))
    }
}
