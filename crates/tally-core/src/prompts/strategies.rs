//! One strategy per prompt category. Each turns a [`PromptTemplate`]
//! plus per-invoice [`PromptData`] into the prompt text.

use super::template::{render, render_blocks};
use super::{PromptData, PromptError};
use crate::config::prompt::{FewShotExample, Locations, PromptConfig, PromptTemplate};
use std::collections::BTreeMap;

pub trait PromptStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn generate(&self, data: &PromptData) -> Result<String, PromptError>;
}

/// `text` rendered with the data.
pub struct BasicStrategy {
    text: String,
}

impl BasicStrategy {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl PromptStrategy for BasicStrategy {
    fn name(&self) -> &'static str {
        "basic"
    }

    fn generate(&self, data: &PromptData) -> Result<String, PromptError> {
        render(&self.text, data)
    }
}

const DETAILED_ORDER: [&str; 4] = ["context", "instructions", "examples", "requirements"];

pub struct DetailedStrategy {
    sections: BTreeMap<String, String>,
}

impl DetailedStrategy {
    pub fn new(sections: BTreeMap<String, String>) -> Result<Self, PromptError> {
        let missing: Vec<&str> = ["instructions", "context"]
            .into_iter()
            .filter(|s| !sections.contains_key(*s))
            .collect();
        if !missing.is_empty() {
            return Err(PromptError::Config(format!(
                "Missing required sections for detailed prompt: {}",
                missing.join(", ")
            )));
        }
        Ok(Self { sections })
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

impl PromptStrategy for DetailedStrategy {
    fn name(&self) -> &'static str {
        "detailed"
    }

    fn generate(&self, data: &PromptData) -> Result<String, PromptError> {
        let known = DETAILED_ORDER
            .iter()
            .filter_map(|k| self.sections.get_key_value(*k));
        let custom = self
            .sections
            .iter()
            .filter(|(k, _)| !DETAILED_ORDER.contains(&k.as_str()));
        let mut parts = Vec::with_capacity(self.sections.len());
        for (name, body) in known.chain(custom) {
            parts.push(format!("{}:\n{}\n", capitalize(name), render(body, data)?));
        }
        Ok(parts.join("\n"))
    }
}

/// Instruction followed by hints about where on the page to look.
pub struct PositionedStrategy {
    text: String,
    locations: Option<Locations>,
}

impl PositionedStrategy {
    pub fn new(text: impl Into<String>, locations: Option<Locations>) -> Self {
        Self {
            text: text.into(),
            locations,
        }
    }

    fn location_info(&self, data: &PromptData) -> Result<String, PromptError> {
        Ok(match &self.locations {
            None => String::new(),
            Some(Locations::Text(t)) => render(t, data)?,
            Some(Locations::List(items)) => items
                .iter()
                .enumerate()
                .map(|(i, l)| Ok(format!("Location {}: {}", i + 1, render(l, data)?)))
                .collect::<Result<Vec<_>, PromptError>>()?
                .join("\n"),
            Some(Locations::Named(named)) => named
                .iter()
                .map(|(name, d)| Ok(format!("{}: {}", name, render(d, data)?)))
                .collect::<Result<Vec<_>, PromptError>>()?
                .join("\n"),
        })
    }
}

impl PromptStrategy for PositionedStrategy {
    fn name(&self) -> &'static str {
        "positioned"
    }

    fn generate(&self, data: &PromptData) -> Result<String, PromptError> {
        let instruction = render(&self.text, data)?;
        // Location hints referencing absent data are dropped, not fatal.
        let info = match self.location_info(data) {
            Ok(info) => info,
            Err(PromptError::MissingData(key)) => {
                tracing::debug!(%key, "location hints skipped");
                String::new()
            }
            Err(e) => return Err(e),
        };
        if info.is_empty() {
            Ok(instruction)
        } else {
            Ok(format!("{}\n\nLocation Information:\n{}", instruction, info))
        }
    }
}

pub struct FewShotStrategy {
    text: String,
    examples: Vec<FewShotExample>,
}

impl FewShotStrategy {
    pub fn new(
        name: &str,
        text: impl Into<String>,
        examples: Vec<FewShotExample>,
    ) -> Result<Self, PromptError> {
        if examples.is_empty() {
            return Err(PromptError::Config(format!(
                "Examples for prompt '{}' not found or invalid format",
                name
            )));
        }
        Ok(Self {
            text: text.into(),
            examples,
        })
    }
}

impl PromptStrategy for FewShotStrategy {
    fn name(&self) -> &'static str {
        "few_shot"
    }

    fn generate(&self, data: &PromptData) -> Result<String, PromptError> {
        let instruction = render(&self.text, data)?;
        let examples: Vec<String> = self
            .examples
            .iter()
            .enumerate()
            .filter_map(|(i, ex)| {
                let formatted = match ex {
                    FewShotExample::Text(t) => render(t, data),
                    FewShotExample::Pair { input, output } => render(input, data)
                        .map(|input| {
                            format!("Example {}:\nInput: {}\nOutput: {}", i + 1, input, output)
                        }),
                };
                formatted.ok()
            })
            .collect();
        if examples.is_empty() {
            return Ok(instruction);
        }
        Ok(format!(
            "{}\n\nHere are some examples:\n\n{}\n\nNow complete the task:",
            instruction,
            examples.join("\n\n")
        ))
    }
}

pub struct StepByStepStrategy {
    introduction: Option<String>,
    steps: Vec<String>,
    conclusion: Option<String>,
}

impl StepByStepStrategy {
    pub fn new(
        name: &str,
        introduction: Option<String>,
        steps: Vec<String>,
        conclusion: Option<String>,
    ) -> Result<Self, PromptError> {
        if steps.is_empty() {
            return Err(PromptError::Config(format!(
                "Steps for prompt '{}' not found or invalid format",
                name
            )));
        }
        Ok(Self {
            introduction,
            steps,
            conclusion,
        })
    }
}

impl PromptStrategy for StepByStepStrategy {
    fn name(&self) -> &'static str {
        "step_by_step"
    }

    fn generate(&self, data: &PromptData) -> Result<String, PromptError> {
        let mut parts = Vec::new();
        if let Some(intro) = self.introduction.as_deref().filter(|s| !s.is_empty()) {
            parts.push(render(intro, data)?);
        }
        let steps = self
            .steps
            .iter()
            .enumerate()
            .map(|(i, s)| Ok(format!("Step {}: {}", i + 1, render(s, data)?)))
            .collect::<Result<Vec<_>, PromptError>>()?;
        parts.push(steps.join("\n"));
        if let Some(outro) = self.conclusion.as_deref().filter(|s| !s.is_empty()) {
            parts.push(render(outro, data)?);
        }
        Ok(parts.join("\n\n"))
    }
}

pub struct TemplateStrategy {
    template: String,
}

impl TemplateStrategy {
    pub fn new(template: impl Into<String>) -> Result<Self, PromptError> {
        let template = template.into();
        // Surface syntax errors at construction, not per invoice.
        let probe = render_blocks(&template, &PromptData::new());
        if let Err(PromptError::Template(msg)) = probe {
            return Err(PromptError::Template(msg));
        }
        Ok(Self { template })
    }
}

impl PromptStrategy for TemplateStrategy {
    fn name(&self) -> &'static str {
        "template"
    }

    fn generate(&self, data: &PromptData) -> Result<String, PromptError> {
        render_blocks(&self.template, data)
    }
}

pub struct ChainStrategy {
    parts: Vec<Box<dyn PromptStrategy>>,
}

impl ChainStrategy {
    pub fn new(parts: Vec<Box<dyn PromptStrategy>>) -> Self {
        Self { parts }
    }
}

impl PromptStrategy for ChainStrategy {
    fn name(&self) -> &'static str {
        "chain"
    }

    fn generate(&self, data: &PromptData) -> Result<String, PromptError> {
        let mut out = Vec::with_capacity(self.parts.len());
        for part in &self.parts {
            out.push(part.generate(data).map_err(|e| PromptError::Generation {
                strategy: "chain".into(),
                message: e.to_string(),
            })?);
        }
        Ok(out.join("\n\n"))
    }
}

/// Passes one data key through untouched; empty when the key is absent.
pub struct IdentityStrategy {
    key: String,
}

impl IdentityStrategy {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

impl Default for IdentityStrategy {
    fn default() -> Self {
        Self::new("prompt")
    }
}

impl PromptStrategy for IdentityStrategy {
    fn name(&self) -> &'static str {
        "identity"
    }

    fn generate(&self, data: &PromptData) -> Result<String, PromptError> {
        Ok(data.get(&self.key).cloned().unwrap_or_default())
    }
}

const MAX_CHAIN_DEPTH: usize = 8;

/// Build the strategy a template's category calls for. A template with a
/// non-empty `chain` becomes a [`ChainStrategy`] over the named prompts
/// of the same config.
pub fn build(
    template: &PromptTemplate,
    config: &PromptConfig,
) -> Result<Box<dyn PromptStrategy>, PromptError> {
    build_at_depth(template, config, 0)
}

fn build_at_depth(
    template: &PromptTemplate,
    config: &PromptConfig,
    depth: usize,
) -> Result<Box<dyn PromptStrategy>, PromptError> {
    if depth > MAX_CHAIN_DEPTH {
        return Err(PromptError::Config(format!(
            "prompt chain starting at '{}' is too deep or cyclic",
            template.name
        )));
    }
    if !template.chain.is_empty() {
        let mut parts = Vec::with_capacity(template.chain.len());
        for name in &template.chain {
            let sub = config
                .get_prompt(name)
                .ok_or_else(|| PromptError::NotFound(name.clone()))?;
            parts.push(build_at_depth(sub, config, depth + 1)?);
        }
        return Ok(Box::new(ChainStrategy::new(parts)));
    }
    let strategy: Box<dyn PromptStrategy> = match template.category.as_str() {
        "basic" => Box::new(BasicStrategy::new(template.text.clone())),
        "detailed" => {
            let mut sections = template.sections.clone();
            sections
                .entry("instructions".into())
                .or_insert_with(|| template.text.clone());
            Box::new(DetailedStrategy::new(sections)?)
        }
        "positioned" | "locational" => Box::new(PositionedStrategy::new(
            template.text.clone(),
            template.locations.clone(),
        )),
        "few_shot" => Box::new(FewShotStrategy::new(
            &template.name,
            template.text.clone(),
            template.examples.clone(),
        )?),
        "step_by_step" => Box::new(StepByStepStrategy::new(
            &template.name,
            template.introduction.clone(),
            template.steps.clone(),
            template.conclusion.clone(),
        )?),
        "template" => Box::new(TemplateStrategy::new(
            template.template.clone().unwrap_or_else(|| template.text.clone()),
        )?),
        "identity" => Box::new(IdentityStrategy::default()),
        other => return Err(PromptError::InvalidCategory(other.to_string())),
    };
    Ok(strategy)
}
