//! Prompt generation: templates, strategies per category, and
//! model-specific formatting of the final text.

pub mod factory;
pub mod formatters;
pub mod generator;
pub mod strategies;
pub mod template;

pub use factory::PromptFactory;
pub use formatters::{FormatterRegistry, PromptFormatter};
pub use generator::BasicPromptGenerator;
pub use strategies::PromptStrategy;

use std::collections::BTreeMap;

/// Values substituted into prompt templates.
pub type PromptData = BTreeMap<String, String>;

pub const VALID_CATEGORIES: &[&str] = &[
    "basic",
    "detailed",
    "positioned",
    "few_shot",
    "step_by_step",
    "template",
];

pub const VALID_FIELD_TYPES: &[&str] = &["work_order", "cost"];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PromptError {
    #[error("Missing required data field: {0}")]
    MissingData(String),
    #[error("Invalid template: {0}")]
    Template(String),
    #[error("Invalid category: {0}. Must be one of {cats}", cats = VALID_CATEGORIES.join(", "))]
    InvalidCategory(String),
    #[error("Invalid field type: {0}. Must be one of {types}", types = VALID_FIELD_TYPES.join(", "))]
    InvalidFieldType(String),
    #[error("No prompts found for field type: {0}")]
    NoPrompts(String),
    #[error("Prompt not found: {0}")]
    NotFound(String),
    /// The prompt configuration cannot drive the requested strategy.
    #[error("{0}")]
    Config(String),
    #[error("Error in {strategy} prompt generation: {message}")]
    Generation { strategy: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormatError {
    #[error("Formatted prompt is empty")]
    Empty,
    #[error("Prompt exceeds maximum length: {len} > {max}")]
    TooLong { len: usize, max: usize },
    #[error("Missing required section: {0}")]
    MissingSection(String),
    #[error("Missing {0} marker")]
    MissingMarker(String),
    #[error("Unsupported model type: {0}")]
    UnsupportedModel(String),
    #[error("Formatter already registered for: {0}")]
    AlreadyRegistered(String),
    #[error("Failed to format prompt: {0}")]
    Render(String),
}
