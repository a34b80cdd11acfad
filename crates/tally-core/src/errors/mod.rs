pub mod diagnostic;

pub use diagnostic::Diagnostic;

use crate::config::ConfigError;
use crate::data::DataError;
use crate::evaluation::EvaluationError;
use crate::fields::FieldError;
use crate::image::ImageError;
use crate::models::ModelError;
use crate::parsing::ParseError;
use crate::prompts::{FormatError, PromptError};

/// Any failure surfaced by the library, one variant per layer.
#[derive(Debug, thiserror::Error)]
pub enum TallyError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Data(#[from] DataError),
    #[error(transparent)]
    Field(#[from] FieldError),
    #[error(transparent)]
    Image(#[from] ImageError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Prompt(#[from] PromptError),
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
}

impl TallyError {
    /// True for configuration problems a user fixes by editing YAML.
    pub fn is_config(&self) -> bool {
        matches!(self, TallyError::Config(_) | TallyError::Prompt(_))
    }
}

pub type Result<T, E = TallyError> = std::result::Result<T, E>;
