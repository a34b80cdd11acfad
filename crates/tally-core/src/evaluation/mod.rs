pub mod calculator;
pub mod results;
pub mod run;
pub mod runner;
pub mod service;

pub use calculator::MetricsCalculator;
pub use results::ResultsManager;
pub use run::{FieldStats, InvoiceResult, InvoiceStatus, RunReport, RunSummary};
pub use runner::{Runner, RunnerConfig};
pub use service::EvaluationService;

use crate::data::DataError;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum EvaluationError {
    #[error("Unsupported metric: {0}")]
    UnsupportedMetric(String),
    #[error("Metric already registered: {0}")]
    DuplicateMetric(String),
    #[error("No results found for model: {0}")]
    NoResults(String),
    #[error("Invalid model name: {0:?}")]
    InvalidModelName(String),
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(PathBuf),
    #[error("Dataset not found: {0}")]
    DatasetNotFound(PathBuf),
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize results: {0}")]
    Serialize(String),
    #[error("failed to parse {path}: {reason}")]
    Deserialize { path: PathBuf, reason: String },
    #[error(transparent)]
    Data(#[from] DataError),
}

impl EvaluationError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        EvaluationError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn parse(path: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
        EvaluationError::Deserialize {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
