//! Stateful validators that accumulate every problem they find instead of
//! stopping at the first one.

pub mod extracted;
pub mod ground_truth;
pub mod image;

pub use self::image::{BatchReport, ImageInfo, ImageValidator};
pub use extracted::{ExtractedDataValidator, FieldValidation};
pub use ground_truth::{GroundTruthValidator, ValidationStatistics};

use serde::Serialize;

pub trait Validator<T: ?Sized> {
    /// Run all checks. Errors from a previous call are discarded first.
    fn validate(&mut self, data: &T) -> bool;
    fn report(&self) -> &ValidationReport;
    fn clear_errors(&mut self);

    fn errors(&self) -> &[String] {
        &self.report().errors
    }

    fn has_errors(&self) -> bool {
        !self.report().errors.is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    pub strict_mode: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn new(strict_mode: bool) -> Self {
        Self {
            strict_mode,
            ..Self::default()
        }
    }

    pub fn error(&mut self, msg: impl Into<String>) {
        let msg = msg.into();
        tracing::debug!(%msg, "validation error");
        self.errors.push(msg);
    }

    pub fn warning(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    pub fn clear(&mut self) {
        self.errors.clear();
        self.warnings.clear();
    }

    pub fn valid(&self) -> bool {
        self.errors.is_empty()
    }
}
