use crate::config::ConfigError;
use crate::data::DataError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub code: String,
    pub severity: String,
    pub source: String,
    pub message: String,
    pub context: serde_json::Value,
    pub fix_steps: Vec<String>,
}

impl Diagnostic {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            severity: "error".into(),
            source: "unknown".into(),
            message: message.into(),
            context: serde_json::json!({}),
            fix_steps: vec![],
        }
    }

    pub fn warning(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(code, message).with_severity("warn")
    }

    pub fn with_severity(mut self, severity: impl Into<String>) -> Self {
        self.severity = severity.into();
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = context;
        self
    }

    pub fn with_fix_step(mut self, step: impl Into<String>) -> Self {
        self.fix_steps.push(step.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity != "warn"
    }

    pub fn format_terminal(&self) -> String {
        let icon = if self.severity == "warn" { "⚠️ " } else { "❌" };
        let mut s = format!("{} [{}] {}\n", icon, self.code, self.message);
        s.push_str(&format!("  source: {}\n", self.source));

        if self.context.as_object().is_some_and(|o| !o.is_empty()) {
            if let Ok(json) = serde_json::to_string_pretty(&self.context) {
                for line in json.lines() {
                    s.push_str(&format!("  {}\n", line));
                }
            }
        }

        if !self.fix_steps.is_empty() {
            s.push_str("\nFix:\n");
            for (i, step) in self.fix_steps.iter().enumerate() {
                s.push_str(&format!("  {}. {}\n", i + 1, step));
            }
        }
        s
    }

    /// Map a ground-truth or data-loading failure onto a coded diagnostic.
    pub fn from_data_error(err: &DataError, source: &str) -> Self {
        let message = err.to_string();
        let (code, fix) = match err {
            DataError::GroundTruth(m) if m.starts_with("Missing required columns") => (
                codes::E_GT_MISSING_COLUMNS,
                "Add the missing columns to the ground truth header row",
            ),
            DataError::GroundTruth(m) if m.starts_with("Missing values") => (
                codes::E_GT_MISSING_VALUES,
                "Fill in every required cell; blank cells count as missing",
            ),
            DataError::GroundTruth(m) if m.starts_with("Duplicate invoice IDs") => (
                codes::E_GT_DUPLICATE_IDS,
                "Keep one row per invoice id",
            ),
            DataError::GroundTruth(_) | DataError::Validation(_) => (
                codes::E_GT_FIELD_INVALID,
                "Totals must look like 1234.50 and work orders must be 5 alphanumeric characters",
            ),
            DataError::GroundTruthMissing(_) | DataError::GroundTruthNotFound(_) => (
                codes::E_GT_NOT_FOUND,
                "Place ground_truth.csv in the data directory or pass its path explicitly",
            ),
            DataError::ImageDirNotFound(_) => (
                codes::E_IMG_DIR_MISSING,
                "Create <data-dir>/images and add one image per invoice",
            ),
            DataError::ImageNotFound(_) | DataError::ImageLoad { .. } => (
                codes::E_IMG_INVALID,
                "Check that the image exists and is a readable jpg or png",
            ),
            _ => (codes::E_PATH_NOT_FOUND, "Check the path and permissions"),
        };
        Diagnostic::new(code, message)
            .with_source(source)
            .with_fix_step(fix)
    }

    pub fn from_config_error(err: &ConfigError, source: &str) -> Self {
        let code = if err.0.contains("failed to parse YAML") {
            codes::E_CFG_PARSE
        } else if err.0.contains("config not found") || err.0.contains("failed to read config") {
            codes::E_PATH_NOT_FOUND
        } else {
            codes::E_CFG_SCHEMA
        };
        Diagnostic::new(code, err.0.clone())
            .with_source(source)
            .with_fix_step("Run `tally init` to see a working config tree")
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.format_terminal())
    }
}

impl std::error::Error for Diagnostic {}

pub mod codes {
    // Errors
    pub const E_CFG_PARSE: &str = "E_CFG_PARSE";
    pub const E_CFG_SCHEMA: &str = "E_CFG_SCHEMA";
    pub const E_PATH_NOT_FOUND: &str = "E_PATH_NOT_FOUND";
    pub const E_GT_NOT_FOUND: &str = "E_GT_NOT_FOUND";
    pub const E_GT_MISSING_COLUMNS: &str = "E_GT_MISSING_COLUMNS";
    pub const E_GT_MISSING_VALUES: &str = "E_GT_MISSING_VALUES";
    pub const E_GT_DUPLICATE_IDS: &str = "E_GT_DUPLICATE_IDS";
    pub const E_GT_FIELD_INVALID: &str = "E_GT_FIELD_INVALID";
    pub const E_IMG_DIR_MISSING: &str = "E_IMG_DIR_MISSING";
    pub const E_IMG_INVALID: &str = "E_IMG_INVALID";

    // Warnings
    pub const W_GT_FORMAT: &str = "W_GT_FORMAT";
    pub const W_IMG_INVALID: &str = "W_IMG_INVALID";
    pub const W_NO_MATCHING_IDS: &str = "W_NO_MATCHING_IDS";
}
