use super::{decode, require_keys, unwrap_section, ConfigError, ConfigKind, ConfigSection};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub images: Option<PathBuf>,
    #[serde(default)]
    pub ground_truth: Option<PathBuf>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Json,
    Yaml,
    Csv,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 3] = [OutputFormat::Json, OutputFormat::Yaml, OutputFormat::Csv];

    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Yaml => "yaml",
            OutputFormat::Csv => "csv",
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "yaml" | "yml" => Ok(OutputFormat::Yaml),
            "csv" => Ok(OutputFormat::Csv),
            other => Err(ConfigError(format!(
                "unsupported output format '{}' (supported: json, yaml, csv)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    pub format: OutputFormat,
    #[serde(default = "default_results_dir")]
    pub results_dir: PathBuf,
}

fn default_results_dir() -> PathBuf {
    PathBuf::from("results")
}

fn default_concurrency() -> usize {
    4
}

/// `evaluation.yaml`: which metrics to compute, where the data lives and
/// how results are written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationConfig {
    pub metrics: Vec<String>,
    pub dataset: DatasetConfig,
    pub output: OutputConfig,
    /// Prompt field types to evaluate (`work_order`, `cost`). Empty means all.
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(skip)]
    pub raw: Value,
}

impl EvaluationConfig {
    pub fn get_value(&self, path: &str) -> Option<&Value> {
        super::get_value(&self.raw, path)
    }
}

impl ConfigSection for EvaluationConfig {
    const KIND: ConfigKind = ConfigKind::Evaluation;

    fn from_value(doc: Value, source: &str) -> Result<Self, ConfigError> {
        let raw = unwrap_section(doc, ConfigKind::Evaluation.section_key());
        require_keys(&raw, &["metrics", "dataset", "output"], source)?;
        if !raw.get("metrics").is_some_and(Value::is_sequence) {
            return Err(ConfigError(format!("{}: Metrics must be a list", source)));
        }
        match raw.get("dataset") {
            Some(d) if d.is_mapping() => {
                if d.get("path").is_none() {
                    return Err(ConfigError(format!("{}: Dataset must specify a path", source)));
                }
            }
            _ => return Err(ConfigError(format!("{}: Dataset must be a dictionary", source))),
        }
        match raw.get("output") {
            Some(o) if o.is_mapping() => {
                if o.get("format").is_none() {
                    return Err(ConfigError(format!("{}: Output must specify a format", source)));
                }
            }
            _ => return Err(ConfigError(format!("{}: Output must be a dictionary", source))),
        }
        let mut cfg: EvaluationConfig = decode(&raw, source)?;
        if cfg.concurrency == 0 {
            return Err(ConfigError(format!("{}: concurrency must be at least 1", source)));
        }
        cfg.raw = raw;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> Result<EvaluationConfig, ConfigError> {
        EvaluationConfig::from_value(serde_yaml::from_str(yaml).unwrap(), "evaluation.yaml")
    }

    #[test]
    fn parses_full_document() {
        let cfg = parse(
            "evaluation:\n  metrics: [accuracy, f1]\n  dataset:\n    path: data\n  output:\n    format: csv\n",
        )
        .unwrap();
        assert_eq!(cfg.metrics, vec!["accuracy", "f1"]);
        assert_eq!(cfg.output.format, OutputFormat::Csv);
        assert_eq!(cfg.output.results_dir, PathBuf::from("results"));
        assert_eq!(cfg.concurrency, 4);
        assert_eq!(cfg.get_value("dataset.path").and_then(Value::as_str), Some("data"));
    }

    #[test]
    fn structural_errors() {
        let base = "dataset:\n  path: d\noutput:\n  format: json\n";
        let err = parse(&format!("metrics: accuracy\n{}", base)).unwrap_err();
        assert!(err.to_string().ends_with("Metrics must be a list"));

        let err = parse("metrics: []\ndataset: {}\noutput:\n  format: json\n").unwrap_err();
        assert!(err.to_string().ends_with("Dataset must specify a path"));

        let err = parse("metrics: []\ndataset:\n  path: d\noutput: {}\n").unwrap_err();
        assert!(err.to_string().ends_with("Output must specify a format"));
    }

    #[test]
    fn output_format_from_str() {
        assert_eq!("YML".parse::<OutputFormat>().unwrap(), OutputFormat::Yaml);
        assert!("pickle".parse::<OutputFormat>().is_err());
    }
}
