use super::calculator::MetricsCalculator;
use super::results::ResultsManager;
use super::run::RunReport;
use super::EvaluationError;
use crate::config::evaluation::OutputFormat;
use crate::config::EvaluationConfig;
use crate::metrics_api::{GroundTruthSet, Metric, Predictions};
use crate::models::recovery::RecoveryManager;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Computes the configured metrics for a model and keeps its result files.
#[derive(Debug)]
pub struct EvaluationService {
    calculator: Arc<MetricsCalculator>,
    results: ResultsManager,
    metric_names: Vec<String>,
    format: OutputFormat,
}

impl EvaluationService {
    pub fn new(
        calculator: Arc<MetricsCalculator>,
        results: ResultsManager,
        metric_names: Vec<String>,
        format: OutputFormat,
    ) -> Result<Self, EvaluationError> {
        let known = calculator.names();
        if let Some(unknown) = metric_names.iter().find(|n| !known.contains(&n.as_str())) {
            return Err(EvaluationError::UnsupportedMetric(unknown.clone()));
        }
        Ok(Self {
            calculator,
            results,
            metric_names,
            format,
        })
    }

    /// Build from `evaluation.yaml`; `results_dir` overrides `output.results_dir`.
    pub fn from_config(
        config: &EvaluationConfig,
        metrics: Vec<Arc<dyn Metric>>,
        results_dir: Option<PathBuf>,
    ) -> Result<Self, EvaluationError> {
        let dir = results_dir.unwrap_or_else(|| config.output.results_dir.clone());
        Self::new(
            Arc::new(MetricsCalculator::new(metrics)?),
            ResultsManager::new(dir),
            config.metrics.clone(),
            config.output.format,
        )
    }

    pub fn calculator(&self) -> &Arc<MetricsCalculator> {
        &self.calculator
    }

    pub fn results(&self) -> &ResultsManager {
        &self.results
    }

    /// Configured metric names; `None` means every registered metric.
    pub fn metric_names(&self) -> Option<&[String]> {
        (!self.metric_names.is_empty()).then_some(self.metric_names.as_slice())
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn evaluate_model(
        &self,
        model: &str,
        predictions: &Predictions,
        ground_truth: &GroundTruthSet,
    ) -> Result<BTreeMap<String, f64>, EvaluationError> {
        let metrics = self
            .calculator
            .calculate(self.metric_names(), predictions, ground_truth)?;
        self.results.save_results(model, &metrics, self.format)?;
        tracing::info!(model, metrics = metrics.len(), "model evaluated");
        Ok(metrics)
    }

    pub fn get_model_performance(
        &self,
        model: &str,
    ) -> Result<BTreeMap<String, f64>, EvaluationError> {
        self.results.load_results(model)
    }

    /// Metrics per model. Models without results are skipped with a warning.
    pub fn compare_models(
        &self,
        models: &[String],
    ) -> Result<BTreeMap<String, BTreeMap<String, f64>>, EvaluationError> {
        let mut out = BTreeMap::new();
        for model in models {
            match self.results.load_results(model) {
                Ok(metrics) => {
                    out.insert(model.clone(), metrics);
                }
                Err(EvaluationError::NoResults(_)) => {
                    tracing::warn!(model = %model, "no results found; skipping");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(out)
    }

    /// Save a run's metrics and its `run.json`. If the report cannot be
    /// written the metrics file is removed again so the pair stays consistent.
    pub fn record_run(&self, report: &RunReport) -> Result<Vec<PathBuf>, EvaluationError> {
        let metrics_path = self
            .results
            .save_results(&report.model, &report.metrics, self.format)?;

        let mut recovery = RecoveryManager::new();
        let cleanup = metrics_path.clone();
        recovery.register(format!("remove {}", cleanup.display()), move || {
            std::fs::remove_file(&cleanup).map_err(|e| {
                crate::models::ModelError::resource(Some("results"), None, e)
            })
        });

        match self.results.save_run(&report.model, report) {
            Ok(run_path) => Ok(vec![metrics_path, run_path]),
            Err(e) => {
                let failed = recovery.recover();
                if !failed.is_empty() {
                    tracing::warn!(actions = ?failed, "cleanup after failed save did not complete");
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::calculator::tests::Constant;
    use tempfile::tempdir;

    fn service(
        dir: &std::path::Path,
        names: &[&str],
    ) -> Result<EvaluationService, EvaluationError> {
        EvaluationService::new(
            Arc::new(
                MetricsCalculator::new(vec![
                    Arc::new(Constant("accuracy", 0.9)),
                    Arc::new(Constant("f1", 0.4)),
                ])
                .unwrap(),
            ),
            ResultsManager::new(dir),
            names.iter().map(|s| s.to_string()).collect(),
            OutputFormat::Json,
        )
    }

    #[test]
    fn unknown_configured_metric_rejected() {
        let tmp = tempdir().unwrap();
        let err = service(tmp.path(), &["bleu"]).unwrap_err();
        assert_eq!(err.to_string(), "Unsupported metric: bleu");
    }

    #[test]
    fn evaluate_then_compare() {
        let tmp = tempdir().unwrap();
        let svc = service(tmp.path(), &["accuracy"]).unwrap();
        let metrics = svc
            .evaluate_model("m1", &Predictions::new(), &GroundTruthSet::new())
            .unwrap();
        assert_eq!(metrics.len(), 1);
        assert_eq!(svc.get_model_performance("m1").unwrap()["accuracy"], 0.9);

        let cmp = svc
            .compare_models(&["m1".to_string(), "missing".to_string()])
            .unwrap();
        assert_eq!(cmp.keys().collect::<Vec<_>>(), vec!["m1"]);
    }

    #[test]
    fn empty_metric_list_means_all() {
        let tmp = tempdir().unwrap();
        let svc = service(tmp.path(), &[]).unwrap();
        let metrics = svc
            .evaluate_model("m", &Predictions::new(), &GroundTruthSet::new())
            .unwrap();
        assert_eq!(metrics.len(), 2);
    }
}
