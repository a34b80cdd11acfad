use super::EvaluationError;
use crate::metrics_api::{GroundTruthSet, Metric, Predictions};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Named metric registry. Registration order is kept so output columns are stable.
#[derive(Default)]
pub struct MetricsCalculator {
    metrics: Vec<Arc<dyn Metric>>,
}

impl MetricsCalculator {
    pub fn new(metrics: Vec<Arc<dyn Metric>>) -> Result<Self, EvaluationError> {
        let mut calc = Self::default();
        for m in metrics {
            calc.register_metric(m)?;
        }
        Ok(calc)
    }

    pub fn register_metric(&mut self, metric: Arc<dyn Metric>) -> Result<(), EvaluationError> {
        if self.metrics.iter().any(|m| m.name() == metric.name()) {
            return Err(EvaluationError::DuplicateMetric(metric.name().to_string()));
        }
        self.metrics.push(metric);
        Ok(())
    }

    pub fn names(&self) -> Vec<&str> {
        self.metrics.iter().map(|m| m.name()).collect()
    }

    fn find(&self, name: &str) -> Result<&Arc<dyn Metric>, EvaluationError> {
        self.metrics
            .iter()
            .find(|m| m.name() == name)
            .ok_or_else(|| EvaluationError::UnsupportedMetric(name.to_string()))
    }

    pub fn calculate_metric(
        &self,
        name: &str,
        predictions: &Predictions,
        ground_truth: &GroundTruthSet,
    ) -> Result<f64, EvaluationError> {
        Ok(self.find(name)?.compute(predictions, ground_truth))
    }

    /// Compute `names` (all registered metrics when `None`). Unknown names
    /// fail before anything is computed.
    pub fn calculate(
        &self,
        names: Option<&[String]>,
        predictions: &Predictions,
        ground_truth: &GroundTruthSet,
    ) -> Result<BTreeMap<String, f64>, EvaluationError> {
        let selected: Vec<&Arc<dyn Metric>> = match names {
            Some(names) => names
                .iter()
                .map(|n| self.find(n))
                .collect::<Result<_, _>>()?,
            None => self.metrics.iter().collect(),
        };
        Ok(selected
            .into_iter()
            .map(|m| {
                let value = m.compute(predictions, ground_truth);
                tracing::debug!(metric = m.name(), value, "metric computed");
                (m.name().to_string(), value)
            })
            .collect())
    }
}

impl std::fmt::Debug for MetricsCalculator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsCalculator")
            .field("metrics", &self.names())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) struct Constant(pub &'static str, pub f64);

    impl Metric for Constant {
        fn name(&self) -> &str {
            self.0
        }

        fn compute(&self, _: &Predictions, _: &GroundTruthSet) -> f64 {
            self.1
        }
    }

    #[test]
    fn duplicate_registration_rejected() {
        let err = MetricsCalculator::new(vec![
            Arc::new(Constant("accuracy", 1.0)),
            Arc::new(Constant("accuracy", 0.5)),
        ])
        .unwrap_err();
        assert_eq!(err.to_string(), "Metric already registered: accuracy");
    }

    #[test]
    fn calculates_selected_or_all() {
        let calc = MetricsCalculator::new(vec![
            Arc::new(Constant("accuracy", 1.0)),
            Arc::new(Constant("f1", 0.25)),
        ])
        .unwrap();
        let p = Predictions::new();
        let g = GroundTruthSet::new();

        let all = calc.calculate(None, &p, &g).unwrap();
        assert_eq!(all.len(), 2);

        let only = calc.calculate(Some(&["f1".to_string()]), &p, &g).unwrap();
        assert_eq!(only.get("f1"), Some(&0.25));
        assert!(!only.contains_key("accuracy"));

        let err = calc
            .calculate(Some(&["bleu".to_string()]), &p, &g)
            .unwrap_err();
        assert_eq!(err.to_string(), "Unsupported metric: bleu");
        assert_eq!(calc.calculate_metric("accuracy", &p, &g).unwrap(), 1.0);
    }
}
