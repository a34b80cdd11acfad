use tally_core::metrics_api::{ratio, values_match, GroundTruthSet, Metric, Predictions};

/// Correct fields over fields present on both sides, for invoices present on both sides.
pub struct AccuracyMetric;

impl Metric for AccuracyMetric {
    fn name(&self) -> &str {
        "accuracy"
    }

    fn compute(&self, predictions: &Predictions, ground_truth: &GroundTruthSet) -> f64 {
        let mut correct = 0;
        let mut total = 0;
        for (id, predicted) in predictions {
            let Some(expected) = ground_truth.get(id) else {
                continue;
            };
            for (field, value) in predicted {
                if let Some(want) = expected.get(field) {
                    total += 1;
                    if values_match(field, value, want) {
                        correct += 1;
                    }
                }
            }
        }
        ratio(correct, total)
    }
}
