use tally_core::fields::canonical_field_name;
use tally_core::metrics_api::{ratio, values_match, GroundTruthSet, Metric, Predictions};

/// Normalized accuracy of one field, named `field_accuracy:<field>`.
/// Every ground-truth invoice carrying the field counts; a missing
/// prediction is wrong.
pub struct FieldAccuracyMetric {
    field: String,
    name: String,
}

impl FieldAccuracyMetric {
    pub fn new(field: &str) -> Self {
        let field = canonical_field_name(field);
        Self {
            name: format!("field_accuracy:{}", field),
            field,
        }
    }
}

impl Metric for FieldAccuracyMetric {
    fn name(&self) -> &str {
        &self.name
    }

    fn compute(&self, predictions: &Predictions, ground_truth: &GroundTruthSet) -> f64 {
        let mut total = 0;
        let mut correct = 0;
        for (id, expected) in ground_truth {
            let Some(want) = expected.get(&self.field) else {
                continue;
            };
            total += 1;
            let hit = predictions
                .get(id)
                .and_then(|p| p.get(&self.field))
                .is_some_and(|value| values_match(&self.field, value, want));
            if hit {
                correct += 1;
            }
        }
        ratio(correct, total)
    }
}
