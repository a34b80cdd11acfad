use tally_core::metrics_api::{ratio, values_match, GroundTruthSet, Metric, Predictions};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Counts {
    true_positives: usize,
    false_positives: usize,
    false_negatives: usize,
}

impl Counts {
    fn precision(self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_positives)
    }

    fn recall(self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_negatives)
    }
}

/// A predicted field is a true positive when it matches the ground truth and
/// a false positive otherwise. A ground-truth field that was not matched,
/// including every field of an invoice with no prediction, is a false negative.
fn count(predictions: &Predictions, ground_truth: &GroundTruthSet) -> Counts {
    let mut c = Counts::default();
    for (id, predicted) in predictions {
        let expected = ground_truth.get(id);
        for (field, value) in predicted {
            match expected.and_then(|e| e.get(field)) {
                Some(want) if values_match(field, value, want) => c.true_positives += 1,
                _ => c.false_positives += 1,
            }
        }
    }
    for (id, expected) in ground_truth {
        let predicted = predictions.get(id);
        for (field, want) in expected {
            let hit = predicted
                .and_then(|p| p.get(field))
                .is_some_and(|value| values_match(field, value, want));
            if !hit {
                c.false_negatives += 1;
            }
        }
    }
    c
}

pub struct PrecisionMetric;

impl Metric for PrecisionMetric {
    fn name(&self) -> &str {
        "precision"
    }

    fn compute(&self, predictions: &Predictions, ground_truth: &GroundTruthSet) -> f64 {
        count(predictions, ground_truth).precision()
    }
}

pub struct RecallMetric;

impl Metric for RecallMetric {
    fn name(&self) -> &str {
        "recall"
    }

    fn compute(&self, predictions: &Predictions, ground_truth: &GroundTruthSet) -> f64 {
        count(predictions, ground_truth).recall()
    }
}

pub struct F1Metric;

impl Metric for F1Metric {
    fn name(&self) -> &str {
        "f1"
    }

    fn compute(&self, predictions: &Predictions, ground_truth: &GroundTruthSet) -> f64 {
        let c = count(predictions, ground_truth);
        let (p, r) = (c.precision(), c.recall());
        if p + r == 0.0 {
            0.0
        } else {
            2.0 * p * r / (p + r)
        }
    }
}
