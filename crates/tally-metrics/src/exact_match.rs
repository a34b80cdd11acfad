use tally_core::metrics_api::{ratio, values_match, GroundTruthSet, Metric, Predictions};

/// Share of ground-truth invoices whose prediction has exactly the same
/// fields, every one matching.
pub struct ExactMatchMetric;

impl Metric for ExactMatchMetric {
    fn name(&self) -> &str {
        "exact_match"
    }

    fn compute(&self, predictions: &Predictions, ground_truth: &GroundTruthSet) -> f64 {
        let matched = ground_truth
            .iter()
            .filter(|(id, expected)| {
                predictions.get(*id).is_some_and(|predicted| {
                    predicted.len() == expected.len()
                        && expected.iter().all(|(field, want)| {
                            predicted
                                .get(field)
                                .is_some_and(|value| values_match(field, value, want))
                        })
                })
            })
            .count();
        ratio(matched, ground_truth.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{sample, set};

    #[test]
    fn whole_invoice_must_match() {
        let (pred, gt) = sample();
        assert_eq!(ExactMatchMetric.compute(&pred, &gt), 0.5);
    }

    #[test]
    fn extra_predicted_field_breaks_match() {
        let gt = set(&[("1", &[("Total", "1.00")])]);
        let pred = set(&[("1", &[("Total", "1"), ("Vendor", "x")])]);
        assert_eq!(ExactMatchMetric.compute(&pred, &gt), 0.0);
    }
}
