use std::sync::Arc;

use tally_core::fields::{TOTAL_FIELD, WORK_ORDER_FIELD};
use tally_core::metrics_api::Metric;

mod accuracy;
mod exact_match;
mod field_accuracy;
mod precision_recall;

pub use field_accuracy::FieldAccuracyMetric;

pub fn default_metrics() -> Vec<Arc<dyn Metric>> {
    vec![
        Arc::new(accuracy::AccuracyMetric),
        Arc::new(precision_recall::PrecisionMetric),
        Arc::new(precision_recall::RecallMetric),
        Arc::new(precision_recall::F1Metric),
        Arc::new(exact_match::ExactMatchMetric),
        Arc::new(FieldAccuracyMetric::new(WORK_ORDER_FIELD)),
        Arc::new(FieldAccuracyMetric::new(TOTAL_FIELD)),
    ]
}

#[cfg(test)]
pub(crate) mod fixtures {
    use tally_core::fields::FieldMap;
    use tally_core::metrics_api::{GroundTruthSet, Predictions};

    pub fn fields(pairs: &[(&str, &str)]) -> FieldMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    pub fn set(rows: &[(&str, &[(&str, &str)])]) -> Predictions {
        rows.iter()
            .map(|(id, pairs)| (id.to_string(), fields(pairs)))
            .collect()
    }

    /// Two invoices; invoice 2 has a wrong total and no work order.
    pub fn sample() -> (Predictions, GroundTruthSet) {
        let gt = set(&[
            ("1", &[("Total", "10.00"), ("Work Order Number", "AB123")]),
            ("2", &[("Total", "20.00"), ("Work Order Number", "CD456")]),
        ]);
        let pred = set(&[
            ("1", &[("Total", "$10"), ("Work Order Number", "AB123")]),
            ("2", &[("Total", "21.00")]),
        ]);
        (pred, gt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tally_core::metrics_api::{GroundTruthSet, Predictions};

    #[test]
    fn default_set_has_unique_names() {
        let metrics = default_metrics();
        let mut names: Vec<&str> = metrics.iter().map(|m| m.name()).collect();
        let before = names.len();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), before);
        assert!(names.contains(&"field_accuracy:Total"));
    }

    #[test]
    fn empty_inputs_score_zero() {
        for m in default_metrics() {
            assert_eq!(m.compute(&Predictions::new(), &GroundTruthSet::new()), 0.0, "{}", m.name());
        }
    }

    fn arb_set() -> impl Strategy<Value = Predictions> {
        prop::collection::btree_map(
            "[1-4]",
            prop::collection::btree_map(
                prop::sample::select(vec![
                    "Total".to_string(),
                    "Work Order Number".to_string(),
                    "Vendor".to_string(),
                ]),
                prop::sample::select(vec![
                    "10.00".to_string(),
                    "AB123".to_string(),
                    "x".to_string(),
                ]),
                0..3,
            ),
            0..4,
        )
    }

    proptest! {
        #[test]
        fn scores_stay_in_unit_interval(pred in arb_set(), gt in arb_set()) {
            for m in default_metrics() {
                let v = m.compute(&pred, &gt);
                prop_assert!((0.0..=1.0).contains(&v), "{} = {}", m.name(), v);
            }
        }

        #[test]
        fn perfect_predictions_score_one(gt in arb_set()) {
            let has_fields = gt.values().any(|f| !f.is_empty());
            prop_assume!(has_fields);
            for name in ["accuracy", "precision", "recall", "f1"] {
                let m = default_metrics().into_iter().find(|m| m.name() == name).unwrap();
                prop_assert_eq!(m.compute(&gt, &gt), 1.0);
            }
        }
    }
}
