use crate::fields::{normalize_field, FieldMap};
use std::collections::BTreeMap;

/// Invoice id to the fields a model produced for it.
pub type Predictions = BTreeMap<String, FieldMap>;
/// Invoice id to the expected fields.
pub type GroundTruthSet = BTreeMap<String, FieldMap>;

pub trait Metric: Send + Sync {
    fn name(&self) -> &str;

    /// Score in `0.0..=1.0`; 0.0 when there is nothing to score.
    fn compute(&self, predictions: &Predictions, ground_truth: &GroundTruthSet) -> f64;
}

/// Values match when equal after trimming or after field normalization,
/// so `"$1,234.5"` matches `"1234.50"` under `Total`.
pub fn values_match(field: &str, predicted: &str, expected: &str) -> bool {
    if predicted.trim() == expected.trim() {
        return true;
    }
    match (normalize_field(field, predicted), normalize_field(field, expected)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

pub fn ratio(num: usize, den: usize) -> f64 {
    crate::fields::ratio(num, den)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_aware_matching() {
        assert!(values_match("Total", "$1,234.5", "1234.50"));
        assert!(values_match("Work Order Number", " 01234 ", "01234"));
        assert!(!values_match("Work Order Number", "1234", "01234"));
        assert!(!values_match("Total", "abc", "1.00"));
        assert!(values_match("Vendor", "ACME", "ACME "));
    }
}
