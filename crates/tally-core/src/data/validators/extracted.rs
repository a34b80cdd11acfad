use super::{ValidationReport, Validator};
use crate::fields::{self, canonical_field_name, FieldMap, TOTAL_FIELD, WORK_ORDER_FIELD};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Checks one field value, returning its normalized form or an error message.
pub type FieldCheck = Arc<dyn Fn(&str) -> Result<String, String> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldValidation {
    pub original: Option<String>,
    pub original_field_name: Option<String>,
    pub valid: bool,
    pub error: String,
    pub normalized: Option<String>,
}

/// Validates field maps produced by a model against the expected fields.
/// Field names are matched through their canonical spelling, so
/// `work_order` and `Work Order` both satisfy `Work Order Number`.
pub struct ExtractedDataValidator {
    expected_fields: Vec<String>,
    checks: BTreeMap<String, FieldCheck>,
    report: ValidationReport,
}

impl std::fmt::Debug for ExtractedDataValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractedDataValidator")
            .field("expected_fields", &self.expected_fields)
            .field("checks", &self.checks.keys().collect::<Vec<_>>())
            .field("report", &self.report)
            .finish()
    }
}

impl Default for ExtractedDataValidator {
    fn default() -> Self {
        Self::new(None, true)
    }
}

impl ExtractedDataValidator {
    pub fn new(expected_fields: Option<Vec<String>>, strict_mode: bool) -> Self {
        let expected_fields = expected_fields
            .unwrap_or_else(|| vec![TOTAL_FIELD.to_string(), WORK_ORDER_FIELD.to_string()]);
        let mut checks: BTreeMap<String, FieldCheck> = BTreeMap::new();
        checks.insert(
            TOTAL_FIELD.to_string(),
            Arc::new(|v| fields::validate_total_amount(v).map_err(|e| e.to_string())),
        );
        checks.insert(
            WORK_ORDER_FIELD.to_string(),
            Arc::new(|v| fields::validate_work_order(v).map_err(|e| e.to_string())),
        );
        Self {
            expected_fields,
            checks,
            report: ValidationReport::new(strict_mode),
        }
    }

    pub fn expected_fields(&self) -> &[String] {
        &self.expected_fields
    }

    pub fn add_field_validator(&mut self, field_name: &str, check: FieldCheck) {
        tracing::debug!(field = field_name, "added field validator");
        self.checks.insert(canonical_field_name(field_name), check);
    }

    /// Per-field outcome, including one entry per missing expected field.
    pub fn field_results(&self, data: &FieldMap) -> BTreeMap<String, FieldValidation> {
        let mut results = BTreeMap::new();
        for (original_name, value) in data {
            let field = canonical_field_name(original_name);
            if results.contains_key(&field) {
                continue;
            }
            let outcome = match self.checks.get(&field) {
                Some(check) => check(value),
                None if value.trim().is_empty() => Err("No value provided".to_string()),
                None => Ok(value.trim().to_string()),
            };
            let (valid, error, normalized) = match outcome {
                Ok(n) => (true, String::new(), Some(n)),
                Err(e) => (false, e, None),
            };
            results.insert(
                field,
                FieldValidation {
                    original: Some(value.clone()),
                    original_field_name: Some(original_name.clone()),
                    valid,
                    error,
                    normalized,
                },
            );
        }
        for field in &self.expected_fields {
            results.entry(field.clone()).or_insert_with(|| FieldValidation {
                original: None,
                original_field_name: None,
                valid: false,
                error: "Field missing in extracted data".to_string(),
                normalized: None,
            });
        }
        results
    }

    /// Canonical field names mapped to normalized values; invalid fields are dropped.
    pub fn get_normalized_data(&self, data: &FieldMap) -> FieldMap {
        self.field_results(data)
            .into_iter()
            .filter_map(|(k, r)| r.normalized.map(|n| (k, n)))
            .collect()
    }
}

impl Validator<FieldMap> for ExtractedDataValidator {
    fn validate(&mut self, data: &FieldMap) -> bool {
        self.report.clear();
        let canonical = fields::canonicalize_fields(data);
        let missing: Vec<&str> = self
            .expected_fields
            .iter()
            .filter(|f| !canonical.contains_key(*f))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            self.report
                .error(format!("Missing expected fields: {}", missing.join(", ")));
        }
        for (field, value) in &canonical {
            if let Some(check) = self.checks.get(field) {
                if let Err(e) = check(value) {
                    self.report.error(format!("Invalid {}: {}", field, e));
                }
            }
        }
        let valid = self.report.valid();
        tracing::debug!(valid, "extracted data validation finished");
        valid
    }

    fn report(&self) -> &ValidationReport {
        &self.report
    }

    fn clear_errors(&mut self) {
        self.report.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> FieldMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn accepts_variant_field_names() {
        let mut v = ExtractedDataValidator::default();
        let data = map(&[("work_order", "AB123"), ("Invoice Total", "$12")]);
        assert!(v.validate(&data));
        let normalized = v.get_normalized_data(&data);
        assert_eq!(normalized["Total"], "12.00");
        assert_eq!(normalized["Work Order Number"], "AB123");
    }

    #[test]
    fn reports_missing_and_invalid_fields() {
        let mut v = ExtractedDataValidator::default();
        let data = map(&[("Total", "twelve")]);
        assert!(!v.validate(&data));
        assert_eq!(v.errors()[0], "Missing expected fields: Work Order Number");
        assert_eq!(v.errors()[1], "Invalid Total: Invalid total amount format: twelve");

        let results = v.field_results(&data);
        assert_eq!(results["Work Order Number"].error, "Field missing in extracted data");
        assert_eq!(results["Total"].original_field_name.as_deref(), Some("Total"));
        assert!(!results["Total"].valid);
    }

    #[test]
    fn custom_validator_applies_to_other_fields() {
        let mut v = ExtractedDataValidator::new(Some(vec!["Vendor".into()]), true);
        v.add_field_validator(
            "Vendor",
            Arc::new(|s| {
                if s.chars().all(char::is_alphabetic) {
                    Ok(s.to_uppercase())
                } else {
                    Err("vendor must be alphabetic".into())
                }
            }),
        );
        assert!(v.validate(&map(&[("Vendor", "acme")])));
        assert_eq!(v.get_normalized_data(&map(&[("Vendor", "acme")]))["Vendor"], "ACME");
        assert!(!v.validate(&map(&[("Vendor", "acme1")])));
    }
}
