use super::{ValidationReport, Validator};
use crate::data::ground_truth::default_required_columns;
use crate::data::table::Table;
use crate::fields::{self, INVOICE_FIELD, TOTAL_FIELD, WORK_ORDER_FIELD};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Validates a ground truth table and keeps every error found.
///
/// Missing columns stop validation early; blank required cells, duplicate
/// ids and malformed totals or work orders are all collected as errors. In
/// strict mode every column outside `required_columns` adds a warning.
#[derive(Debug, Clone)]
pub struct GroundTruthValidator {
    required_columns: Vec<String>,
    report: ValidationReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationStatistics {
    pub total_rows: usize,
    pub columns: Vec<String>,
    pub required_columns_present: bool,
    pub missing_values_by_column: BTreeMap<String, usize>,
    pub total_missing_values: usize,
    pub unique_invoice_count: usize,
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl GroundTruthValidator {
    pub fn new(required_columns: Option<Vec<String>>, strict_mode: bool) -> Self {
        Self {
            required_columns: required_columns.unwrap_or_else(default_required_columns),
            report: ValidationReport::new(strict_mode),
        }
    }

    pub fn validation_statistics(&mut self, table: &Table) -> ValidationStatistics {
        if !self.validate(table) {
            tracing::warn!("generating statistics for invalid ground truth");
        }
        let missing_values_by_column = table.missing_by_column();
        let unique_invoice_count = table
            .column(INVOICE_FIELD)
            .into_iter()
            .flatten()
            .collect::<BTreeSet<_>>()
            .len();
        ValidationStatistics {
            total_rows: table.len(),
            columns: table.headers().to_vec(),
            required_columns_present: self.required_columns.iter().all(|c| table.has_column(c)),
            total_missing_values: missing_values_by_column.values().sum(),
            missing_values_by_column,
            unique_invoice_count,
            valid: self.report.valid(),
            errors: self.report.errors.clone(),
            warnings: self.report.warnings.clone(),
        }
    }
}

impl Validator<Table> for GroundTruthValidator {
    fn validate(&mut self, table: &Table) -> bool {
        self.report.clear();

        let missing: Vec<&str> = self
            .required_columns
            .iter()
            .filter(|c| !table.has_column(c))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            self.report
                .error(format!("Missing required columns: {}", missing.join(", ")));
            return false;
        }

        if self.report.strict_mode {
            for header in table.headers() {
                if !self.required_columns.contains(header) {
                    self.report.warning(format!("Unexpected column: {}", header));
                }
            }
        }

        let blank: Vec<&str> = self
            .required_columns
            .iter()
            .filter(|c| table.column(c).iter().any(Option::is_none))
            .map(String::as_str)
            .collect();
        if !blank.is_empty() {
            self.report.error(format!(
                "Missing values in required columns: [{}]",
                blank.join(", ")
            ));
        }

        let mut seen = BTreeSet::new();
        let mut dupes: Vec<&str> = Vec::new();
        for id in table.column(INVOICE_FIELD).into_iter().flatten() {
            if !seen.insert(id) && !dupes.contains(&id) {
                dupes.push(id);
            }
        }
        if !dupes.is_empty() {
            self.report
                .error(format!("Duplicate invoice IDs found: {}", dupes.join(", ")));
        }

        let mut bad_totals = Vec::new();
        let mut bad_work_orders = Vec::new();
        for row in 0..table.len() {
            if table.has_column(TOTAL_FIELD) {
                let raw = table.value(row, TOTAL_FIELD).unwrap_or_default();
                if let Err(e) = fields::validate_total_amount(raw) {
                    bad_totals.push(format!("Row {}: {}", row + 1, e));
                }
            }
            if table.has_column(WORK_ORDER_FIELD) {
                let raw = table.value(row, WORK_ORDER_FIELD).unwrap_or_default();
                if let Err(e) = fields::validate_work_order(raw) {
                    bad_work_orders.push(format!("Row {}: {}", row + 1, e));
                }
            }
        }
        if !bad_totals.is_empty() {
            self.report.error(format!(
                "Invalid Total Amount values:\n{}",
                bad_totals.join("\n")
            ));
        }
        if !bad_work_orders.is_empty() {
            self.report.error(format!(
                "Invalid Work Order values:\n{}",
                bad_work_orders.join("\n")
            ));
        }

        let valid = self.report.valid();
        tracing::info!(valid, "ground truth validation finished");
        valid
    }

    fn report(&self) -> &ValidationReport {
        &self.report
    }

    fn clear_errors(&mut self) {
        self.report.clear();
    }
}
