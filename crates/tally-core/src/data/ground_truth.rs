//! Ground truth loading and schema enforcement.
//!
//! The CSV must carry the required columns (by default `Invoice`,
//! `Work Order Number` and `Total`), no blank required cells, unique invoice
//! ids, and per-row valid totals and work orders. Validated tables hold the
//! normalized values.

use super::table::Table;
use super::DataError;
use crate::fields::{self, FieldMap, INVOICE_FIELD, TOTAL_FIELD, WORK_ORDER_FIELD};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub fn default_required_columns() -> Vec<String> {
    vec![
        INVOICE_FIELD.to_string(),
        WORK_ORDER_FIELD.to_string(),
        TOTAL_FIELD.to_string(),
    ]
}

#[derive(Debug)]
pub struct GroundTruthManager {
    path: PathBuf,
    required_columns: Vec<String>,
    cache_enabled: bool,
    validated: Mutex<Option<Arc<Table>>>,
}

impl GroundTruthManager {
    pub fn new(
        path: impl Into<PathBuf>,
        required_columns: Option<Vec<String>>,
        cache_enabled: bool,
    ) -> Result<Self, DataError> {
        let path = path.into();
        if !path.exists() {
            return Err(DataError::GroundTruthMissing(path));
        }
        Ok(Self {
            path,
            required_columns: required_columns.unwrap_or_else(default_required_columns),
            cache_enabled,
            validated: Mutex::new(None),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn required_columns(&self) -> &[String] {
        &self.required_columns
    }

    /// Read the raw table from disk without validation.
    pub fn load_ground_truth(&self) -> Result<Table, DataError> {
        Table::from_path(&self.path).map_err(|e| DataError::GroundTruthRead(e.to_string()))
    }

    /// Check the table and return it with normalized Total and Work Order
    /// values. The first failing check is reported.
    pub fn validate_ground_truth(&self, mut table: Table) -> Result<Table, DataError> {
        let missing: Vec<&str> = self
            .required_columns
            .iter()
            .filter(|c| !table.has_column(c))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(DataError::GroundTruth(format!(
                "Missing required columns: {}",
                missing.join(", ")
            )));
        }

        let blank: Vec<&str> = self
            .required_columns
            .iter()
            .filter(|c| table.column(c).iter().any(Option::is_none))
            .map(String::as_str)
            .collect();
        if !blank.is_empty() {
            return Err(DataError::GroundTruth(format!(
                "Missing values in required columns: [{}]",
                blank.join(", ")
            )));
        }

        if table.has_column(INVOICE_FIELD) {
            let mut seen = BTreeSet::new();
            let mut dupes = Vec::new();
            for id in table.column(INVOICE_FIELD).into_iter().flatten() {
                if !seen.insert(id) && !dupes.contains(&id) {
                    dupes.push(id);
                }
            }
            if !dupes.is_empty() {
                return Err(DataError::GroundTruth(format!(
                    "Duplicate invoice IDs found: {}",
                    dupes.join(", ")
                )));
            }
        }

        let mut errors = Vec::new();
        for row in 0..table.len() {
            match normalize_row(&table, row) {
                Ok((total, work_order)) => {
                    if let Some(total) = total {
                        table.set(row, TOTAL_FIELD, Some(total));
                    }
                    if let Some(wo) = work_order {
                        table.set(row, WORK_ORDER_FIELD, Some(wo));
                    }
                }
                Err(e) => errors.push(format!("Row {}: {}", row + 1, e)),
            }
        }
        if !errors.is_empty() {
            return Err(DataError::GroundTruth(format!(
                "Field validation errors:\n{}",
                errors.join("\n")
            )));
        }

        tracing::info!(path = %self.path.display(), rows = table.len(), "ground truth validated");
        Ok(table)
    }

    /// Load, validate and (when enabled) cache the ground truth table.
    pub fn get_validated_data(&self) -> Result<Arc<Table>, DataError> {
        if self.cache_enabled {
            if let Some(cached) = self.lock().as_ref() {
                tracing::debug!("ground truth cache hit");
                return Ok(cached.clone());
            }
        }
        let table = Arc::new(self.validate_ground_truth(self.load_ground_truth()?)?);
        if self.cache_enabled {
            *self.lock() = Some(table.clone());
        }
        Ok(table)
    }

    /// Every non-invoice field of one row, Total formatted to two decimals.
    pub fn get_ground_truth(&self, invoice_id: &str) -> Result<FieldMap, DataError> {
        let table = self.get_validated_data()?;
        let wanted = invoice_id.trim();
        let row = table
            .column(INVOICE_FIELD)
            .iter()
            .position(|v| *v == Some(wanted))
            .ok_or_else(|| DataError::InvoiceNotFound(wanted.to_string()))?;
        let mut fields = table.row_map(row);
        fields.remove(INVOICE_FIELD);
        Ok(fields)
    }

    pub fn get_expected_fields(&self) -> Result<Vec<String>, DataError> {
        let table = self.get_validated_data()?;
        Ok(table
            .headers()
            .iter()
            .filter(|h| h.as_str() != INVOICE_FIELD)
            .cloned()
            .collect())
    }

    pub fn invoice_ids(&self) -> Result<Vec<String>, DataError> {
        let table = self.get_validated_data()?;
        Ok(table
            .column(INVOICE_FIELD)
            .into_iter()
            .flatten()
            .map(str::to_string)
            .collect())
    }

    pub fn clear_cache(&self) {
        *self.lock() = None;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Arc<Table>>> {
        self.validated.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn normalize_row(
    table: &Table,
    row: usize,
) -> Result<(Option<String>, Option<String>), fields::FieldError> {
    let total = if table.has_column(TOTAL_FIELD) {
        let raw = table.value(row, TOTAL_FIELD).unwrap_or_default();
        Some(fields::validate_total_amount(raw)?)
    } else {
        None
    };
    let work_order = if table.has_column(WORK_ORDER_FIELD) {
        let raw = table.value(row, WORK_ORDER_FIELD).unwrap_or_default();
        Some(fields::validate_work_order(raw)?)
    } else {
        None
    };
    Ok((total, work_order))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_csv(content: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    fn manager(content: &str) -> (tempfile::NamedTempFile, GroundTruthManager) {
        let f = write_csv(content);
        let m = GroundTruthManager::new(f.path(), None, true).unwrap();
        (f, m)
    }

    #[test]
    fn missing_file_is_rejected() {
        let err = GroundTruthManager::new("/nonexistent/gt.csv", None, true).unwrap_err();
        assert!(err.to_string().starts_with("Ground truth file does not exist"));
    }

    #[test]
    fn lookup_returns_normalized_fields() {
        let (_f, gt) = manager(
            "Invoice,Work Order Number,Total,Vendor\n1001,01234,\"$1,234.5\",Acme\n1002,AB123,20,\n",
        );
        let fields = gt.get_ground_truth("1001").unwrap();
        assert_eq!(fields["Total"], "1234.50");
        assert_eq!(fields["Work Order Number"], "01234");
        assert_eq!(fields["Vendor"], "Acme");
        assert!(!fields.contains_key("Invoice"));

        let second = gt.get_ground_truth(" 1002 ").unwrap();
        assert!(!second.contains_key("Vendor"));

        let err = gt.get_ground_truth("9999").unwrap_err();
        assert_eq!(err.to_string(), "Invoice ID 9999 not found in ground truth data");
    }

    #[test]
    fn missing_columns_reported_first() {
        let (_f, gt) = manager("Invoice,Total\n1,1\n1,2\n");
        let err = gt.get_validated_data().unwrap_err();
        assert_eq!(err.to_string(), "Missing required columns: Work Order Number");
    }

    #[test]
    fn missing_values_and_duplicates() {
        let (_f, gt) = manager("Invoice,Work Order Number,Total\n1,12345,\n2,12345,3\n");
        let err = gt.get_validated_data().unwrap_err();
        assert_eq!(err.to_string(), "Missing values in required columns: [Total]");

        let (_f, gt) =
            manager("Invoice,Work Order Number,Total\n1,12345,1\n1,12345,3\n2,12345,1\n");
        let err = gt.get_validated_data().unwrap_err();
        assert_eq!(err.to_string(), "Duplicate invoice IDs found: 1");
    }

    #[test]
    fn row_errors_are_collected() {
        let (_f, gt) =
            manager("Invoice,Work Order Number,Total\n1,1234,1\n2,12345,abc\n3,12345,5\n");
        let err = gt.get_validated_data().unwrap_err().to_string();
        assert!(err.starts_with("Field validation errors:\n"));
        assert!(err.contains("Row 1: Invalid work order format: 1234."));
        assert!(err.contains("Row 2: Invalid total amount format: abc"));
        assert!(!err.contains("Row 3"));
    }

    #[test]
    fn expected_fields_and_ids_follow_file_order() {
        let (_f, gt) = manager("Invoice,Total,Work Order Number\n20,1,AAAAA\n10,2,BBBBB\n");
        assert_eq!(gt.get_expected_fields().unwrap(), vec!["Total", "Work Order Number"]);
        assert_eq!(gt.invoice_ids().unwrap(), vec!["20", "10"]);
    }

    #[test]
    fn cache_is_cleared_on_request() {
        let f = write_csv("Invoice,Work Order Number,Total\n1,12345,1\n");
        let gt = GroundTruthManager::new(f.path(), None, true).unwrap();
        assert_eq!(gt.invoice_ids().unwrap(), vec!["1"]);

        std::fs::write(f.path(), "Invoice,Work Order Number,Total\n2,12345,1\n").unwrap();
        assert_eq!(gt.invoice_ids().unwrap(), vec!["1"]);
        gt.clear_cache();
        assert_eq!(gt.invoice_ids().unwrap(), vec!["2"]);
    }

    #[test]
    fn custom_required_columns() {
        let f = write_csv("Invoice,Vendor\n1,Acme\n");
        let gt = GroundTruthManager::new(
            f.path(),
            Some(vec!["Invoice".into(), "Vendor".into()]),
            false,
        )
        .unwrap();
        assert_eq!(gt.get_ground_truth("1").unwrap()["Vendor"], "Acme");
    }
}
