use crate::fields::{FieldComparison, FieldMap};
use crate::metrics_api::{GroundTruthSet, Predictions};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Ok,
    Error,
}

/// Outcome of one invoice through the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceResult {
    pub invoice_id: String,
    pub status: InvoiceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_output: Option<String>,
    /// Extracted fields keyed by ground-truth column.
    #[serde(default)]
    pub fields: FieldMap,
    #[serde(default)]
    pub comparison: BTreeMap<String, FieldComparison>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    pub attempts: u32,
    pub elapsed_ms: u64,
}

impl InvoiceResult {
    pub fn failed(invoice_id: &str, kind: &str, message: impl Into<String>) -> Self {
        Self {
            invoice_id: invoice_id.to_string(),
            status: InvoiceStatus::Error,
            raw_output: None,
            fields: FieldMap::new(),
            comparison: BTreeMap::new(),
            error: Some(message.into()),
            error_kind: Some(kind.to_string()),
            attempts: 0,
            elapsed_ms: 0,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == InvoiceStatus::Ok
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldStats {
    pub evaluated: usize,
    pub exact_matches: usize,
    pub normalized_matches: usize,
    pub missing: usize,
    pub exact_rate: f64,
    pub normalized_rate: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub fields: BTreeMap<String, FieldStats>,
}

impl RunSummary {
    /// Per-column counts. A failed invoice counts its columns as evaluated and missing.
    pub fn from_results(results: &[InvoiceResult], columns: &[String]) -> Self {
        let mut fields: BTreeMap<String, FieldStats> = columns
            .iter()
            .map(|c| (c.clone(), FieldStats::default()))
            .collect();
        for r in results {
            for (column, stats) in fields.iter_mut() {
                stats.evaluated += 1;
                match r.comparison.get(column) {
                    Some(c) if r.is_ok() => {
                        if c.exact_match {
                            stats.exact_matches += 1;
                        }
                        if c.normalized_match {
                            stats.normalized_matches += 1;
                        }
                        if c.missing_in_extracted {
                            stats.missing += 1;
                        }
                    }
                    _ => stats.missing += 1,
                }
            }
        }
        for stats in fields.values_mut() {
            stats.exact_rate = crate::fields::ratio(stats.exact_matches, stats.evaluated);
            stats.normalized_rate = crate::fields::ratio(stats.normalized_matches, stats.evaluated);
        }
        let succeeded = results.iter().filter(|r| r.is_ok()).count();
        Self {
            total: results.len(),
            succeeded,
            failed: results.len() - succeeded,
            fields,
        }
    }
}

/// Everything one `tally run` produced; written as `run.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub model: String,
    pub provider: String,
    pub prompt_category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_name: Option<String>,
    pub fields: Vec<String>,
    pub ground_truth_fingerprint: String,
    /// Seed the invoice dispatch order was shuffled with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_seed: Option<u64>,
    pub invoices: Vec<InvoiceResult>,
    pub metrics: BTreeMap<String, f64>,
    pub summary: RunSummary,
}

impl RunReport {
    /// Fields of every invoice that completed.
    pub fn predictions(&self) -> Predictions {
        self.invoices
            .iter()
            .filter(|r| r.is_ok())
            .map(|r| (r.invoice_id.clone(), r.fields.clone()))
            .collect()
    }

    pub fn failures(&self) -> impl Iterator<Item = &InvoiceResult> {
        self.invoices.iter().filter(|r| !r.is_ok())
    }
}

/// Stable sha256 over `(invoice, field, value)` triples in key order.
pub fn fingerprint_ground_truth(ground_truth: &GroundTruthSet) -> String {
    let mut hasher = Sha256::new();
    for (invoice, fields) in ground_truth {
        for (field, value) in fields {
            hasher.update(invoice.as_bytes());
            hasher.update([0x1f]);
            hasher.update(field.as_bytes());
            hasher.update([0x1f]);
            hasher.update(value.as_bytes());
            hasher.update([b'\n']);
        }
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::compare_extracted_to_ground_truth;

    fn fm(pairs: &[(&str, &str)]) -> FieldMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn ok(id: &str, extracted: FieldMap, gt: &FieldMap) -> InvoiceResult {
        InvoiceResult {
            invoice_id: id.into(),
            status: InvoiceStatus::Ok,
            raw_output: None,
            comparison: compare_extracted_to_ground_truth(&extracted, gt),
            fields: extracted,
            error: None,
            error_kind: None,
            attempts: 1,
            elapsed_ms: 3,
        }
    }

    #[test]
    fn summary_counts_failures_as_missing() {
        let gt = fm(&[("Total", "10.00"), ("Work Order Number", "A1234")]);
        let results = vec![
            ok("1", fm(&[("Total", "$10"), ("Work Order Number", "A1234")]), &gt),
            ok("2", fm(&[("Total", "11.00")]), &gt),
            InvoiceResult::failed("3", "model", "boom"),
        ];
        let columns = vec!["Total".to_string(), "Work Order Number".to_string()];
        let s = RunSummary::from_results(&results, &columns);

        assert_eq!((s.total, s.succeeded, s.failed), (3, 2, 1));
        let total = &s.fields["Total"];
        assert_eq!(total.evaluated, 3);
        assert_eq!(total.exact_matches, 0);
        assert_eq!(total.normalized_matches, 1);
        assert_eq!(total.missing, 1);
        let wo = &s.fields["Work Order Number"];
        assert_eq!(wo.exact_matches, 1);
        assert_eq!(wo.missing, 2);
        assert!((wo.exact_rate - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn fingerprint_is_order_independent_and_value_sensitive() {
        let mut a = GroundTruthSet::new();
        a.insert("2".into(), fm(&[("Total", "1.00")]));
        a.insert("1".into(), fm(&[("Total", "2.00")]));
        let mut b = GroundTruthSet::new();
        b.insert("1".into(), fm(&[("Total", "2.00")]));
        b.insert("2".into(), fm(&[("Total", "1.00")]));
        assert_eq!(fingerprint_ground_truth(&a), fingerprint_ground_truth(&b));
        assert_eq!(fingerprint_ground_truth(&a).len(), 64);

        b.insert("2".into(), fm(&[("Total", "1.01")]));
        assert_ne!(fingerprint_ground_truth(&a), fingerprint_ground_truth(&b));
    }
}
