//! Canonical normalization rules for the evaluated invoice fields.
//!
//! Two fields carry real validation: the invoice total (a currency amount
//! normalized to two decimals) and the work order number (exactly five
//! alphanumeric characters, leading zeros preserved). Every other field is
//! compared after trimming.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

/// Column name of the work order field in ground truth.
pub const WORK_ORDER_FIELD: &str = "Work Order Number";
/// Column name of the total amount field in ground truth.
pub const TOTAL_FIELD: &str = "Total";
/// Column holding the invoice identifier.
pub const INVOICE_FIELD: &str = "Invoice";

pub type FieldMap = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FieldError {
    #[error("Total amount cannot be empty")]
    EmptyTotal,
    #[error("Invalid total amount format: {0}")]
    InvalidTotal(String),
    #[error("Total amount must be positive: {0}")]
    NegativeTotal(String),
    #[error("Work order number cannot be empty")]
    EmptyWorkOrder,
    #[error("Invalid work order format: {0}. Must be exactly 5 alphanumeric characters.")]
    InvalidWorkOrder(String),
}

fn total_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\$?[0-9,]*\.?[0-9]*$").expect("valid total regex"))
}

fn work_order_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9]{5}$").expect("valid work order regex"))
}

/// Validate a currency amount and return it with exactly two decimals.
///
/// `"$1,234.5"` becomes `"1234.50"`. Signed input such as `-5` fails the
/// format check; `NegativeTotal` only comes from [`validate_total_value`].
pub fn validate_total_amount(value: &str) -> Result<String, FieldError> {
    let raw = value.trim();
    if raw.is_empty() {
        return Err(FieldError::EmptyTotal);
    }
    if !total_pattern().is_match(raw) {
        return Err(FieldError::InvalidTotal(raw.to_string()));
    }
    let cleaned: String = raw.chars().filter(|c| *c != '$' && *c != ',').collect();
    let amount: f64 = cleaned
        .parse()
        .map_err(|_| FieldError::InvalidTotal(raw.to_string()))?;
    validate_total_value(amount, raw)
}

/// Numeric entry point used when the amount is already parsed.
pub fn validate_total_value(amount: f64, original: &str) -> Result<String, FieldError> {
    if !amount.is_finite() {
        return Err(FieldError::InvalidTotal(original.to_string()));
    }
    if amount < 0.0 {
        return Err(FieldError::NegativeTotal(original.to_string()));
    }
    Ok(format!("{:.2}", amount))
}

/// Validate a work order number. Case and leading zeros are kept as given.
pub fn validate_work_order(value: &str) -> Result<String, FieldError> {
    let raw = value.trim();
    if raw.is_empty() {
        return Err(FieldError::EmptyWorkOrder);
    }
    if !work_order_pattern().is_match(raw) {
        return Err(FieldError::InvalidWorkOrder(raw.to_string()));
    }
    Ok(raw.to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    WorkOrder,
    TotalAmount,
    Other,
}

const WORK_ORDER_VARIANTS: &[&str] = &[
    "work order",
    "work order number",
    "workorder",
    "work_order",
    "work_order_number",
    "workordernumber",
    "order number",
    "order_number",
    "wo",
    "wo number",
    "wo #",
    "numero de orden",
    "work order number/numero de orden",
];

const TOTAL_VARIANTS: &[&str] = &[
    "total",
    "amount",
    "total amount",
    "total_amount",
    "invoice total",
    "invoice amount",
    "price",
    "cost",
    "total cost",
    "total price",
];

impl FieldKind {
    pub fn classify(field_name: &str) -> Self {
        let key = field_name.trim().to_lowercase();
        if WORK_ORDER_VARIANTS.contains(&key.as_str()) {
            FieldKind::WorkOrder
        } else if TOTAL_VARIANTS.contains(&key.as_str()) {
            FieldKind::TotalAmount
        } else {
            FieldKind::Other
        }
    }

    /// Ground-truth column this kind is stored under, if any.
    pub fn column(self) -> Option<&'static str> {
        match self {
            FieldKind::WorkOrder => Some(WORK_ORDER_FIELD),
            FieldKind::TotalAmount => Some(TOTAL_FIELD),
            FieldKind::Other => None,
        }
    }

    /// Prompt field type used by prompt configs (`work_order`, `cost`).
    pub fn prompt_field(self) -> Option<&'static str> {
        match self {
            FieldKind::WorkOrder => Some("work_order"),
            FieldKind::TotalAmount => Some("cost"),
            FieldKind::Other => None,
        }
    }
}

/// Map any recognized field name spelling onto its ground-truth column.
pub fn canonical_field_name(field_name: &str) -> String {
    match FieldKind::classify(field_name).column() {
        Some(column) => column.to_string(),
        None => field_name.trim().to_string(),
    }
}

/// Rename every key of `fields` to its canonical column. When two keys
/// collapse onto the same column the first non-empty value wins.
pub fn canonicalize_fields(fields: &FieldMap) -> FieldMap {
    let mut out = FieldMap::new();
    for (name, value) in fields {
        let canonical = canonical_field_name(name);
        match out.get(&canonical) {
            Some(existing) if !existing.trim().is_empty() => {}
            _ => {
                out.insert(canonical, value.clone());
            }
        }
    }
    out
}

pub fn normalize_field(field_name: &str, value: &str) -> Result<String, FieldError> {
    match FieldKind::classify(field_name) {
        FieldKind::TotalAmount => validate_total_amount(value),
        FieldKind::WorkOrder => validate_work_order(value),
        FieldKind::Other => Ok(value.trim().to_string()),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldComparison {
    pub extracted: Option<String>,
    pub ground_truth: Option<String>,
    pub exact_match: bool,
    pub normalized_match: bool,
    pub normalized_extracted: Option<String>,
    pub normalized_ground_truth: Option<String>,
    pub missing_in_extracted: bool,
    pub missing_in_ground_truth: bool,
}

/// Compare two field maps over the union of their keys.
pub fn compare_extracted_to_ground_truth(
    extracted: &FieldMap,
    ground_truth: &FieldMap,
) -> BTreeMap<String, FieldComparison> {
    let names: BTreeSet<&String> = extracted.keys().chain(ground_truth.keys()).collect();
    names
        .into_iter()
        .map(|name| {
            let ext = extracted.get(name);
            let gt = ground_truth.get(name);
            let normalized_extracted = ext.and_then(|v| normalize_field(name, v).ok());
            let normalized_ground_truth = gt.and_then(|v| normalize_field(name, v).ok());
            let exact_match = matches!((ext, gt), (Some(a), Some(b)) if a.trim() == b.trim());
            let normalized_match = matches!(
                (&normalized_extracted, &normalized_ground_truth),
                (Some(a), Some(b)) if a == b
            );
            (
                name.clone(),
                FieldComparison {
                    extracted: ext.cloned(),
                    ground_truth: gt.cloned(),
                    exact_match,
                    normalized_match,
                    normalized_extracted,
                    normalized_ground_truth,
                    missing_in_extracted: ext.is_none(),
                    missing_in_ground_truth: gt.is_none(),
                },
            )
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionSummary {
    pub total_fields: usize,
    pub common_fields: usize,
    pub exact_matches: usize,
    pub normalized_matches: usize,
    pub exact_match_rate: f64,
    pub normalized_match_rate: f64,
    pub common_field_match_rate: f64,
    pub missing_in_extracted: Vec<String>,
    pub missing_in_ground_truth: Vec<String>,
    pub field_results: BTreeMap<String, FieldComparison>,
}

pub(crate) fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

pub fn validate_extracted_fields(
    extracted: &FieldMap,
    ground_truth: &FieldMap,
) -> ExtractionSummary {
    let field_results = compare_extracted_to_ground_truth(extracted, ground_truth);
    let total_fields = field_results.len();
    let common_fields = field_results
        .values()
        .filter(|c| !c.missing_in_extracted && !c.missing_in_ground_truth)
        .count();
    let exact_matches = field_results.values().filter(|c| c.exact_match).count();
    let normalized_matches = field_results.values().filter(|c| c.normalized_match).count();
    let missing_in_extracted = field_results
        .iter()
        .filter(|(_, c)| c.missing_in_extracted)
        .map(|(k, _)| k.clone())
        .collect();
    let missing_in_ground_truth = field_results
        .iter()
        .filter(|(_, c)| c.missing_in_ground_truth)
        .map(|(k, _)| k.clone())
        .collect();

    ExtractionSummary {
        total_fields,
        common_fields,
        exact_matches,
        normalized_matches,
        exact_match_rate: ratio(exact_matches, total_fields),
        normalized_match_rate: ratio(normalized_matches, total_fields),
        common_field_match_rate: ratio(normalized_matches, common_fields),
        missing_in_extracted,
        missing_in_ground_truth,
        field_results,
    }
}
