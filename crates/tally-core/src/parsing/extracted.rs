use super::{OutputParser, ParseError};
use crate::data::validators::{ExtractedDataValidator, Validator};
use crate::fields::{self, FieldKind, FieldMap};
use regex::Regex;
use std::sync::OnceLock;

pub const WORK_ORDER_KEY: &str = "work_order";
pub const TOTAL_AMOUNT_KEY: &str = "total_amount";

fn json_block() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)(\{.*\}|\[.*\])").expect("valid json block regex"))
}

// Values may carry thousands separators (`$1,234.50`); a comma followed by
// exactly three digits stays inside the value.
fn key_value() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:^|\n|,)\s*([^:,\n]+?)\s*:\s*([^,\n]+(?:,\d{3}[^,\n]*)*)")
            .expect("valid key-value regex")
    })
}

fn work_order_token() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b[A-Za-z0-9]{5}\b").expect("valid work order token regex"))
}

fn money_token() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\$\s?[0-9][0-9,]*(?:\.[0-9]{1,2})?|\b[0-9][0-9,]*\.[0-9]{2}\b")
            .expect("valid money token regex")
    })
}

/// Parser for free-form model answers naming a work order and a total.
///
/// Accepts JSON (the first object or array in the text), then `key: value`
/// lines. Field names are mapped onto `work_order` / `total_amount`.
#[derive(Debug, Clone)]
pub struct ExtractedFieldsParser {
    required: Vec<String>,
}

impl Default for ExtractedFieldsParser {
    fn default() -> Self {
        Self::new(vec![WORK_ORDER_KEY.to_string(), TOTAL_AMOUNT_KEY.to_string()])
    }
}

/// Parser-level key for a field name: the two evaluated fields get their
/// fixed keys, others are lower-cased.
pub fn normalize_field_name(name: &str) -> String {
    match FieldKind::classify(name) {
        FieldKind::WorkOrder => WORK_ORDER_KEY.to_string(),
        FieldKind::TotalAmount => TOTAL_AMOUNT_KEY.to_string(),
        FieldKind::Other => name.trim().to_lowercase(),
    }
}

fn json_value_text(v: &serde_json::Value) -> Option<String> {
    match v {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn object_fields(v: serde_json::Value) -> Option<FieldMap> {
    let obj = match v {
        serde_json::Value::Object(o) => o,
        serde_json::Value::Array(items) => match items.into_iter().next() {
            Some(serde_json::Value::Object(o)) => o,
            _ => return None,
        },
        _ => return None,
    };
    let map: FieldMap = obj
        .iter()
        .filter_map(|(k, v)| json_value_text(v).map(|t| (normalize_field_name(k), t)))
        .collect();
    (!map.is_empty()).then_some(map)
}

impl ExtractedFieldsParser {
    pub fn new(required: Vec<String>) -> Self {
        Self { required }
    }

    fn try_json(&self, output: &str) -> Option<FieldMap> {
        if let Some(m) = json_block().find(output) {
            match serde_json::from_str::<serde_json::Value>(m.as_str()) {
                Ok(v) => {
                    if let Some(map) = object_fields(v) {
                        tracing::debug!("parsed JSON block");
                        return Some(map);
                    }
                }
                Err(e) => tracing::debug!(error = %e, "JSON block did not parse"),
            }
        }
        serde_json::from_str::<serde_json::Value>(output.trim())
            .ok()
            .and_then(object_fields)
    }

    fn try_key_value(&self, output: &str) -> Option<FieldMap> {
        let mut map = FieldMap::new();
        for caps in key_value().captures_iter(output) {
            let key = normalize_field_name(&caps[1]);
            if key.is_empty() {
                continue;
            }
            map.entry(key).or_insert_with(|| caps[2].trim().to_string());
        }
        if map.is_empty() {
            tracing::debug!("no key-value pairs found");
            None
        } else {
            Some(map)
        }
    }

    /// Extract one field, falling back to scanning free text when the
    /// output has no recognizable structure.
    pub fn parse_field(&self, output: &str, kind: FieldKind) -> Option<String> {
        if let Ok(parsed) = self.parse(output) {
            let hit = parsed
                .iter()
                .find(|(k, _)| FieldKind::classify(k) == kind)
                .map(|(_, v)| v.clone());
            if let Some(v) = hit {
                return Some(clean_value(kind, &v));
            }
        }
        match kind {
            FieldKind::WorkOrder => work_order_token()
                .find_iter(output)
                .map(|m| m.as_str())
                .find(|t| t.chars().any(|c| c.is_ascii_digit()))
                .map(str::to_string),
            FieldKind::TotalAmount => money_token()
                .find(output)
                .map(|m| clean_value(kind, m.as_str())),
            FieldKind::Other => None,
        }
    }
}

fn clean_value(kind: FieldKind, value: &str) -> String {
    match kind {
        FieldKind::WorkOrder => {
            let compact: String = value
                .chars()
                .filter(|c| !c.is_whitespace() && *c != '#')
                .collect();
            fields::validate_work_order(&compact).unwrap_or(compact)
        }
        FieldKind::TotalAmount => {
            let compact: String = value
                .chars()
                .filter(|c| !c.is_whitespace())
                .collect();
            fields::validate_total_amount(&compact).unwrap_or_else(|_| {
                compact
                    .chars()
                    .filter(|c| !matches!(c, '$' | '€' | '£' | ','))
                    .collect()
            })
        }
        FieldKind::Other => value.trim().to_string(),
    }
}

impl OutputParser for ExtractedFieldsParser {
    fn name(&self) -> &str {
        super::DEFAULT_PARSER
    }

    fn parse(&self, output: &str) -> Result<FieldMap, ParseError> {
        if output.trim().is_empty() {
            return Err(ParseError::Empty);
        }
        if let Some(map) = self.try_json(output) {
            return Ok(map);
        }
        if let Some(map) = self.try_key_value(output) {
            return Ok(map);
        }
        tracing::warn!(chars = output.len(), "model output matched no known format");
        Err(ParseError::Unparseable)
    }

    fn normalize(&self, parsed: &FieldMap) -> FieldMap {
        let mut out = FieldMap::new();
        for (name, value) in parsed {
            let key = normalize_field_name(name);
            let kind = FieldKind::classify(&key);
            out.entry(key).or_insert_with(|| clean_value(kind, value));
        }
        out
    }

    fn validate(&self, parsed: &FieldMap) -> Result<(), ParseError> {
        if parsed.is_empty() {
            return Err(ParseError::Validation(vec!["Empty parsed output".into()]));
        }
        let expected = self
            .required
            .iter()
            .map(|f| fields::canonical_field_name(f))
            .collect();
        let mut validator = ExtractedDataValidator::new(Some(expected), true);
        if validator.validate(parsed) {
            Ok(())
        } else {
            Err(ParseError::Validation(validator.errors().to_vec()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> ExtractedFieldsParser {
        ExtractedFieldsParser::default()
    }

    #[test]
    fn json_embedded_in_prose() {
        let out = "Sure! Here you go:\n```json\n{\"Work Order Number\": \"01234\", \"total\": 1234.5}\n```";
        let map = parser().parse(out).unwrap();
        assert_eq!(map["work_order"], "01234");
        assert_eq!(map["total_amount"], "1234.5");
    }

    #[test]
    fn json_array_takes_first_object() {
        let map = parser().parse(r#"[{"wo": "A1B2C"}, {"wo": "zzzzz"}]"#).unwrap();
        assert_eq!(map["work_order"], "A1B2C");
    }

    #[test]
    fn key_value_lines_keep_thousands_separators() {
        let map = parser()
            .parse("Work Order: 12345\nTotal Amount: $1,234.50, Vendor: ACME")
            .unwrap();
        assert_eq!(map["work_order"], "12345");
        assert_eq!(map["total_amount"], "$1,234.50");
        assert_eq!(map["vendor"], "ACME");
    }

    #[test]
    fn empty_and_unstructured_outputs_fail() {
        assert_eq!(parser().parse("   ").unwrap_err(), ParseError::Empty);
        assert_eq!(
            parser().parse("I could not read this invoice").unwrap_err().to_string(),
            "Could not parse model output into structured data"
        );
    }

    #[test]
    fn normalize_cleans_values() {
        let raw: FieldMap = [
            ("WO #".to_string(), "# 0 12 34".to_string()),
            ("amount".to_string(), "$1,234.5".to_string()),
            ("Vendor".to_string(), "  ACME ".to_string()),
        ]
        .into();
        let n = parser().normalize(&raw);
        assert_eq!(n["work_order"], "01234");
        assert_eq!(n["total_amount"], "1234.50");
        assert_eq!(n["vendor"], "ACME");
    }

    #[test]
    fn validate_requires_both_fields() {
        let p = parser();
        let ok: FieldMap = [
            ("work_order".to_string(), "12345".to_string()),
            ("total_amount".to_string(), "10.00".to_string()),
        ]
        .into();
        p.validate(&ok).unwrap();
        let partial: FieldMap = [("work_order".to_string(), "12345".to_string())].into();
        let err = p.validate(&partial).unwrap_err();
        assert!(err.to_string().contains("Missing expected fields: Total"));
    }

    #[test]
    fn parse_field_falls_back_to_free_text() {
        let p = parser();
        assert_eq!(
            p.parse_field("The invoice shows order 0A123 and is due soon", FieldKind::WorkOrder),
            Some("0A123".into())
        );
        assert_eq!(
            p.parse_field("Amount due is $ 2,500.00 by Friday", FieldKind::TotalAmount),
            Some("2500.00".into())
        );
        assert_eq!(
            p.parse_field("{\"cost\": \"$99.9\"}", FieldKind::TotalAmount),
            Some("99.90".into())
        );
        assert_eq!(p.parse_field("nothing here", FieldKind::TotalAmount), None);
    }
}
