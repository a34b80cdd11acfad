//! Turning raw model text into field maps.

pub mod extracted;

pub use extracted::ExtractedFieldsParser;

use crate::fields::FieldMap;
use std::collections::BTreeMap;
use std::sync::Arc;

pub const DEFAULT_PARSER: &str = "extracted_fields";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("Model output must be a non-empty string")]
    Empty,
    #[error("Could not parse model output into structured data")]
    Unparseable,
    #[error("Invalid extracted data: {}", .0.join("; "))]
    Validation(Vec<String>),
    #[error("Parser already registered: {0}")]
    AlreadyRegistered(String),
    #[error("Unsupported parser type: {0}")]
    Unknown(String),
}

pub trait OutputParser: Send + Sync {
    fn name(&self) -> &str;

    fn parse(&self, output: &str) -> Result<FieldMap, ParseError>;

    fn normalize(&self, parsed: &FieldMap) -> FieldMap;

    fn validate(&self, parsed: &FieldMap) -> Result<(), ParseError>;
}

pub struct ParserRegistry {
    parsers: BTreeMap<String, Arc<dyn OutputParser>>,
}

impl Default for ParserRegistry {
    fn default() -> Self {
        let mut parsers: BTreeMap<String, Arc<dyn OutputParser>> = BTreeMap::new();
        parsers.insert(DEFAULT_PARSER.to_string(), Arc::new(ExtractedFieldsParser::default()));
        Self { parsers }
    }
}

impl ParserRegistry {
    pub fn register(
        &mut self,
        name: &str,
        parser: Arc<dyn OutputParser>,
    ) -> Result<(), ParseError> {
        if self.parsers.contains_key(name) {
            return Err(ParseError::AlreadyRegistered(name.to_string()));
        }
        self.parsers.insert(name.to_string(), parser);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn OutputParser>, ParseError> {
        self.parsers
            .get(name)
            .cloned()
            .ok_or_else(|| ParseError::Unknown(name.to_string()))
    }

    pub fn default_parser(&self) -> Result<Arc<dyn OutputParser>, ParseError> {
        self.get(DEFAULT_PARSER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_has_default_and_rejects_duplicates() {
        let mut r = ParserRegistry::default();
        assert_eq!(r.default_parser().unwrap().name(), DEFAULT_PARSER);
        let err = r
            .register(DEFAULT_PARSER, Arc::new(ExtractedFieldsParser::default()))
            .unwrap_err();
        assert_eq!(err.to_string(), "Parser already registered: extracted_fields");
        assert!(matches!(r.get("xml"), Err(ParseError::Unknown(_))));
    }
}
