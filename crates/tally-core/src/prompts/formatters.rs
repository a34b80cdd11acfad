//! Wrap a generated prompt in the chat markup a model family expects.

use super::FormatError;
use std::collections::BTreeMap;
use std::sync::Arc;

pub const DEFAULT_SYSTEM_MESSAGE: &str =
    "You are a precise assistant that extracts fields from invoice images.";

pub trait PromptFormatter: Send + Sync {
    fn name(&self) -> &str;

    fn format(&self, prompt: &str, system: Option<&str>) -> Result<String, FormatError>;

    fn validate(&self, formatted: &str) -> Result<(), FormatError>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormatRules {
    pub max_length: Option<usize>,
    pub required_sections: Vec<String>,
}

/// A formatter defined by a `{system}` / `{prompt}` template and the
/// markers its output must contain.
#[derive(Debug, Clone)]
pub struct TemplateFormatter {
    name: String,
    template: String,
    system_message: String,
    markers: Vec<&'static str>,
    rules: FormatRules,
}

impl TemplateFormatter {
    pub fn new(name: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            template: template.into(),
            system_message: DEFAULT_SYSTEM_MESSAGE.into(),
            markers: Vec::new(),
            rules: FormatRules::default(),
        }
    }

    pub fn basic() -> Self {
        Self::new("basic", "{prompt}")
    }

    pub fn doctr() -> Self {
        Self::new("doctr", "{prompt}")
    }

    pub fn llama() -> Self {
        let mut f = Self::new("llama", "<s>[INST] <<SYS>>\n{system}\n<</SYS>>\n\n{prompt}[/INST]");
        f.markers = vec!["<s>[INST]", "<<SYS>>", "<</SYS>>", "[/INST]"];
        f
    }

    pub fn pixtral() -> Self {
        let mut f = Self::new("pixtral", "{system}\n\nUser: {prompt}\nAssistant:");
        f.markers = vec!["User:", "Assistant:"];
        f
    }

    pub fn with_system_message(mut self, message: impl Into<String>) -> Self {
        self.system_message = message.into();
        self
    }

    pub fn with_rules(mut self, rules: FormatRules) -> Self {
        self.rules = rules;
        self
    }
}

impl PromptFormatter for TemplateFormatter {
    fn name(&self) -> &str {
        &self.name
    }

    fn format(&self, prompt: &str, system: Option<&str>) -> Result<String, FormatError> {
        let system = system.unwrap_or(self.system_message.as_str());
        // Substitute in one pass so braces inside the prompt stay literal.
        let mut out = String::with_capacity(self.template.len() + prompt.len() + system.len());
        let mut rest = self.template.as_str();
        while let Some(start) = rest.find('{') {
            out.push_str(&rest[..start]);
            let tail = &rest[start..];
            if let Some(t) = tail.strip_prefix("{prompt}") {
                out.push_str(prompt);
                rest = t;
            } else if let Some(t) = tail.strip_prefix("{system}") {
                out.push_str(system);
                rest = t;
            } else {
                return Err(FormatError::Render(format!(
                    "unknown placeholder in {} template",
                    self.name
                )));
            }
        }
        out.push_str(rest);
        self.validate(&out)?;
        Ok(out)
    }

    fn validate(&self, formatted: &str) -> Result<(), FormatError> {
        if formatted.trim().is_empty() {
            return Err(FormatError::Empty);
        }
        if let Some(max) = self.rules.max_length {
            let len = formatted.chars().count();
            if len > max {
                return Err(FormatError::TooLong { len, max });
            }
        }
        for section in &self.rules.required_sections {
            if !formatted.contains(section.as_str()) {
                return Err(FormatError::MissingSection(section.clone()));
            }
        }
        for marker in &self.markers {
            if !formatted.contains(marker) {
                return Err(FormatError::MissingMarker(marker.to_string()));
            }
        }
        Ok(())
    }
}

/// Formatters keyed by a model config's `prompt_format`.
pub struct FormatterRegistry {
    formatters: BTreeMap<String, Arc<dyn PromptFormatter>>,
}

impl Default for FormatterRegistry {
    fn default() -> Self {
        let mut formatters: BTreeMap<String, Arc<dyn PromptFormatter>> = BTreeMap::new();
        for f in [
            TemplateFormatter::basic(),
            TemplateFormatter::doctr(),
            TemplateFormatter::llama(),
            TemplateFormatter::pixtral(),
        ] {
            formatters.insert(f.name().to_string(), Arc::new(f));
        }
        Self { formatters }
    }
}

impl FormatterRegistry {
    pub fn register(&mut self, formatter: Arc<dyn PromptFormatter>) -> Result<(), FormatError> {
        let name = formatter.name().to_string();
        if self.formatters.contains_key(&name) {
            return Err(FormatError::AlreadyRegistered(name));
        }
        self.formatters.insert(name, formatter);
        Ok(())
    }

    pub fn get(&self, model_type: &str) -> Result<Arc<dyn PromptFormatter>, FormatError> {
        self.formatters
            .get(model_type)
            .cloned()
            .ok_or_else(|| FormatError::UnsupportedModel(model_type.to_string()))
    }

    pub fn names(&self) -> Vec<&str> {
        self.formatters.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn llama_wraps_system_and_prompt() {
        let out = TemplateFormatter::llama()
            .format("Find the {total}.", Some("sys"))
            .unwrap();
        assert_eq!(out, "<s>[INST] <<SYS>>\nsys\n<</SYS>>\n\nFind the {total}.[/INST]");
    }

    #[test]
    fn pixtral_uses_default_system_message() {
        let out = TemplateFormatter::pixtral().format("Q", None).unwrap();
        assert_eq!(out, format!("{}\n\nUser: Q\nAssistant:", DEFAULT_SYSTEM_MESSAGE));
    }

    #[test]
    fn validation_rules_apply() {
        let f = TemplateFormatter::basic().with_rules(FormatRules {
            max_length: Some(5),
            required_sections: vec![],
        });
        assert_eq!(f.format("  ", None).unwrap_err(), FormatError::Empty);
        assert_eq!(
            f.format("too long", None).unwrap_err().to_string(),
            "Prompt exceeds maximum length: 8 > 5"
        );
        let f = TemplateFormatter::basic().with_rules(FormatRules {
            max_length: None,
            required_sections: vec!["Total".into()],
        });
        assert_eq!(
            f.format("Work order?", None).unwrap_err(),
            FormatError::MissingSection("Total".into())
        );
        assert_eq!(
            TemplateFormatter::llama().validate("plain").unwrap_err().to_string(),
            "Missing <s>[INST] marker"
        );
    }

    #[test]
    fn registry_rejects_duplicates_and_unknown() {
        let mut r = FormatterRegistry::default();
        assert_eq!(r.names(), vec!["basic", "doctr", "llama", "pixtral"]);
        assert!(r.register(Arc::new(TemplateFormatter::basic())).is_err());
        r.register(Arc::new(TemplateFormatter::new("plain", "{prompt}"))).unwrap();
        assert_eq!(
            r.get("gpt").err().unwrap().to_string(),
            "Unsupported model type: gpt"
        );
        assert_eq!(r.get("plain").unwrap().format("x", None).unwrap(), "x");
    }
}
