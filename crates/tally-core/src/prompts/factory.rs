use super::generator::{BasicPromptGenerator, GenerationRequest};
use super::strategies::{self, PromptStrategy};
use super::{PromptError, VALID_CATEGORIES, VALID_FIELD_TYPES};
use crate::config::{ConfigManager, PromptConfig, PromptTemplate};
use crate::fields::{validate_total_amount, validate_work_order, FieldError};
use std::sync::Arc;

/// Format expectations for one extractable field.
#[derive(Debug, Clone, Copy)]
pub struct FieldRequirement {
    pub field_type: &'static str,
    pub format_description: &'static str,
    pub validate: fn(&str) -> Result<String, FieldError>,
}

pub fn field_requirement(field_type: &str) -> Option<FieldRequirement> {
    match field_type {
        "work_order" => Some(FieldRequirement {
            field_type: "work_order",
            format_description: "5 alphanumeric characters",
            validate: validate_work_order,
        }),
        "cost" => Some(FieldRequirement {
            field_type: "cost",
            format_description: "Positive number with up to 2 decimal places",
            validate: validate_total_amount,
        }),
        _ => None,
    }
}

/// Loads `prompts/<category>.yaml` and builds strategies from it.
#[derive(Debug, Clone)]
pub struct PromptFactory {
    configs: Arc<ConfigManager>,
}

impl PromptFactory {
    pub fn new(configs: Arc<ConfigManager>) -> Self {
        Self { configs }
    }

    pub fn load(&self, category: &str) -> Result<Arc<PromptConfig>, PromptError> {
        check_category(category)?;
        self.configs
            .prompts(category)
            .map_err(|e| PromptError::Config(e.to_string()))
    }

    pub fn get_prompt(&self, category: &str, name: &str) -> Result<PromptTemplate, PromptError> {
        self.load(category)?
            .get_prompt(name)
            .cloned()
            .ok_or_else(|| PromptError::NotFound(name.to_string()))
    }

    pub fn get_prompts_by_field(
        &self,
        category: &str,
        field_type: &str,
    ) -> Result<Vec<PromptTemplate>, PromptError> {
        check_field_type(field_type)?;
        Ok(self
            .load(category)?
            .get_prompts_by_field(field_type)
            .into_iter()
            .cloned()
            .collect())
    }

    pub fn get_prompts_by_category(
        &self,
        category: &str,
    ) -> Result<Vec<PromptTemplate>, PromptError> {
        Ok(self
            .load(category)?
            .get_prompts_by_category(category)
            .into_iter()
            .cloned()
            .collect())
    }

    /// Strategy for the named prompt, or the first prompt of the
    /// category for `field_type` when no name is given.
    pub fn create_generator(
        &self,
        category: &str,
        field_type: &str,
        name: Option<&str>,
    ) -> Result<Box<dyn PromptStrategy>, PromptError> {
        check_field_type(field_type)?;
        let config = self.load(category)?;
        validate_config(&config, category, field_type)?;
        let template = match name {
            Some(n) => config
                .get_prompt(n)
                .ok_or_else(|| PromptError::NotFound(n.to_string()))?,
            None => config
                .get_prompts_by_field(field_type)
                .into_iter()
                .next()
                .ok_or_else(|| PromptError::NoPrompts(field_type.to_string()))?,
        };
        tracing::debug!(category, field_type, prompt = %template.name, "prompt selected");
        if category == "basic" && template.category == "basic" && template.chain.is_empty() {
            let generator = BasicPromptGenerator::new(Arc::clone(&config))?;
            let request = GenerationRequest::for_field(field_type);
            let strategy = generator.strategy(Some(template.name.as_str()), request)?;
            return Ok(Box::new(strategy));
        }
        strategies::build(template, &config)
    }
}

fn check_category(category: &str) -> Result<(), PromptError> {
    if VALID_CATEGORIES.contains(&category) {
        Ok(())
    } else {
        Err(PromptError::InvalidCategory(category.to_string()))
    }
}

fn check_field_type(field_type: &str) -> Result<(), PromptError> {
    if VALID_FIELD_TYPES.contains(&field_type) {
        Ok(())
    } else {
        Err(PromptError::InvalidFieldType(field_type.to_string()))
    }
}

/// Every prompt for `field_type` must belong to `category`, and example
/// outputs in its metadata must satisfy the field's format.
pub fn validate_config(
    config: &PromptConfig,
    category: &str,
    field_type: &str,
) -> Result<(), PromptError> {
    let prompts = config.get_prompts_by_field(field_type);
    if prompts.is_empty() {
        return Err(PromptError::NoPrompts(field_type.to_string()));
    }
    let req = field_requirement(field_type)
        .ok_or_else(|| PromptError::InvalidFieldType(field_type.to_string()))?;
    for prompt in prompts {
        if prompt.name.is_empty() || prompt.text.is_empty() || prompt.category.is_empty() {
            return Err(PromptError::Config(
                "Prompts must have name, text, and category".into(),
            ));
        }
        // Chained prompts may pull in members of other categories.
        if prompt.category != category && prompt.chain.is_empty() {
            return Err(PromptError::Config(format!(
                "Prompt category mismatch: {} != {}",
                prompt.category, category
            )));
        }
        let examples = prompt.metadata.iter().flat_map(|m| m.examples.iter());
        for example in examples {
            if let Err(e) = (req.validate)(&example.output) {
                let label = if field_type == "work_order" { "work order" } else { "cost" };
                return Err(PromptError::Config(format!(
                    "Invalid {} example: {}. {}",
                    label, example.output, e
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompts::generator::WORK_ORDER_INSTRUCTIONS;
    use crate::prompts::PromptData;

    fn factory(yaml: &str) -> (tempfile::TempDir, PromptFactory) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("prompts")).unwrap();
        std::fs::write(dir.path().join("prompts/basic.yaml"), yaml).unwrap();
        let f = PromptFactory::new(Arc::new(ConfigManager::new(dir.path())));
        (dir, f)
    }

    const BASIC: &str = r#"
prompts:
  - name: wo
    text: "Find the work order number on invoice {invoice_id}."
    category: basic
    field_to_extract: work_order
    metadata:
      source: manual
      examples:
        - output: "0A123"
  - name: total
    text: "Find the total."
    category: basic
    field_to_extract: cost
"#;

    #[test]
    fn creates_first_prompt_for_field() {
        let (_d, f) = factory(BASIC);
        let g = f.create_generator("basic", "work_order", None).unwrap();
        let data: PromptData = [("invoice_id".to_string(), "1017".to_string())].into();
        assert_eq!(
            g.generate(&data).unwrap(),
            format!("Find the work order number on invoice 1017.{}", WORK_ORDER_INSTRUCTIONS)
        );
        assert_eq!(f.get_prompts_by_field("basic", "cost").unwrap()[0].name, "total");
        assert_eq!(f.get_prompts_by_category("basic").unwrap().len(), 2);
        assert!(matches!(f.get_prompt("basic", "nope"), Err(PromptError::NotFound(_))));
    }

    #[test]
    fn rejects_unknown_category_and_field() {
        let (_d, f) = factory(BASIC);
        assert!(matches!(
            f.create_generator("fancy", "cost", None),
            Err(PromptError::InvalidCategory(_))
        ));
        let err = f.create_generator("basic", "date", None).err().unwrap();
        assert_eq!(err.to_string(), "Invalid field type: date. Must be one of work_order, cost");
    }

    #[test]
    fn invalid_examples_and_mismatched_category_fail() {
        let (_d, f) = factory(&BASIC.replace("\"0A123\"", "\"12\""));
        let err = f.create_generator("basic", "work_order", None).err().unwrap();
        assert!(err
            .to_string()
            .starts_with("Invalid work order example: 12. Invalid work order format"));

        let (_d, f) = factory(&BASIC.replace(
            "category: basic\n    field_to_extract: cost",
            "category: detailed\n    field_to_extract: cost",
        ));
        let err = f.create_generator("basic", "cost", None).err().unwrap();
        assert_eq!(err.to_string(), "Prompt category mismatch: detailed != basic");
    }

    #[test]
    fn missing_prompt_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let f = PromptFactory::new(Arc::new(ConfigManager::new(dir.path())));
        let err = f.create_generator("detailed", "cost", None).err().unwrap();
        assert!(err.to_string().contains("config not found"));
    }
}
