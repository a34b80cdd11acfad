use super::{ExtractionModel, ModelError, ModelOutput};
use crate::config::ModelConfig;
use crate::data::InvoiceImage;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Canned responses keyed by invoice id, for tests and dry runs.
#[derive(Debug)]
pub struct FakeModel {
    name: String,
    responses: BTreeMap<String, String>,
    default_response: Option<String>,
    /// Remaining forced failures per invoice id.
    failures: Mutex<BTreeMap<String, u32>>,
    delay: Option<Duration>,
    prompt_log: Option<PromptLog>,
}

/// `(invoice_id, prompt)` pairs in call order.
pub type PromptLog = Arc<Mutex<Vec<(String, String)>>>;

impl FakeModel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            responses: BTreeMap::new(),
            default_response: None,
            failures: Mutex::new(BTreeMap::new()),
            delay: None,
            prompt_log: None,
        }
    }

    pub fn with_response(mut self, invoice_id: &str, text: impl Into<String>) -> Self {
        self.responses.insert(invoice_id.to_string(), text.into());
        self
    }

    pub fn with_default_response(mut self, text: impl Into<String>) -> Self {
        self.default_response = Some(text.into());
        self
    }

    /// Fail the first `times` calls for `invoice_id` with a network error.
    pub fn failing(self, invoice_id: &str, times: u32) -> Self {
        self.failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(invoice_id.to_string(), times);
        self
    }

    pub fn with_prompt_log(mut self, log: PromptLog) -> Self {
        self.prompt_log = Some(log);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Build from `parameters.responses`, `parameters.default_response`
    /// and `parameters.delay_ms`.
    pub fn from_config(cfg: &ModelConfig) -> Result<Self, ModelError> {
        let mut model = Self::new(cfg.name.clone());
        if let Some(responses) = cfg.parameters.get("responses") {
            let map = responses.as_mapping().ok_or_else(|| {
                ModelError::config(
                    "responses",
                    "must be a mapping of invoice id to text",
                    None,
                    None,
                )
                .with_model(&cfg.name)
            })?;
            for (k, v) in map {
                let key = scalar(k);
                let text = scalar(v);
                match (key, text) {
                    (Some(k), Some(t)) => model.responses.insert(k, t),
                    _ => {
                        return Err(ModelError::config(
                            "responses",
                            "keys and values must be scalars",
                            None,
                            None,
                        )
                        .with_model(&cfg.name))
                    }
                };
            }
        }
        model.default_response = cfg.parameter_str("default_response").map(str::to_string);
        if let Some(ms) = cfg.parameters.get("delay_ms").and_then(serde_yaml::Value::as_u64) {
            model.delay = Some(Duration::from_millis(ms));
        }
        Ok(model)
    }
}

fn scalar(v: &serde_yaml::Value) -> Option<String> {
    match v {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[async_trait]
impl ExtractionModel for FakeModel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn extract(&self, image: &InvoiceImage, prompt: &str) -> Result<ModelOutput, ModelError> {
        if let Some(log) = &self.prompt_log {
            log.lock()
                .unwrap_or_else(|e| e.into_inner())
                .push((image.invoice_id.clone(), prompt.to_string()));
        }
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        {
            let mut failures = self.failures.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(left) = failures.get_mut(&image.invoice_id) {
                if *left > 0 {
                    *left -= 1;
                    return Err(
                        ModelError::network("simulated transient failure").with_model(&self.name)
                    );
                }
            }
        }
        let text = self
            .responses
            .get(&image.invoice_id)
            .or(self.default_response.as_ref())
            .cloned()
            .ok_or_else(|| {
                ModelError::processing(
                    Some(&image.path.display().to_string()),
                    Some("inference"),
                    format!("no canned response for invoice {}", image.invoice_id),
                )
                .with_model(&self.name)
            })?;
        Ok(ModelOutput {
            text,
            model: self.name.clone(),
            provider: "fake".to_string(),
            elapsed_ms: self.delay.map(|d| d.as_millis() as u64).unwrap_or(0),
            meta: serde_json::json!({}),
        })
    }

    fn provider_name(&self) -> &'static str {
        "fake"
    }
}

#[cfg(test)]
pub(crate) fn test_image(invoice_id: &str) -> InvoiceImage {
    InvoiceImage {
        invoice_id: invoice_id.to_string(),
        path: format!("{}.png", invoice_id).into(),
        bytes: std::sync::Arc::new(vec![1, 2, 3]),
        width: 1,
        height: 1,
        format: "png".into(),
    }
}
