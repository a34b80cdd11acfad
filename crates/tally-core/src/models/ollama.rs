use super::network::check_outbound;
use super::{ExtractionModel, ModelError, ModelOutput};
use crate::config::ModelConfig;
use crate::data::InvoiceImage;
use async_trait::async_trait;
use base64::Engine;
use serde_json::json;
use std::time::Instant;
use tracing::Instrument;

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Vision model served by an Ollama endpoint (`POST /api/chat`).
#[derive(Clone)]
pub struct OllamaVisionModel {
    name: String,
    http: reqwest::Client,
    base_url: String,
    model: String,
    temperature: f64,
    max_tokens: u32,
    system_prompt: Option<String>,
}

impl std::fmt::Debug for OllamaVisionModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OllamaVisionModel")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

impl OllamaVisionModel {
    pub fn from_config(cfg: &ModelConfig) -> Result<Self, ModelError> {
        let model = cfg
            .parameter_str("model")
            .ok_or_else(|| {
                ModelError::config("model", "ollama models need parameters.model", None, None)
                    .with_model(&cfg.name)
            })?
            .to_string();
        let base_url = cfg
            .parameter_str("base_url")
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
            .to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ModelError::config(
                "base_url",
                "must be an http(s) URL",
                Some(&base_url),
                Some("http://host:port"),
            )
            .with_model(&cfg.name));
        }
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| ModelError::initialization(Some("http client"), e).with_model(&cfg.name))?;
        Ok(Self {
            name: cfg.name.clone(),
            http,
            base_url,
            model,
            temperature: cfg.inference.temperature.unwrap_or(0.0),
            max_tokens: cfg.inference.max_tokens.unwrap_or(512),
            system_prompt: cfg.inference.system_prompt.clone(),
        })
    }

    fn request_body(&self, image: &InvoiceImage, prompt: &str) -> serde_json::Value {
        let encoded = base64::engine::general_purpose::STANDARD.encode(image.bytes.as_slice());
        let mut messages = Vec::new();
        if let Some(system) = &self.system_prompt {
            messages.push(json!({ "role": "system", "content": system }));
        }
        messages.push(json!({
            "role": "user",
            "content": prompt,
            "images": [encoded],
        }));
        json!({
            "model": self.model,
            "messages": messages,
            "stream": false,
            "options": {
                "temperature": self.temperature,
                "num_predict": self.max_tokens,
            }
        })
    }

    async fn call(&self, image: &InvoiceImage, prompt: &str) -> Result<ModelOutput, ModelError> {
        let url = format!("{}/api/chat", self.base_url);
        check_outbound(&url).map_err(|e| ModelError::network(e).with_model(&self.name))?;

        let started = Instant::now();
        let resp = self
            .http
            .post(&url)
            .json(&self.request_body(image, prompt))
            .send()
            .await
            .map_err(|e| {
                ModelError::network(format!("request failed: {}", e)).with_model(&self.name)
            })?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(ModelError::network(format!("Ollama API error {}: {}", status, text))
                .with_model(&self.name)
                .with_status(status.as_u16()));
        }

        let body: serde_json::Value = resp.json().await.map_err(|e| {
            ModelError::response(format!("invalid JSON from Ollama: {}", e)).with_model(&self.name)
        })?;
        let text = body
            .pointer("/message/content")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                ModelError::response("response has no message.content").with_model(&self.name)
            })?
            .to_string();

        Ok(ModelOutput {
            text,
            model: self.model.clone(),
            provider: "ollama".to_string(),
            elapsed_ms: started.elapsed().as_millis() as u64,
            meta: json!({
                "eval_count": body.get("eval_count"),
                "total_duration": body.get("total_duration"),
            }),
        })
    }
}

#[async_trait]
impl ExtractionModel for OllamaVisionModel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn extract(&self, image: &InvoiceImage, prompt: &str) -> Result<ModelOutput, ModelError> {
        let span = tracing::info_span!(
            "ollama.chat",
            model = %self.model,
            invoice_id = %image.invoice_id,
            image_bytes = image.bytes.len()
        );
        self.call(image, prompt).instrument(span).await
    }

    fn provider_name(&self) -> &'static str {
        "ollama"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigSection;
    use crate::models::fake::test_image;
    use crate::models::network::NetworkPolicyGuard;
    use crate::models::ModelErrorKind;
    use serial_test::serial;

    fn config(yaml: &str) -> ModelConfig {
        ModelConfig::from_value(serde_yaml::from_str(yaml).unwrap(), "test").unwrap()
    }

    #[test]
    fn requires_model_parameter() {
        let err = OllamaVisionModel::from_config(&config("name: o\ntype: ollama\nparameters: {}\n"))
            .unwrap_err();
        assert_eq!(err.kind, ModelErrorKind::Config);
        assert!(err.to_string().starts_with("[o] Invalid configuration parameter 'model'"));
    }

    #[test]
    fn body_carries_image_and_options() {
        let m = OllamaVisionModel::from_config(&config(
            "name: o\ntype: ollama\nparameters:\n  model: llava\n  base_url: http://host:1/\ninference:\n  temperature: 0.2\n  max_tokens: 64\n  system_prompt: be terse\n",
        ))
        .unwrap();
        assert_eq!(m.base_url, "http://host:1");
        let body = m.request_body(&test_image("7"), "extract");
        assert_eq!(body["model"], "llava");
        assert_eq!(body["stream"], false);
        assert_eq!(body["options"]["num_predict"], 64);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "extract");
        assert_eq!(body["messages"][1]["images"][0], "AQID");
    }

    #[tokio::test]
    #[serial(network_policy)]
    async fn deny_policy_blocks_before_request() {
        std::env::remove_var(crate::models::network::POLICY_ENV);
        let _guard = NetworkPolicyGuard::deny("test deny");
        let m = OllamaVisionModel::from_config(&config(
            "name: o\ntype: ollama\nparameters:\n  model: llava\n",
        ))
        .unwrap();
        let err = m.extract(&test_image("1"), "p").await.unwrap_err();
        assert_eq!(err.kind, ModelErrorKind::Network);
        assert!(err.message.contains("outbound network blocked by policy"));
    }
}
