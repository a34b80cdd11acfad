use super::{ExtractionModel, ModelError, ModelOutput};
use crate::data::InvoiceImage;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info_span, Instrument};

/// Wraps a model so every call runs inside a `model.extract` span.
pub struct TracedModel {
    inner: Arc<dyn ExtractionModel>,
}

impl TracedModel {
    pub fn new(inner: Arc<dyn ExtractionModel>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl ExtractionModel for TracedModel {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn extract(&self, image: &InvoiceImage, prompt: &str) -> Result<ModelOutput, ModelError> {
        let span = info_span!(
            "model.extract",
            model = self.inner.name(),
            provider = self.inner.provider_name(),
            invoice_id = image.invoice_id.as_str(),
            prompt_chars = prompt.len(),
            elapsed_ms = tracing::field::Empty,
            error = tracing::field::Empty
        );
        let started = Instant::now();
        let result = self
            .inner
            .extract(image, prompt)
            .instrument(span.clone())
            .await;
        span.record("elapsed_ms", started.elapsed().as_millis() as u64);
        match &result {
            Ok(out) => {
                tracing::debug!(parent: &span, chars = out.text.len(), "model responded")
            }
            Err(e) => {
                span.record("error", tracing::field::display(e));
            }
        }
        result
    }

    fn provider_name(&self) -> &'static str {
        self.inner.provider_name()
    }
}
