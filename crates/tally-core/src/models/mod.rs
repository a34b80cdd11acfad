pub mod errors;
pub mod factory;
pub mod fake;
pub mod network;
pub mod ollama;
pub mod recovery;
pub mod resources;
pub mod retry;
pub mod timeout;
pub mod traced;

pub use errors::{ModelError, ModelErrorKind};
pub use factory::ModelFactory;
pub use retry::{with_retry, RetryPolicy};
pub use timeout::with_timeout;

use crate::data::InvoiceImage;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Raw text returned by a model for one invoice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelOutput {
    pub text: String,
    pub model: String,
    pub provider: String,
    pub elapsed_ms: u64,
    #[serde(default)]
    pub meta: serde_json::Value,
}

#[async_trait]
pub trait ExtractionModel: Send + Sync {
    fn name(&self) -> &str;

    async fn extract(&self, image: &InvoiceImage, prompt: &str) -> Result<ModelOutput, ModelError>;

    fn provider_name(&self) -> &'static str;
}
