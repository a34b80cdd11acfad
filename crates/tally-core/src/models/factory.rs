use super::fake::FakeModel;
use super::ollama::OllamaVisionModel;
use super::retry::{with_retry, RetryPolicy};
use super::timeout::load_with_timeout;
use super::traced::TracedModel;
use super::{ExtractionModel, ModelError};
use crate::config::{ConfigManager, ModelConfig};
use std::collections::BTreeMap;
use std::sync::Arc;

pub type Constructor =
    Arc<dyn Fn(&ModelConfig) -> Result<Arc<dyn ExtractionModel>, ModelError> + Send + Sync>;

/// Maps a config `type` to a model constructor.
pub struct ModelFactory {
    registry: BTreeMap<String, Constructor>,
    policy: RetryPolicy,
}

impl Default for ModelFactory {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl ModelFactory {
    pub fn empty() -> Self {
        Self {
            registry: BTreeMap::new(),
            policy: RetryPolicy::factory(),
        }
    }

    /// Factory with the built-in `fake` and `ollama` types.
    pub fn with_defaults() -> Self {
        let mut f = Self::empty();
        let builtins: [(&str, Constructor); 2] = [
            (
                "fake",
                Arc::new(|cfg: &ModelConfig| {
                    Ok(Arc::new(FakeModel::from_config(cfg)?) as Arc<dyn ExtractionModel>)
                }),
            ),
            (
                "ollama",
                Arc::new(|cfg: &ModelConfig| {
                    Ok(Arc::new(OllamaVisionModel::from_config(cfg)?) as Arc<dyn ExtractionModel>)
                }),
            ),
        ];
        for (name, ctor) in builtins {
            f.registry.insert(name.to_string(), ctor);
        }
        f
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn register(&mut self, model_type: &str, ctor: Constructor) -> Result<(), ModelError> {
        let key = model_type.trim().to_lowercase();
        if self.registry.contains_key(&key) {
            return Err(ModelError::creation(
                Some(model_type),
                format!("Model type already registered: {}", model_type),
            ));
        }
        self.registry.insert(key, ctor);
        Ok(())
    }

    pub fn available_types(&self) -> Vec<&str> {
        self.registry.keys().map(String::as_str).collect()
    }

    /// Build a model straight from a config, without retries.
    pub fn build(&self, cfg: &ModelConfig) -> Result<Arc<dyn ExtractionModel>, ModelError> {
        let key = cfg.model_type.trim().to_lowercase();
        let ctor = self.registry.get(&key).ok_or_else(|| {
            ModelError::creation(
                Some(&cfg.model_type),
                format!(
                    "Unsupported model type: {}. Available types: {}",
                    cfg.model_type,
                    self.available_types().join(", ")
                ),
            )
            .with_model(&cfg.name)
        })?;
        let model = ctor(cfg)?;
        Ok(Arc::new(TracedModel::new(model)))
    }

    /// Load `models/<name>.yaml` and construct the model, retrying
    /// transient failures inside the config's loading timeout.
    pub async fn create_model(
        &self,
        configs: &ConfigManager,
        name: &str,
    ) -> Result<Arc<dyn ExtractionModel>, ModelError> {
        let cfg = configs.model(name).map_err(|e| {
            ModelError::creation(None, e).with_model(name)
        })?;
        let outcome = load_with_timeout(cfg.loading_timeout(), async {
            let retried = with_retry(&self.policy, |attempt| {
                let cfg = cfg.clone();
                async move {
                    tracing::debug!(model = %cfg.name, attempt, "constructing model");
                    self.build(&cfg)
                }
            })
            .await;
            retried.result
        })
        .await;
        match &outcome {
            Ok(m) => tracing::info!(model = %m.name(), provider = m.provider_name(), "model ready"),
            Err(e) => tracing::error!(model = name, error = %e, "model creation failed"),
        }
        outcome.map_err(|e| if e.model_name.is_none() { e.with_model(name) } else { e })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ModelErrorKind;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn write_model(dir: &std::path::Path, name: &str, body: &str) {
        std::fs::create_dir_all(dir.join("models")).unwrap();
        std::fs::write(dir.join("models").join(format!("{}.yaml", name)), body).unwrap();
    }

    #[tokio::test]
    async fn creates_registered_type_from_config() {
        let dir = tempfile::tempdir().unwrap();
        write_model(
            dir.path(),
            "canned",
            "name: canned\ntype: fake\nparameters:\n  default_response: '{}'\n",
        );
        let configs = ConfigManager::new(dir.path());
        let model = ModelFactory::with_defaults().create_model(&configs, "canned").await.unwrap();
        assert_eq!(model.name(), "canned");
        assert_eq!(model.provider_name(), "fake");
    }

    #[tokio::test]
    async fn unknown_type_lists_available() {
        let dir = tempfile::tempdir().unwrap();
        write_model(dir.path(), "x", "name: x\ntype: gpt\nparameters: {}\n");
        let configs = ConfigManager::new(dir.path());
        let err = ModelFactory::with_defaults()
            .with_policy(RetryPolicy::none())
            .create_model(&configs, "x")
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind, ModelErrorKind::Creation);
        assert!(err
            .to_string()
            .contains("Unsupported model type: gpt. Available types: fake, ollama"));
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut f = ModelFactory::with_defaults();
        let ctor: Constructor = Arc::new(|cfg: &ModelConfig| {
            Ok(Arc::new(FakeModel::new(cfg.name.clone())) as Arc<dyn ExtractionModel>)
        });
        let err = f.register("fake", ctor.clone()).unwrap_err();
        assert!(err.message.contains("Model type already registered: fake"));
        f.register("canned", ctor).unwrap();
        assert_eq!(f.available_types(), vec!["canned", "fake", "ollama"]);
    }

    #[tokio::test]
    async fn transient_constructor_failures_are_retried() {
        let dir = tempfile::tempdir().unwrap();
        write_model(dir.path(), "flaky", "name: flaky\ntype: flaky\nparameters: {}\n");
        let calls = Arc::new(AtomicU32::new(0));
        let seen = calls.clone();
        let mut f = ModelFactory::empty().with_policy(
            RetryPolicy::new(3, 0.0, 1.0, 0.0).unwrap(),
        );
        f.register(
            "flaky",
            Arc::new(move |cfg: &ModelConfig| {
                if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(ModelError::resource(None, None, "warming up"))
                } else {
                    Ok(Arc::new(FakeModel::new(cfg.name.clone())) as Arc<dyn ExtractionModel>)
                }
            }),
        )
        .unwrap();
        let model = f.create_model(&ConfigManager::new(dir.path()), "flaky").await.unwrap();
        assert_eq!(model.name(), "flaky");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
