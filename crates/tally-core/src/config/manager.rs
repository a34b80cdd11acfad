use super::{read_yaml, ConfigError, ConfigKind, ConfigSection};
use std::any::Any;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

type CacheEntry = Arc<dyn Any + Send + Sync>;

/// Loads and caches config sections under one root directory.
///
/// Cache keys are `"<KIND>:<name>"`, with `default` standing in for
/// the name of the single evaluation config.
#[derive(Debug)]
pub struct ConfigManager {
    root: PathBuf,
    cache: Mutex<HashMap<String, CacheEntry>>,
}

fn cache_key(kind: ConfigKind, name: Option<&str>) -> String {
    format!("{}:{}", kind, name.unwrap_or("default"))
}

impl ConfigManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_path(&self, kind: ConfigKind, name: Option<&str>) -> PathBuf {
        match kind {
            ConfigKind::Model => self
                .root
                .join("models")
                .join(format!("{}.yaml", name.unwrap_or("default"))),
            ConfigKind::Prompt => self
                .root
                .join("prompts")
                .join(format!("{}.yaml", name.unwrap_or("default"))),
            ConfigKind::Evaluation => self.root.join("evaluation.yaml"),
        }
    }

    /// Load a section, serving repeated calls from the cache.
    pub fn get<T: ConfigSection>(&self, name: Option<&str>) -> Result<Arc<T>, ConfigError> {
        let key = cache_key(T::KIND, name);
        if let Some(hit) = self.lock().get(&key).cloned() {
            if let Ok(typed) = hit.downcast::<T>() {
                tracing::debug!(%key, "config cache hit");
                return Ok(typed);
            }
        }
        let loaded = Arc::new(self.load::<T>(name)?);
        self.lock().insert(key, loaded.clone());
        Ok(loaded)
    }

    /// Load a section from disk without touching the cache.
    pub fn load<T: ConfigSection>(&self, name: Option<&str>) -> Result<T, ConfigError> {
        let path = self.config_path(T::KIND, name);
        if !path.exists() {
            return Err(ConfigError(format!(
                "{} config not found: {}",
                T::KIND.as_str().to_lowercase(),
                path.display()
            )));
        }
        let doc = read_yaml(&path)?;
        let source = path
            .strip_prefix(&self.root)
            .unwrap_or(&path)
            .display()
            .to_string();
        let section = T::from_value(doc, &source)?;
        tracing::info!(kind = %T::KIND, path = %path.display(), "loaded config");
        Ok(section)
    }

    pub fn model(&self, name: &str) -> Result<Arc<super::ModelConfig>, ConfigError> {
        self.get(Some(name))
    }

    pub fn prompts(&self, category: &str) -> Result<Arc<super::PromptConfig>, ConfigError> {
        self.get(Some(category))
    }

    pub fn evaluation(&self) -> Result<Arc<super::EvaluationConfig>, ConfigError> {
        self.get(None)
    }

    /// Names of the configs present on disk for `kind`, sorted.
    pub fn list(&self, kind: ConfigKind) -> Vec<String> {
        let dir = match kind {
            ConfigKind::Model => self.root.join("models"),
            ConfigKind::Prompt => self.root.join("prompts"),
            ConfigKind::Evaluation => {
                return if self.root.join("evaluation.yaml").exists() {
                    vec!["default".to_string()]
                } else {
                    Vec::new()
                };
            }
        };
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .into_iter()
            .flatten()
            .flatten()
            .filter_map(|e| {
                let p = e.path();
                let is_yaml = p.extension().and_then(|x| x.to_str()) == Some("yaml");
                is_yaml
                    .then(|| p.file_stem().and_then(|s| s.to_str()).map(str::to_string))
                    .flatten()
            })
            .collect();
        names.sort();
        names
    }

    /// Drop cached sections of one kind, or everything when `kind` is `None`.
    pub fn invalidate_cache(&self, kind: Option<ConfigKind>) {
        let mut cache = self.lock();
        match kind {
            Some(k) => {
                let prefix = format!("{}:", k);
                cache.retain(|key, _| !key.starts_with(&prefix));
            }
            None => cache.clear(),
        }
    }

    /// Re-read one section from disk and replace its cache entry.
    pub fn reload<T: ConfigSection>(&self, name: Option<&str>) -> Result<Arc<T>, ConfigError> {
        self.lock().remove(&cache_key(T::KIND, name));
        self.get(name)
    }

    pub fn cached_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EvaluationConfig, ModelConfig};

    fn root() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("models")).unwrap();
        std::fs::write(
            dir.path().join("models/fake.yaml"),
            "name: fake\ntype: fake\nparameters:\n  default_response: '{}'\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("evaluation.yaml"),
            "metrics: [accuracy]\ndataset:\n  path: data\noutput:\n  format: json\n",
        )
        .unwrap();
        dir
    }

    #[test]
    fn caches_by_kind_and_name() {
        let dir = root();
        let mgr = ConfigManager::new(dir.path());
        let a = mgr.model("fake").unwrap();
        let b = mgr.model("fake").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        mgr.evaluation().unwrap();
        assert_eq!(mgr.cached_keys(), vec!["EVALUATION:default", "MODEL:fake"]);

        mgr.invalidate_cache(Some(ConfigKind::Model));
        assert_eq!(mgr.cached_keys(), vec!["EVALUATION:default"]);
        mgr.invalidate_cache(None);
        assert!(mgr.cached_keys().is_empty());
    }

    #[test]
    fn reload_picks_up_changes() {
        let dir = root();
        let mgr = ConfigManager::new(dir.path());
        assert_eq!(mgr.evaluation().unwrap().metrics, vec!["accuracy"]);
        std::fs::write(
            dir.path().join("evaluation.yaml"),
            "metrics: [f1]\ndataset:\n  path: data\noutput:\n  format: json\n",
        )
        .unwrap();
        assert_eq!(mgr.evaluation().unwrap().metrics, vec!["accuracy"]);
        let fresh = mgr.reload::<EvaluationConfig>(None).unwrap();
        assert_eq!(fresh.metrics, vec!["f1"]);
    }

    #[test]
    fn missing_config_is_reported_with_path() {
        let dir = root();
        let mgr = ConfigManager::new(dir.path());
        let err = mgr.get::<ModelConfig>(Some("nope")).unwrap_err();
        assert!(err.to_string().contains("model config not found"));
        assert!(err.to_string().contains("nope.yaml"));
        assert_eq!(mgr.list(ConfigKind::Model), vec!["fake"]);
        assert_eq!(mgr.list(ConfigKind::Evaluation), vec!["default"]);
    }
}
