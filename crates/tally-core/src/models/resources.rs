use super::ModelError;
use std::any::Any;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

type Release = Box<dyn FnOnce() + Send>;

struct Entry {
    value: Arc<dyn Any + Send + Sync>,
    release: Option<Release>,
}

/// Named resources a model holds (clients, buffers, handles) with an
/// optional release hook each.
#[derive(Default)]
pub struct ResourceManager {
    entries: Mutex<BTreeMap<String, Entry>>,
}

impl ResourceManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: Any + Send + Sync>(
        &self,
        name: &str,
        value: T,
        release: Option<Release>,
    ) -> Result<Arc<T>, ModelError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if entries.contains_key(name) {
            return Err(ModelError::resource(None, Some(name), "already registered"));
        }
        let value = Arc::new(value);
        entries.insert(
            name.to_string(),
            Entry {
                value: value.clone(),
                release,
            },
        );
        Ok(value)
    }

    pub fn get<T: Any + Send + Sync>(&self, name: &str) -> Result<Arc<T>, ModelError> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let entry = entries
            .get(name)
            .ok_or_else(|| ModelError::resource(None, Some(name), "not registered"))?;
        entry
            .value
            .clone()
            .downcast::<T>()
            .map_err(|_| ModelError::resource(None, Some(name), "has a different type"))
    }

    pub fn release(&self, name: &str) -> bool {
        let entry = self
            .entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(name);
        match entry {
            Some(Entry { release, .. }) => {
                if let Some(f) = release {
                    f();
                }
                tracing::debug!(resource = name, "released");
                true
            }
            None => false,
        }
    }

    pub fn release_all(&self) {
        let drained = std::mem::take(&mut *self.entries.lock().unwrap_or_else(|e| e.into_inner()));
        for (name, entry) in drained.into_iter().rev() {
            if let Some(f) = entry.release {
                f();
            }
            tracing::debug!(resource = %name, "released");
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect()
    }
}

impl Drop for ResourceManager {
    fn drop(&mut self) {
        self.release_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn typed_lookup_and_release_hooks() {
        let released = Arc::new(AtomicUsize::new(0));
        let rm = ResourceManager::new();
        let r = released.clone();
        rm.register("buffer", vec![0u8; 4], Some(Box::new(move || {
            r.fetch_add(1, Ordering::SeqCst);
        })))
        .unwrap();
        assert_eq!(rm.get::<Vec<u8>>("buffer").unwrap().len(), 4);
        assert!(rm.get::<String>("buffer").is_err());
        assert!(rm.register("buffer", 1u32, None).is_err());
        assert!(rm.release("buffer"));
        assert!(!rm.release("buffer"));
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn drop_releases_everything() {
        let released = Arc::new(AtomicUsize::new(0));
        {
            let rm = ResourceManager::new();
            for name in ["a", "b"] {
                let r = released.clone();
                rm.register(name, name.to_string(), Some(Box::new(move || {
                    r.fetch_add(1, Ordering::SeqCst);
                })))
                .unwrap();
            }
            assert_eq!(rm.names(), vec!["a", "b"]);
        }
        assert_eq!(released.load(Ordering::SeqCst), 2);
    }
}
