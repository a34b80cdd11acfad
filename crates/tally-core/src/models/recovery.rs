use super::ModelError;

type Action = Box<dyn FnOnce() -> Result<(), ModelError> + Send>;

/// Cleanup actions run in reverse registration order when a model
/// fails partway through setup.
#[derive(Default)]
pub struct RecoveryManager {
    actions: Vec<(String, Action)>,
}

impl RecoveryManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, label: impl Into<String>, action: F)
    where
        F: FnOnce() -> Result<(), ModelError> + Send + 'static,
    {
        self.actions.push((label.into(), Box::new(action)));
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Run every action newest-first. Failures are logged and the
    /// remaining actions still run; the failed labels are returned.
    pub fn recover(&mut self) -> Vec<String> {
        let mut failed = Vec::new();
        while let Some((label, action)) = self.actions.pop() {
            if let Err(e) = action() {
                tracing::error!(action = %label, error = %e, "recovery action failed");
                failed.push(label);
            } else {
                tracing::debug!(action = %label, "recovery action ran");
            }
        }
        failed
    }

    pub fn clear(&mut self) {
        self.actions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn runs_lifo_and_continues_past_failures() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut rm = RecoveryManager::new();
        for label in ["first", "second", "third"] {
            let order = order.clone();
            rm.register(label, move || {
                order.lock().unwrap().push(label);
                if label == "second" {
                    Err(ModelError::resource(None, Some(label), "busy"))
                } else {
                    Ok(())
                }
            });
        }
        let failed = rm.recover();
        assert_eq!(*order.lock().unwrap(), vec!["third", "second", "first"]);
        assert_eq!(failed, vec!["second".to_string()]);
        assert!(rm.is_empty());
    }
}
