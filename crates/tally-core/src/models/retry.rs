use super::errors::{ModelError, ModelErrorKind};
use crate::config::model::RetrySettings;
use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

/// Exponential backoff policy for model calls.
///
/// An error is retried only while attempts remain. Non-retryable kinds win
/// over retryable ones, and an empty retryable set means every kind that is
/// not explicitly excluded may be retried.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay_seconds: f64,
    pub backoff_factor: f64,
    pub max_delay_seconds: f64,
    pub retryable: HashSet<ModelErrorKind>,
    pub non_retryable: HashSet<ModelErrorKind>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay_seconds: 1.0,
            backoff_factor: 2.0,
            max_delay_seconds: 30.0,
            retryable: HashSet::new(),
            non_retryable: [ModelErrorKind::Config, ModelErrorKind::Input]
                .into_iter()
                .collect(),
        }
    }
}

impl RetryPolicy {
    pub fn new(
        max_attempts: u32,
        delay_seconds: f64,
        backoff_factor: f64,
        max_delay_seconds: f64,
    ) -> Result<Self, ModelError> {
        let policy = Self {
            max_attempts,
            delay_seconds,
            backoff_factor,
            max_delay_seconds,
            ..Self::default()
        };
        policy.validate()?;
        Ok(policy)
    }

    pub fn from_settings(s: &RetrySettings) -> Result<Self, ModelError> {
        Self::new(
            s.max_attempts,
            s.delay_seconds,
            s.backoff_factor,
            s.max_delay_seconds,
        )
    }

    /// Policy used while constructing models: two attempts, and bad
    /// configuration is never retried.
    pub fn factory() -> Self {
        Self {
            max_attempts: 2,
            delay_seconds: 1.0,
            backoff_factor: 2.0,
            max_delay_seconds: 10.0,
            retryable: HashSet::new(),
            non_retryable: [ModelErrorKind::Config, ModelErrorKind::Creation]
                .into_iter()
                .collect(),
        }
    }

    /// A single attempt, no waiting.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            delay_seconds: 0.0,
            max_delay_seconds: 0.0,
            ..Self::default()
        }
    }

    pub fn retry_on(mut self, kinds: &[ModelErrorKind]) -> Self {
        self.retryable.extend(kinds.iter().copied());
        self
    }

    pub fn never_retry(mut self, kinds: &[ModelErrorKind]) -> Self {
        self.non_retryable.extend(kinds.iter().copied());
        self
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        if self.max_attempts < 1 {
            return Err(ModelError::config(
                "max_attempts",
                "must be at least 1",
                Some(&self.max_attempts.to_string()),
                Some(">= 1"),
            ));
        }
        if self.delay_seconds.is_nan() || self.delay_seconds < 0.0 {
            return Err(ModelError::config(
                "delay",
                "must be non-negative",
                Some(&self.delay_seconds.to_string()),
                Some(">= 0"),
            ));
        }
        if self.backoff_factor.is_nan() || self.backoff_factor < 1.0 {
            return Err(ModelError::config(
                "backoff_factor",
                "must be at least 1",
                Some(&self.backoff_factor.to_string()),
                Some(">= 1"),
            ));
        }
        if self.max_delay_seconds.is_nan() || self.max_delay_seconds < self.delay_seconds {
            return Err(ModelError::config(
                "max_delay",
                "must be greater than or equal to delay",
                Some(&self.max_delay_seconds.to_string()),
                Some(&format!(">= {}", self.delay_seconds)),
            ));
        }
        Ok(())
    }

    /// `attempt` is the 1-based number of the attempt that just failed.
    pub fn should_retry(&self, error: &ModelError, attempt: u32) -> bool {
        if attempt >= self.max_attempts {
            return false;
        }
        if self.non_retryable.contains(&error.kind) {
            return false;
        }
        self.retryable.is_empty() || self.retryable.contains(&error.kind)
    }

    /// Wait before `attempt` (1-based). The first attempt never waits.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let exp = i32::try_from(attempt - 2).unwrap_or(i32::MAX);
        let secs = (self.delay_seconds * self.backoff_factor.powi(exp)).min(self.max_delay_seconds);
        Duration::from_secs_f64(secs.max(0.0))
    }
}

/// Outcome of a retried operation plus how many attempts it took.
#[derive(Debug)]
pub struct Retried<T> {
    pub result: Result<T, ModelError>,
    pub attempts: u32,
}

/// Run `op` until it succeeds or the policy gives up.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Retried<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, ModelError>>,
{
    let mut attempt = 1;
    loop {
        let wait = policy.delay_for(attempt);
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
        match op(attempt).await {
            Ok(v) => {
                return Retried {
                    result: Ok(v),
                    attempts: attempt,
                }
            }
            Err(e) if policy.should_retry(&e, attempt) => {
                tracing::warn!(
                    attempt,
                    kind = e.kind.as_str(),
                    error = %e,
                    "retrying after failure"
                );
                attempt += 1;
            }
            Err(e) => {
                return Retried {
                    result: Err(e),
                    attempts: attempt,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, 0.0, 1.0, 0.0).unwrap()
    }

    #[test]
    fn validation_rules() {
        assert!(RetryPolicy::new(0, 1.0, 2.0, 30.0).is_err());
        assert!(RetryPolicy::new(1, -1.0, 2.0, 30.0).is_err());
        assert!(RetryPolicy::new(1, 1.0, 0.5, 30.0).is_err());
        let err = RetryPolicy::new(1, 5.0, 2.0, 1.0).unwrap_err();
        assert!(err.to_string().contains("'max_delay'"));
        assert!(RetryPolicy::new(1, 0.0, 1.0, 0.0).is_ok());
    }

    #[test]
    fn delays_grow_and_cap() {
        let p = RetryPolicy::default();
        assert_eq!(p.delay_for(1), Duration::ZERO);
        assert_eq!(p.delay_for(2), Duration::from_secs(1));
        assert_eq!(p.delay_for(3), Duration::from_secs(2));
        assert_eq!(p.delay_for(4), Duration::from_secs(4));
        assert_eq!(p.delay_for(10), Duration::from_secs(30));
    }

    #[test]
    fn non_retryable_wins() {
        let p = RetryPolicy::factory().retry_on(&[ModelErrorKind::Config, ModelErrorKind::Network]);
        assert!(!p.should_retry(&ModelError::config("x", "bad", None, None), 1));
        assert!(p.should_retry(&ModelError::network("down"), 1));
        assert!(!p.should_retry(&ModelError::network("down"), 2));
        assert!(!p.should_retry(&ModelError::response("junk"), 1));
    }

    #[test]
    fn empty_retryable_set_retries_everything_else() {
        let p = RetryPolicy::default();
        assert!(p.should_retry(&ModelError::response("junk"), 1));
        assert!(p.should_retry(&ModelError::timeout(1.0, None, "slow"), 2));
        assert!(!p.should_retry(&ModelError::timeout(1.0, None, "slow"), 3));
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let out = with_retry(&fast(3), |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 3 {
                    Err(ModelError::network("flaky"))
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;
        assert_eq!(out.result.unwrap(), 3);
        assert_eq!(out.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn stops_on_non_retryable_error() {
        let out: Retried<()> =
            with_retry(&fast(5), |_| async {
                Err(ModelError::input("image", "empty", None))
            })
            .await;
        assert_eq!(out.attempts, 1);
        assert_eq!(out.result.unwrap_err().kind, ModelErrorKind::Input);
    }
}
