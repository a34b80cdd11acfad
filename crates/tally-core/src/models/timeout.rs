use super::errors::ModelError;
use std::future::Future;
use std::time::Duration;

/// Bound an inference call; elapsed time becomes `ModelError::timeout`.
pub async fn with_timeout<T, F>(
    seconds: f64,
    image_path: Option<&str>,
    fut: F,
) -> Result<T, ModelError>
where
    F: Future<Output = Result<T, ModelError>>,
{
    match tokio::time::timeout(duration(seconds), fut).await {
        Ok(result) => result,
        Err(_) => Err(ModelError::timeout(
            seconds,
            image_path,
            "model did not respond in time",
        )),
    }
}

/// Bound model construction; elapsed time becomes a loader timeout.
pub async fn load_with_timeout<T, F>(seconds: f64, fut: F) -> Result<T, ModelError>
where
    F: Future<Output = Result<T, ModelError>>,
{
    match tokio::time::timeout(duration(seconds), fut).await {
        Ok(result) => result,
        Err(_) => Err(ModelError::loader_timeout(seconds, "model loading did not finish")),
    }
}

fn duration(seconds: f64) -> Duration {
    if seconds.is_finite() && seconds > 0.0 {
        Duration::from_secs_f64(seconds)
    } else {
        Duration::ZERO
    }
}
