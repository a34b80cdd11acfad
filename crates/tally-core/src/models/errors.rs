use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelErrorKind {
    Initialization,
    Config,
    Resource,
    Processing,
    Input,
    Timeout,
    Creation,
    LoaderTimeout,
    Network,
    /// The provider answered but the payload was unusable.
    Response,
}

impl ModelErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ModelErrorKind::Initialization => "initialization",
            ModelErrorKind::Config => "config",
            ModelErrorKind::Resource => "resource",
            ModelErrorKind::Processing => "processing",
            ModelErrorKind::Input => "input",
            ModelErrorKind::Timeout => "timeout",
            ModelErrorKind::Creation => "creation",
            ModelErrorKind::LoaderTimeout => "loader_timeout",
            ModelErrorKind::Network => "network",
            ModelErrorKind::Response => "response",
        }
    }
}

/// Error raised anywhere in the model layer. The rendered message is
/// prefixed with the model name, or `[model]` when none is known.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelError {
    pub kind: ModelErrorKind,
    pub message: String,
    pub model_name: Option<String>,
    pub image_path: Option<String>,
    pub stage: Option<String>,
    pub timeout_seconds: Option<f64>,
    pub model_type: Option<String>,
    pub status: Option<u16>,
}

impl ModelError {
    pub fn new(kind: ModelErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            model_name: None,
            image_path: None,
            stage: None,
            timeout_seconds: None,
            model_type: None,
            status: None,
        }
    }

    pub fn with_model(mut self, name: impl Into<String>) -> Self {
        self.model_name = Some(name.into());
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn initialization(component: Option<&str>, message: impl fmt::Display) -> Self {
        let component = component
            .map(|c| format!(" in component '{}'", c))
            .unwrap_or_default();
        Self::new(
            ModelErrorKind::Initialization,
            format!("Initialization failed{}: {}", component, message),
        )
    }

    pub fn config(
        parameter: &str,
        message: impl fmt::Display,
        value: Option<&str>,
        expected: Option<&str>,
    ) -> Self {
        let mut text = format!("Invalid configuration parameter '{}': {}", parameter, message);
        if let Some(v) = value {
            text.push_str(&format!(". Got '{}'", v));
            if let Some(e) = expected {
                text.push_str(&format!(", expected {}", e));
            }
        }
        Self::new(ModelErrorKind::Config, text)
    }

    pub fn resource(
        resource_type: Option<&str>,
        name: Option<&str>,
        message: impl fmt::Display,
    ) -> Self {
        let info = match (resource_type, name) {
            (Some(t), Some(n)) => format!(" for {} '{}'", t, n),
            (Some(t), None) => format!(" for {}", t),
            (None, Some(n)) => format!(" for '{}'", n),
            (None, None) => String::new(),
        };
        Self::new(
            ModelErrorKind::Resource,
            format!("Resource error{}: {}", info, message),
        )
    }

    pub fn processing(
        image_path: Option<&str>,
        stage: Option<&str>,
        message: impl fmt::Display,
    ) -> Self {
        let mut err = Self::new(
            ModelErrorKind::Processing,
            format!("Processing failed{}: {}", context(image_path, stage), message),
        );
        err.image_path = image_path.map(str::to_string);
        err.stage = stage.map(str::to_string);
        err
    }

    pub fn input(name: &str, message: impl fmt::Display, value: Option<&str>) -> Self {
        let mut text = format!("Invalid input '{}': {}", name, message);
        if let Some(v) = value {
            text.push_str(&format!(". Got '{}'", v));
        }
        Self::new(ModelErrorKind::Input, text)
    }

    pub fn timeout(
        timeout_seconds: f64,
        image_path: Option<&str>,
        message: impl fmt::Display,
    ) -> Self {
        let mut err = Self::new(
            ModelErrorKind::Timeout,
            format!(
                "Processing failed{}: Timeout after {}s: {}",
                context(image_path, Some("inference")),
                timeout_seconds,
                message
            ),
        );
        err.timeout_seconds = Some(timeout_seconds);
        err.image_path = image_path.map(str::to_string);
        err.stage = Some("inference".into());
        err
    }

    pub fn loader_timeout(timeout_seconds: f64, message: impl fmt::Display) -> Self {
        let mut err = Self::new(
            ModelErrorKind::LoaderTimeout,
            format!("Model loading timed out after {}s: {}", timeout_seconds, message),
        );
        err.timeout_seconds = Some(timeout_seconds);
        err
    }

    pub fn creation(model_type: Option<&str>, message: impl fmt::Display) -> Self {
        let info = model_type
            .map(|t| format!(" (type: {})", t))
            .unwrap_or_default();
        let mut err = Self::new(
            ModelErrorKind::Creation,
            format!("Creation failed{}: {}", info, message),
        );
        err.model_type = model_type.map(str::to_string);
        err
    }

    pub fn network(message: impl fmt::Display) -> Self {
        Self::new(ModelErrorKind::Network, message.to_string())
    }

    pub fn response(message: impl fmt::Display) -> Self {
        Self::new(ModelErrorKind::Response, message.to_string())
    }
}

fn context(image_path: Option<&str>, stage: Option<&str>) -> String {
    let mut out = String::new();
    if let Some(p) = image_path {
        out.push_str(&format!(" for image '{}'", p));
    }
    if let Some(s) = stage {
        out.push_str(&format!(" during {}", s));
    }
    out
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}",
            self.model_name.as_deref().unwrap_or("model"),
            self.message
        )
    }
}

impl std::error::Error for ModelError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_context() {
        let e = ModelError::config("temperature", "must be non-negative", Some("-1"), Some(">= 0"))
            .with_model("llava");
        assert_eq!(
            e.to_string(),
            "[llava] Invalid configuration parameter 'temperature': must be non-negative. Got '-1', expected >= 0"
        );

        let e = ModelError::resource(Some("file"), Some("weights.bin"), "missing");
        assert_eq!(e.to_string(), "[model] Resource error for file 'weights.bin': missing");

        let e = ModelError::processing(Some("a.png"), Some("decode"), "bad bytes");
        assert_eq!(
            e.to_string(),
            "[model] Processing failed for image 'a.png' during decode: bad bytes"
        );
    }

    #[test]
    fn timeout_records_seconds_and_stage() {
        let e = ModelError::timeout(2.5, None, "no response");
        assert_eq!(e.kind, ModelErrorKind::Timeout);
        assert_eq!(e.timeout_seconds, Some(2.5));
        assert_eq!(
            e.to_string(),
            "[model] Processing failed during inference: Timeout after 2.5s: no response"
        );
    }

    #[test]
    fn creation_and_initialization() {
        assert_eq!(
            ModelError::creation(Some("ollama"), "unreachable").to_string(),
            "[model] Creation failed (type: ollama): unreachable"
        );
        assert_eq!(
            ModelError::initialization(Some("tokenizer"), "missing vocab").to_string(),
            "[model] Initialization failed in component 'tokenizer': missing vocab"
        );
    }
}
