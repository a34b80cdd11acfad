//! Process exit codes of the `tally` binary. Scripts depend on these values.

use tally_core::config::ConfigError;
use tally_core::data::DataError;
use tally_core::evaluation::EvaluationError;
use tally_core::models::{ModelError, ModelErrorKind};
use tally_core::prompts::PromptError;
use tally_core::TallyError;

pub const OK: i32 = 0;
/// Validation failed or no invoice could be evaluated.
pub const EVAL_FAILED: i32 = 1;
pub const CONFIG_ERROR: i32 = 2;
/// Filesystem, network or model backend failure.
pub const INFRA_ERROR: i32 = 3;

/// Exit code for an error that escaped a command.
pub fn from_error(err: &anyhow::Error) -> i32 {
    for cause in err.chain() {
        if let Some(code) = code_for(cause) {
            return code;
        }
    }
    INFRA_ERROR
}

fn code_for(cause: &(dyn std::error::Error + 'static)) -> Option<i32> {
    if cause.is::<ConfigError>() || cause.is::<PromptError>() {
        return Some(CONFIG_ERROR);
    }
    if cause.is::<DataError>() {
        return Some(EVAL_FAILED);
    }
    if let Some(e) = cause.downcast_ref::<ModelError>() {
        return Some(model_error_code(e));
    }
    if let Some(e) = cause.downcast_ref::<EvaluationError>() {
        return Some(match e {
            EvaluationError::UnsupportedMetric(_)
            | EvaluationError::DuplicateMetric(_)
            | EvaluationError::InvalidModelName(_) => CONFIG_ERROR,
            EvaluationError::NoResults(_) | EvaluationError::Data(_) => EVAL_FAILED,
            _ => INFRA_ERROR,
        });
    }
    if let Some(e) = cause.downcast_ref::<TallyError>() {
        return Some(if e.is_config() {
            CONFIG_ERROR
        } else {
            INFRA_ERROR
        });
    }
    None
}

pub fn model_error_code(err: &ModelError) -> i32 {
    match err.kind {
        ModelErrorKind::Config | ModelErrorKind::Input => CONFIG_ERROR,
        ModelErrorKind::Creation if err.message.contains("Unsupported model type") => CONFIG_ERROR,
        _ => INFRA_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn config_errors_map_through_context() {
        let err = Err::<(), _>(ConfigError::new("bad yaml"))
            .context("loading models/x.yaml")
            .unwrap_err();
        assert_eq!(from_error(&err), CONFIG_ERROR);
    }

    #[test]
    fn data_and_unknown_errors() {
        let err = anyhow::Error::new(DataError::Validation("no images".into()));
        assert_eq!(from_error(&err), EVAL_FAILED);
        assert_eq!(from_error(&anyhow::anyhow!("disk full")), INFRA_ERROR);
    }

    #[test]
    fn model_errors_split_by_kind() {
        assert_eq!(model_error_code(&ModelError::network("refused")), INFRA_ERROR);
        let unsupported = ModelError::creation(
            Some("gpt"),
            "Unsupported model type: gpt. Available types: fake",
        );
        assert_eq!(model_error_code(&unsupported), CONFIG_ERROR);
    }

    #[test]
    fn unsafe_model_name_is_a_config_error() {
        let err = anyhow::Error::new(EvaluationError::InvalidModelName("../x".into()));
        assert_eq!(from_error(&err), CONFIG_ERROR);
    }
}
