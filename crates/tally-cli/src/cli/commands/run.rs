use crate::cli::args::RunArgs;
use crate::exit_codes;
use anyhow::Context;
use std::path::PathBuf;
use std::sync::Arc;
use tally_core::config::evaluation::OutputFormat;
use tally_core::config::{ConfigKind, ConfigManager, EvaluationConfig};
use tally_core::data::DataLoader;
use tally_core::evaluation::{
    EvaluationService, MetricsCalculator, ResultsManager, Runner, RunnerConfig,
};
use tally_core::models::resources::ResourceManager;
use tally_core::models::{ExtractionModel, ModelFactory, RetryPolicy};
use tally_core::parsing::ParserRegistry;
use tally_core::prompts::{FormatterRegistry, PromptFactory};
use tally_core::report::console::{default_progress_sink, print_summary};
use tally_core::Diagnostic;

const DEFAULT_RESULTS_DIR: &str = "results";
const DEFAULT_CONCURRENCY: usize = 4;

pub(crate) async fn run(args: RunArgs) -> anyhow::Result<i32> {
    let configs = Arc::new(ConfigManager::new(&args.config_root));

    let model_config = match configs.model(&args.model) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}", Diagnostic::from_config_error(&e, "model"));
            return Ok(exit_codes::CONFIG_ERROR);
        }
    };
    let evaluation = match load_evaluation(&configs) {
        Ok(e) => e,
        Err(e) => {
            eprintln!("{}", Diagnostic::from_config_error(&e, "evaluation"));
            return Ok(exit_codes::CONFIG_ERROR);
        }
    };

    let Some(data_dir) = args
        .data_dir
        .clone()
        .or_else(|| evaluation.as_ref().map(|e| e.dataset.path.clone()))
    else {
        eprintln!("config error: no data directory. Pass --data-dir, set TALLY_DATA_DIR or dataset.path in evaluation.yaml");
        return Ok(exit_codes::CONFIG_ERROR);
    };
    let dataset = evaluation.as_ref().map(|e| &e.dataset);
    let loader = match DataLoader::new(
        &data_dir,
        dataset.and_then(|d| d.images.clone()),
        dataset.and_then(|d| d.ground_truth.clone()),
        true,
    ) {
        Ok(l) => Arc::new(l),
        Err(e) => {
            eprintln!("{}", Diagnostic::from_data_error(&e, "dataset"));
            return Ok(exit_codes::EVAL_FAILED);
        }
    };

    let service = build_service(&args, evaluation.as_deref())?;

    let resources = ResourceManager::new();
    let model = match ModelFactory::with_defaults()
        .create_model(&configs, &args.model)
        .await
    {
        Ok(m) => m,
        Err(e) => {
            eprintln!("model error: {}", e);
            return Ok(exit_codes::model_error_code(&e));
        }
    };
    let model_name = model.name().to_string();
    let model = resources.register(
        "model",
        model,
        Some(Box::new(move || tracing::debug!(model = %model_name, "model released"))),
    )?;

    let cfg = RunnerConfig {
        prompt_category: args.prompt_category.clone(),
        prompt_name: args.prompt.clone(),
        field_types: args
            .field
            .map(|f| f.field_types())
            .or_else(|| evaluation.as_ref().map(|e| e.fields.clone()))
            .unwrap_or_default(),
        concurrency: args
            .concurrency
            .or_else(|| evaluation.as_ref().map(|e| e.concurrency))
            .unwrap_or(DEFAULT_CONCURRENCY)
            .max(1),
        limit: args.limit.or_else(|| dataset.and_then(|d| d.limit)),
        metrics: service.metric_names().map(<[String]>::to_vec),
        order_seed: args.seed,
    };

    let runner = Runner {
        loader: loader.clone(),
        model: Arc::clone(&*model),
        model_config: model_config.clone(),
        prompts: PromptFactory::new(configs.clone()),
        formatters: Arc::new(FormatterRegistry::default()),
        parser: ParserRegistry::default().default_parser()?,
        calculator: service.calculator().clone(),
        retry: RetryPolicy::from_settings(&model_config.retry)?,
    };

    let available = loader
        .get_available_invoice_ids()
        .context("listing invoices")?
        .len();
    let total = cfg.limit.map_or(available, |l| l.min(available));
    eprintln!(
        "Running {} invoice{} with model {}...",
        total,
        if total != 1 { "s" } else { "" },
        args.model
    );
    let progress = default_progress_sink(total);
    let report = runner.run(&cfg, progress).await;
    resources.release_all();
    let report = report?;

    print_summary(&report);
    let written = service
        .record_run(&report)
        .with_context(|| format!("saving results for {}", report.model))?;
    for path in &written {
        eprintln!("Wrote {}", path.display());
    }

    if report.summary.total > 0 && report.summary.succeeded == 0 {
        eprintln!("✖ No invoice was extracted successfully");
        return Ok(exit_codes::EVAL_FAILED);
    }
    Ok(exit_codes::OK)
}

/// `evaluation.yaml` is optional; a present but broken file is an error.
fn load_evaluation(
    configs: &ConfigManager,
) -> Result<Option<Arc<EvaluationConfig>>, tally_core::config::ConfigError> {
    if !configs.config_path(ConfigKind::Evaluation, None).is_file() {
        tracing::info!(root = %configs.root().display(), "no evaluation.yaml; using defaults");
        return Ok(None);
    }
    configs.evaluation().map(Some)
}

fn build_service(
    args: &RunArgs,
    evaluation: Option<&EvaluationConfig>,
) -> anyhow::Result<EvaluationService> {
    let calculator = Arc::new(MetricsCalculator::new(tally_metrics::default_metrics())?);
    let (metric_names, format, results_dir) = match evaluation {
        Some(e) => (e.metrics.clone(), e.output.format, e.output.results_dir.clone()),
        None => (Vec::new(), OutputFormat::Json, PathBuf::from(DEFAULT_RESULTS_DIR)),
    };
    let service = EvaluationService::new(
        calculator,
        ResultsManager::new(args.results_dir.clone().unwrap_or(results_dir)),
        metric_names,
        args.format.map(OutputFormat::from).unwrap_or(format),
    )?;
    Ok(service)
}
