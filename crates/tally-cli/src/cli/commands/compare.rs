use crate::cli::args::{CompareArgs, ReportFormat};
use crate::exit_codes;
use std::sync::Arc;
use tally_core::config::evaluation::OutputFormat;
use tally_core::evaluation::{EvaluationService, MetricsCalculator, ResultsManager};
use tally_core::report::console::print_comparison;
use tally_core::report::json::comparison_json;

pub fn run(args: CompareArgs) -> anyhow::Result<i32> {
    let results = ResultsManager::new(&args.results_dir);
    let models = if args.models.is_empty() {
        results.list_models()?
    } else {
        args.models.clone()
    };
    let service = EvaluationService::new(
        Arc::new(MetricsCalculator::default()),
        results,
        Vec::new(),
        OutputFormat::Json,
    )?;
    let comparison = service.compare_models(&models)?;
    if comparison.is_empty() {
        eprintln!(
            "No results found in {} for: {}",
            args.results_dir.display(),
            if models.is_empty() { "<none>".to_string() } else { models.join(", ") }
        );
        return Ok(exit_codes::EVAL_FAILED);
    }

    match args.format {
        ReportFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&comparison_json(&comparison))?
        ),
        ReportFormat::Text => print_comparison(&comparison),
    }
    Ok(exit_codes::OK)
}
