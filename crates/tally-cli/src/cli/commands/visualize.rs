use crate::cli::args::VisualizeArgs;
use crate::exit_codes;
use anyhow::Context;
use tally_core::data::GroundTruthManager;
use tally_core::evaluation::{EvaluationError, ResultsManager};
use tally_core::report::svg::ModelMetrics;
use tally_core::report::{write_all_charts, ChartInputs};

pub fn run(args: VisualizeArgs) -> anyhow::Result<i32> {
    let results = ResultsManager::new(&args.results_dir);
    let models = if args.models.is_empty() {
        results.list_models()?
    } else {
        args.models.clone()
    };

    let mut runs = Vec::new();
    let mut comparison = ModelMetrics::new();
    for model in &models {
        match results.load_run(model) {
            Ok(run) => {
                comparison.insert(model.clone(), run.metrics.clone());
                runs.push(run);
            }
            Err(EvaluationError::NoResults(_)) => {
                tracing::warn!(model = %model, "no run.json; skipping");
                if let Ok(metrics) = results.load_results(model) {
                    comparison.insert(model.clone(), metrics);
                }
            }
            Err(e) => return Err(e).with_context(|| format!("loading run for {}", model)),
        }
    }

    let table = match &args.data_dir {
        Some(dir) => {
            let manager = GroundTruthManager::new(dir.join("ground_truth.csv"), None, false)?;
            Some(manager.load_ground_truth()?)
        }
        None => None,
    };

    if runs.is_empty() && comparison.is_empty() && table.is_none() {
        eprintln!("Nothing to chart: no results in {}", args.results_dir.display());
        return Ok(exit_codes::EVAL_FAILED);
    }

    let written = write_all_charts(
        &args.out,
        ChartInputs {
            runs: &runs,
            comparison: Some(&comparison),
            ground_truth: table.as_ref(),
        },
    )?;
    for path in &written {
        println!("{}", path.display());
    }
    eprintln!(
        "Wrote {} chart{} to {}",
        written.len(),
        if written.len() != 1 { "s" } else { "" },
        args.out.display()
    );
    Ok(exit_codes::OK)
}
