use crate::cli::args::{ReportFormat, ValidateArgs};
use crate::exit_codes;
use serde_json::json;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tally_core::data::utils::{validate_image_directory, ImageDirectoryStats};
use tally_core::data::validators::{
    BatchReport, GroundTruthValidator, ImageValidator, ValidationStatistics,
};
use tally_core::data::{loader::is_image_path, DataError, Table};
use tally_core::errors::diagnostic::codes;
use tally_core::fields::INVOICE_FIELD;
use tally_core::Diagnostic;

const GROUND_TRUTH_FILE: &str = "ground_truth.csv";

#[derive(Debug, Default)]
struct ValidateReport {
    diagnostics: Vec<Diagnostic>,
    ground_truth: Option<ValidationStatistics>,
    images: Option<ImageDirectoryStats>,
    image_batch: Option<BatchReport>,
}

pub fn run(args: ValidateArgs) -> anyhow::Result<i32> {
    let report = validate_dataset(&args.data_dir, args.strict);
    let exit_code = if report.diagnostics.iter().any(Diagnostic::is_error) {
        exit_codes::EVAL_FAILED
    } else {
        exit_codes::OK
    };
    print_report(&report, &args, exit_code)?;
    Ok(exit_code)
}

fn validate_dataset(data_dir: &Path, strict: bool) -> ValidateReport {
    let mut report = ValidateReport::default();

    let gt_path = data_dir.join(GROUND_TRUTH_FILE);
    let mut gt_ids = BTreeSet::new();
    if !gt_path.is_file() {
        report.diagnostics.push(Diagnostic::from_data_error(
            &DataError::GroundTruthNotFound(gt_path),
            "ground_truth",
        ));
    } else {
        match Table::from_path(&gt_path) {
            Ok(table) => {
                let mut validator = GroundTruthValidator::new(None, strict);
                let stats = validator.validation_statistics(&table);
                for msg in &stats.errors {
                    report.diagnostics.push(
                        Diagnostic::from_data_error(
                            &DataError::GroundTruth(msg.clone()),
                            "ground_truth",
                        )
                        .with_context(json!({ "file": gt_path })),
                    );
                }
                for msg in &stats.warnings {
                    report.diagnostics.push(
                        Diagnostic::warning(codes::W_GT_FORMAT, msg.clone())
                            .with_source("ground_truth"),
                    );
                }
                gt_ids = table
                    .column(INVOICE_FIELD)
                    .into_iter()
                    .flatten()
                    .map(str::to_string)
                    .collect();
                report.ground_truth = Some(stats);
            }
            Err(e) => report.diagnostics.push(Diagnostic::from_data_error(
                &DataError::GroundTruthRead(e.to_string()),
                "ground_truth",
            )),
        }
    }

    let image_dir = data_dir.join("images");
    if !image_dir.is_dir() {
        report.diagnostics.push(Diagnostic::from_data_error(
            &DataError::ImageDirNotFound(image_dir),
            "images",
        ));
        return report;
    }
    match validate_image_directory(&image_dir) {
        Ok(stats) => {
            let paths = image_paths(&image_dir);
            let mut validator = ImageValidator::default();
            let batch = validator.validate_batch(&paths);
            for (path, entry) in batch.details.iter().filter(|(_, e)| !e.valid) {
                let message = format!("{}: {}", path, entry.errors.join("; "));
                let diag = if strict {
                    Diagnostic::new(codes::E_IMG_INVALID, message)
                } else {
                    Diagnostic::warning(codes::W_IMG_INVALID, message)
                };
                report.diagnostics.push(diag.with_source("images"));
            }

            let stems: BTreeSet<String> = paths
                .iter()
                .filter_map(|p| p.file_stem().and_then(|s| s.to_str()).map(str::to_string))
                .collect();
            let unmatched: Vec<&String> = gt_ids.iter().filter(|id| !stems.contains(*id)).collect();
            if !gt_ids.is_empty() && !unmatched.is_empty() {
                let shown: Vec<&str> = unmatched.iter().take(10).map(|s| s.as_str()).collect();
                report.diagnostics.push(
                    Diagnostic::warning(
                        codes::W_NO_MATCHING_IDS,
                        format!(
                            "{} ground truth invoice(s) have no image: {}",
                            unmatched.len(),
                            shown.join(", ")
                        ),
                    )
                    .with_source("images")
                    .with_fix_step("Name each image <invoice id>.jpg, .jpeg or .png"),
                );
            }
            report.images = Some(stats);
            report.image_batch = Some(batch);
        }
        Err(e) => report
            .diagnostics
            .push(Diagnostic::from_data_error(&e, "images")),
    }

    tracing::info!(
        diagnostics = report.diagnostics.len(),
        data_dir = %data_dir.display(),
        "dataset validation finished"
    );
    report
}

fn image_paths(dir: &Path) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .map(|e| e.path())
                .filter(|p| p.is_file() && is_image_path(p))
                .collect()
        })
        .unwrap_or_default();
    paths.sort();
    paths
}

fn print_report(
    report: &ValidateReport,
    args: &ValidateArgs,
    exit_code: i32,
) -> anyhow::Result<()> {
    match args.format {
        ReportFormat::Json => {
            let doc = json!({
                "valid": exit_code == exit_codes::OK,
                "exit_code": exit_code,
                "data_dir": args.data_dir,
                "strict": args.strict,
                "diagnostics": report.diagnostics,
                "ground_truth": report.ground_truth,
                "images": report.images,
                "image_checks": report.image_batch,
            });
            println!("{}", serde_json::to_string_pretty(&doc)?);
        }
        ReportFormat::Text => {
            for d in &report.diagnostics {
                eprintln!("{}", d.format_terminal());
            }
            let errors = report.diagnostics.iter().filter(|d| d.is_error()).count();
            let warnings = report.diagnostics.len() - errors;
            if let Some(stats) = &report.ground_truth {
                eprintln!(
                    "Ground truth: {} rows, {} unique invoices, {} missing values",
                    stats.total_rows, stats.unique_invoice_count, stats.total_missing_values
                );
            }
            if let Some(stats) = &report.images {
                eprintln!("Images: {}", stats.total_images);
            }
            if errors > 0 {
                eprintln!(
                    "✖ Validation failed ({} error{}, {} warning{})",
                    errors,
                    if errors != 1 { "s" } else { "" },
                    warnings,
                    if warnings != 1 { "s" } else { "" }
                );
            } else if warnings > 0 {
                eprintln!(
                    "⚠️  Validation passed with warnings ({} warning{})",
                    warnings,
                    if warnings != 1 { "s" } else { "" }
                );
            } else {
                eprintln!("✔ Validation OK");
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_png(path: &Path, side: u32) {
        image::RgbImage::new(side, side).save(path).unwrap();
    }

    #[test]
    fn missing_everything_is_two_errors() {
        let tmp = tempfile::tempdir().unwrap();
        let report = validate_dataset(tmp.path(), false);
        let codes: Vec<&str> = report.diagnostics.iter().map(|d| d.code.as_str()).collect();
        assert_eq!(codes, vec![codes::E_GT_NOT_FOUND, codes::E_IMG_DIR_MISSING]);
    }

    #[test]
    fn small_images_warn_unless_strict() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("images")).unwrap();
        write_png(&tmp.path().join("images/1.png"), 32);
        std::fs::write(
            tmp.path().join(GROUND_TRUTH_FILE),
            "Invoice,Work Order Number,Total\n1,AB123,10.00\n2,CD456,20.00\n",
        )
        .unwrap();

        let lenient = validate_dataset(tmp.path(), false);
        assert!(lenient.diagnostics.iter().all(|d| !d.is_error()));
        assert!(lenient
            .diagnostics
            .iter()
            .any(|d| d.code == codes::W_NO_MATCHING_IDS && d.message.contains('2')));

        let strict = validate_dataset(tmp.path(), true);
        assert!(strict.diagnostics.iter().any(|d| d.code == codes::E_IMG_INVALID));
    }
}
