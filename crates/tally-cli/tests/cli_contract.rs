use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

const GROUND_TRUTH: &str = "Invoice,Work Order Number,Total\n1,AB123,10.00\n2,CD456,20.50\n";

const FAKE_MODEL: &str = r#"name: fake
type: fake
parameters:
  responses:
    "1": '{"work_order": "AB123", "total_amount": "$10.00"}'
    "2": '{"work_order": "ZZ999", "total_amount": "20.50"}'
retry:
  max_attempts: 1
"#;

#[allow(deprecated)]
fn tally() -> Command {
    Command::cargo_bin("tally").expect("tally binary")
}

fn write_dataset(dir: &Path, side: u32) {
    fs::create_dir_all(dir.join("images")).unwrap();
    for id in ["1", "2"] {
        image::RgbImage::new(side, side)
            .save(dir.join(format!("images/{}.png", id)))
            .unwrap();
    }
    fs::write(dir.join("ground_truth.csv"), GROUND_TRUTH).unwrap();
}

/// `tally init` tree with the fake model swapped for per-invoice answers.
fn project(root: &Path) {
    tally().arg("init").arg("--dir").arg(root).assert().success();
    fs::write(root.join("models/fake.yaml"), FAKE_MODEL).unwrap();
    write_dataset(&root.join("data"), 16);
}

#[test]
fn version_prints_package_version() {
    tally()
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn init_creates_then_skips() {
    let tmp = tempdir().unwrap();
    tally()
        .arg("init")
        .arg("--dir")
        .arg(tmp.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Created"));
    for rel in ["models/fake.yaml", "models/ollama.yaml", "prompts/basic.yaml", "evaluation.yaml"] {
        assert!(tmp.path().join(rel).is_file(), "{} missing", rel);
    }
    tally()
        .arg("init")
        .arg("--dir")
        .arg(tmp.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Skipped").and(predicate::str::contains("Created").not()));
}

#[test]
fn validate_exit_codes() {
    let tmp = tempdir().unwrap();
    tally()
        .arg("validate")
        .arg("--data-dir")
        .arg(tmp.path())
        .env_remove("TALLY_DATA_DIR")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("E_GT_NOT_FOUND"));

    write_dataset(tmp.path(), 500);
    tally()
        .arg("validate")
        .arg("--data-dir")
        .arg(tmp.path())
        .assert()
        .success()
        .stderr(predicate::str::contains("Validation OK"));
}

#[test]
fn validate_json_reports_statistics() {
    let tmp = tempdir().unwrap();
    write_dataset(tmp.path(), 500);
    fs::write(
        tmp.path().join("ground_truth.csv"),
        "Invoice,Work Order Number,Total\n1,AB123,10.00\n1,CD456,\n",
    )
    .unwrap();
    let out = tally()
        .arg("validate")
        .arg("--data-dir")
        .arg(tmp.path())
        .arg("--format")
        .arg("json")
        .assert()
        .code(1)
        .get_output()
        .stdout
        .clone();
    let v: Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(v["valid"], Value::Bool(false));
    assert_eq!(v["ground_truth"]["total_rows"], 2);
    let codes: Vec<&str> = v["diagnostics"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|d| d["code"].as_str())
        .collect();
    assert!(codes.contains(&"E_GT_MISSING_VALUES"), "{:?}", codes);
    assert!(codes.contains(&"E_GT_DUPLICATE_IDS"), "{:?}", codes);
}

#[test]
fn unknown_model_is_config_error() {
    let tmp = tempdir().unwrap();
    project(tmp.path());
    tally()
        .arg("run")
        .arg("--config-root")
        .arg(tmp.path())
        .arg("--model")
        .arg("does-not-exist")
        .arg("--data-dir")
        .arg(tmp.path().join("data"))
        .assert()
        .code(2);
}

#[test]
fn run_compare_visualize_pipeline() {
    let tmp = tempdir().unwrap();
    project(tmp.path());
    let results = tmp.path().join("results");

    tally()
        .arg("run")
        .arg("--config-root")
        .arg(tmp.path())
        .arg("--model")
        .arg("fake")
        .arg("--data-dir")
        .arg(tmp.path().join("data"))
        .arg("--results-dir")
        .arg(&results)
        .arg("--seed")
        .arg("42")
        .assert()
        .success()
        .stderr(predicate::str::contains("Summary: 2 invoices, 2 succeeded, 0 failed"));

    let run: Value =
        serde_json::from_str(&fs::read_to_string(results.join("fake/run.json")).unwrap()).unwrap();
    assert_eq!(run["order_seed"], 42);
    assert_eq!(run["invoices"][0]["invoice_id"], "1");
    assert_eq!(run["summary"]["fields"]["Total"]["normalized_matches"], 2);
    assert_eq!(run["summary"]["fields"]["Work Order Number"]["exact_matches"], 1);
    assert!(results.join("fake/metrics.json").is_file());

    let cmp = tally()
        .arg("compare")
        .arg("--results-dir")
        .arg(&results)
        .arg("--models")
        .arg("fake,missing")
        .arg("--format")
        .arg("json")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let cmp: Value = serde_json::from_slice(&cmp).unwrap();
    assert!(cmp["models"]["fake"]["accuracy"].is_number());

    let charts = tmp.path().join("charts");
    tally()
        .arg("visualize")
        .arg("--results-dir")
        .arg(&results)
        .arg("--out")
        .arg(&charts)
        .arg("--data-dir")
        .arg(tmp.path().join("data"))
        .assert()
        .success();
    for name in [
        "fake_fields.svg",
        "fake_dashboard.svg",
        "model_comparison.svg",
        "gt_missing_values.svg",
    ] {
        let body = fs::read_to_string(charts.join(name)).unwrap();
        assert!(body.starts_with("<svg") || body.starts_with("<?xml"), "{}", name);
    }
}

#[test]
fn compare_without_results_fails() {
    let tmp = tempdir().unwrap();
    tally()
        .arg("compare")
        .arg("--results-dir")
        .arg(tmp.path())
        .assert()
        .code(1)
        .stderr(predicate::str::contains("No results found"));
}
