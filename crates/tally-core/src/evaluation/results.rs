use super::run::RunReport;
use super::EvaluationError;
use crate::config::evaluation::OutputFormat;
use crate::data::{GroundTruthManager, Table};
use crate::fields::{FieldMap, INVOICE_FIELD};
use crate::metrics_api::GroundTruthSet;
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

const METRICS_STEM: &str = "metrics";
const RUN_FILE: &str = "run.json";
const GROUND_TRUTH_STEM: &str = "ground_truth";

/// Per-model result files under one results directory:
///
/// ```text
/// <dir>/<model>/metrics.{json,yaml,csv}
/// <dir>/<model>/run.json
/// ```
#[derive(Debug, Clone)]
pub struct ResultsManager {
    dir: PathBuf,
}

impl ResultsManager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `<dir>/<model>`. The name must be a single plain path component.
    pub fn model_dir(&self, model: &str) -> Result<PathBuf, EvaluationError> {
        let mut components = Path::new(model).components();
        let plain = matches!(components.next(), Some(Component::Normal(_)))
            && components.next().is_none()
            && !model.contains(['/', '\\']);
        if !plain {
            return Err(EvaluationError::InvalidModelName(model.to_string()));
        }
        Ok(self.dir.join(model))
    }

    pub fn save_results(
        &self,
        model: &str,
        metrics: &BTreeMap<String, f64>,
        format: OutputFormat,
    ) -> Result<PathBuf, EvaluationError> {
        let dir = self.model_dir(model)?;
        std::fs::create_dir_all(&dir).map_err(|e| EvaluationError::io(&dir, e))?;
        let path = dir.join(format!("{}.{}", METRICS_STEM, format.extension()));
        let body = match format {
            OutputFormat::Json => serde_json::to_string_pretty(metrics)
                .map_err(|e| EvaluationError::Serialize(e.to_string()))?,
            OutputFormat::Yaml => serde_yaml::to_string(metrics)
                .map_err(|e| EvaluationError::Serialize(e.to_string()))?,
            OutputFormat::Csv => metrics_to_csv(metrics)?,
        };
        std::fs::write(&path, body).map_err(|e| EvaluationError::io(&path, e))?;
        tracing::info!(model, path = %path.display(), "results saved");
        Ok(path)
    }

    /// First of `metrics.json`, `metrics.yaml`, `metrics.csv` that exists.
    pub fn load_results(&self, model: &str) -> Result<BTreeMap<String, f64>, EvaluationError> {
        let dir = self.model_dir(model)?;
        for format in OutputFormat::ALL {
            let path = dir.join(format!("{}.{}", METRICS_STEM, format.extension()));
            if !path.is_file() {
                continue;
            }
            let text = std::fs::read_to_string(&path).map_err(|e| EvaluationError::io(&path, e))?;
            return match format {
                OutputFormat::Json => {
                    serde_json::from_str(&text).map_err(|e| EvaluationError::parse(&path, e))
                }
                OutputFormat::Yaml => {
                    serde_yaml::from_str(&text).map_err(|e| EvaluationError::parse(&path, e))
                }
                OutputFormat::Csv => metrics_from_csv(&text, &path),
            };
        }
        Err(EvaluationError::NoResults(model.to_string()))
    }

    pub fn save_run(&self, model: &str, report: &RunReport) -> Result<PathBuf, EvaluationError> {
        let dir = self.model_dir(model)?;
        std::fs::create_dir_all(&dir).map_err(|e| EvaluationError::io(&dir, e))?;
        let path = dir.join(RUN_FILE);
        let body = serde_json::to_string_pretty(report)
            .map_err(|e| EvaluationError::Serialize(e.to_string()))?;
        std::fs::write(&path, body).map_err(|e| EvaluationError::io(&path, e))?;
        Ok(path)
    }

    pub fn load_run(&self, model: &str) -> Result<RunReport, EvaluationError> {
        let path = self.model_dir(model)?.join(RUN_FILE);
        if !path.is_file() {
            return Err(EvaluationError::NoResults(model.to_string()));
        }
        let text = std::fs::read_to_string(&path).map_err(|e| EvaluationError::io(&path, e))?;
        serde_json::from_str(&text).map_err(|e| EvaluationError::parse(&path, e))
    }

    /// Model directories holding a metrics file or a run report, sorted.
    pub fn list_models(&self) -> Result<Vec<String>, EvaluationError> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }
        let entries = std::fs::read_dir(&self.dir).map_err(|e| EvaluationError::io(&self.dir, e))?;
        let mut models: Vec<String> = entries
            .filter_map(Result::ok)
            .filter(|e| e.path().is_dir())
            .filter(|e| has_results(&e.path()))
            .filter_map(|e| e.file_name().to_str().map(str::to_string))
            .collect();
        models.sort();
        Ok(models)
    }

    /// Remove a model's result directory. `false` when there was nothing to remove.
    pub fn delete_results(&self, model: &str) -> Result<bool, EvaluationError> {
        let dir = self.model_dir(model)?;
        if !dir.is_dir() {
            return Ok(false);
        }
        std::fs::remove_dir_all(&dir).map_err(|e| EvaluationError::io(&dir, e))?;
        Ok(true)
    }

    pub fn load_ground_truth(&self, path: &Path) -> Result<GroundTruthSet, EvaluationError> {
        load_ground_truth(path)
    }
}

fn has_results(dir: &Path) -> bool {
    dir.join(RUN_FILE).is_file()
        || OutputFormat::ALL
            .iter()
            .any(|f| dir.join(format!("{}.{}", METRICS_STEM, f.extension())).is_file())
}

fn metrics_to_csv(metrics: &BTreeMap<String, f64>) -> Result<String, EvaluationError> {
    let mut w = csv::Writer::from_writer(Vec::new());
    let ser = |e: csv::Error| EvaluationError::Serialize(e.to_string());
    w.write_record(["metric", "value"]).map_err(ser)?;
    for (name, value) in metrics {
        let value = value.to_string();
        w.write_record([name.as_str(), value.as_str()]).map_err(ser)?;
    }
    let bytes = w
        .into_inner()
        .map_err(|e| EvaluationError::Serialize(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| EvaluationError::Serialize(e.to_string()))
}

fn metrics_from_csv(text: &str, path: &Path) -> Result<BTreeMap<String, f64>, EvaluationError> {
    let table = Table::from_reader(text.as_bytes()).map_err(|e| EvaluationError::parse(path, e))?;
    let mut out = BTreeMap::new();
    for row in 0..table.len() {
        let (Some(name), Some(value)) = (table.value(row, "metric"), table.value(row, "value"))
        else {
            continue;
        };
        let value: f64 = value
            .parse()
            .map_err(|_| {
                EvaluationError::parse(path, format!("invalid value for {}: {}", name, value))
            })?;
        out.insert(name.to_string(), value);
    }
    Ok(out)
}

/// Expected fields for every invoice in a ground-truth file.
///
/// JSON and YAML hold `{invoice: {field: value}}`. A CSV whose header has
/// `Invoice` is the wide per-invoice table and goes through
/// [`GroundTruthManager`] validation; any other CSV is read as long rows of
/// `image_id,field_name,field_value`. A directory is searched for
/// `ground_truth.{json,yaml,csv}`.
pub fn load_ground_truth(path: &Path) -> Result<GroundTruthSet, EvaluationError> {
    let path = if path.is_dir() {
        ["json", "yaml", "yml", "csv"]
            .iter()
            .map(|ext| path.join(format!("{}.{}", GROUND_TRUTH_STEM, ext)))
            .find(|p| p.is_file())
            .ok_or_else(|| EvaluationError::DatasetNotFound(path.to_path_buf()))?
    } else if path.is_file() {
        path.to_path_buf()
    } else {
        return Err(EvaluationError::DatasetNotFound(path.to_path_buf()));
    };
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "json" => {
            let text = std::fs::read_to_string(&path).map_err(|e| EvaluationError::io(&path, e))?;
            let raw: BTreeMap<String, BTreeMap<String, serde_json::Value>> =
                serde_json::from_str(&text).map_err(|e| EvaluationError::parse(&path, e))?;
            Ok(stringify(raw, |v| match v {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            }))
        }
        "yaml" | "yml" => {
            let text = std::fs::read_to_string(&path).map_err(|e| EvaluationError::io(&path, e))?;
            let raw: BTreeMap<String, BTreeMap<String, serde_yaml::Value>> =
                serde_yaml::from_str(&text).map_err(|e| EvaluationError::parse(&path, e))?;
            Ok(stringify(raw, yaml_scalar))
        }
        "csv" => {
            let table = Table::from_path(&path).map_err(|e| EvaluationError::parse(&path, e))?;
            if table.has_column(INVOICE_FIELD) {
                let manager = GroundTruthManager::new(&path, None, true)?;
                ground_truth_set(&manager)
            } else {
                long_table(&table, &path)
            }
        }
        _ => Err(EvaluationError::UnsupportedFormat(path)),
    }
}

/// Every validated ground-truth row, keyed by invoice id.
pub fn ground_truth_set(manager: &GroundTruthManager) -> Result<GroundTruthSet, EvaluationError> {
    let mut set = GroundTruthSet::new();
    for id in manager.invoice_ids()? {
        let fields = manager.get_ground_truth(&id)?;
        set.insert(id, fields);
    }
    Ok(set)
}

fn long_table(table: &Table, path: &Path) -> Result<GroundTruthSet, EvaluationError> {
    for column in ["image_id", "field_name", "field_value"] {
        if !table.has_column(column) {
            return Err(EvaluationError::parse(
                path,
                format!("missing column '{}' in long ground truth", column),
            ));
        }
    }
    let mut set = GroundTruthSet::new();
    for row in 0..table.len() {
        let (Some(id), Some(field)) =
            (table.value(row, "image_id"), table.value(row, "field_name"))
        else {
            continue;
        };
        let value = table.value(row, "field_value").unwrap_or_default();
        set.entry(id.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
    }
    Ok(set)
}

fn stringify<V>(
    raw: BTreeMap<String, BTreeMap<String, V>>,
    f: impl Fn(V) -> String,
) -> GroundTruthSet {
    raw.into_iter()
        .map(|(id, fields)| {
            let fields: FieldMap = fields.into_iter().map(|(k, v)| (k, f(v))).collect();
            (id, fields)
        })
        .collect()
}

fn yaml_scalar(v: serde_yaml::Value) -> String {
    match v {
        serde_yaml::Value::String(s) => s,
        serde_yaml::Value::Null => String::new(),
        other => serde_yaml::to_string(&other)
            .map(|s| s.trim().to_string())
            .unwrap_or_default(),
    }
}
