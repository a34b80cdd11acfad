use super::calculator::MetricsCalculator;
use super::run::{
    fingerprint_ground_truth, InvoiceResult, InvoiceStatus, RunReport, RunSummary,
};
use crate::config::ModelConfig;
use crate::data::{DataLoader, InvoiceImage};
use crate::fields::{
    canonicalize_fields, compare_extracted_to_ground_truth, FieldComparison, FieldKind, FieldMap,
};
use crate::image::{encode_png, ImageProcessor};
use crate::metrics_api::GroundTruthSet;
use crate::models::{with_retry, with_timeout, ExtractionModel, ModelError, RetryPolicy};
use crate::parsing::OutputParser;
use crate::prompts::{
    FormatterRegistry, PromptData, PromptFactory, PromptFormatter, PromptStrategy,
};
use crate::report::progress::{ProgressEvent, ProgressSink};
use anyhow::Context;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// What to run for one model.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub prompt_category: String,
    pub prompt_name: Option<String>,
    /// Prompt field types (`work_order`, `cost`); empty means both.
    pub field_types: Vec<String>,
    pub concurrency: usize,
    pub limit: Option<usize>,
    /// Metric names to compute; `None` computes every registered metric.
    pub metrics: Option<Vec<String>>,
    /// Dispatch order seed. A random one is drawn and recorded when unset.
    pub order_seed: Option<u64>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            prompt_category: "basic".into(),
            prompt_name: None,
            field_types: Vec::new(),
            concurrency: 4,
            limit: None,
            metrics: None,
            order_seed: None,
        }
    }
}

impl RunnerConfig {
    pub fn field_types(&self) -> Vec<String> {
        if self.field_types.is_empty() {
            vec!["work_order".into(), "cost".into()]
        } else {
            self.field_types.clone()
        }
    }
}

pub struct Runner {
    pub loader: Arc<DataLoader>,
    pub model: Arc<dyn ExtractionModel>,
    pub model_config: Arc<ModelConfig>,
    pub prompts: PromptFactory,
    pub formatters: Arc<FormatterRegistry>,
    pub parser: Arc<dyn OutputParser>,
    pub calculator: Arc<MetricsCalculator>,
    pub retry: RetryPolicy,
}

/// Everything a spawned invoice task needs, shared behind one `Arc`.
struct Pipeline {
    loader: Arc<DataLoader>,
    model: Arc<dyn ExtractionModel>,
    preprocessor: Option<ImageProcessor>,
    generators: Vec<(String, Arc<dyn PromptStrategy>)>,
    formatter: Arc<dyn PromptFormatter>,
    system_prompt: Option<String>,
    parser: Arc<dyn OutputParser>,
    retry: RetryPolicy,
    timeout_seconds: f64,
    columns: Vec<String>,
}

struct Failure {
    kind: String,
    message: String,
}

impl Failure {
    fn new(kind: &str, err: impl std::fmt::Display) -> Self {
        Self {
            kind: kind.to_string(),
            message: err.to_string(),
        }
    }
}

impl From<ModelError> for Failure {
    fn from(e: ModelError) -> Self {
        Self {
            kind: e.kind.as_str().to_string(),
            message: e.to_string(),
        }
    }
}

#[derive(Default)]
struct Trace {
    attempts: u32,
    raw_output: Option<String>,
}

impl Runner {
    /// Run every available invoice through the model. Invoices complete in
    /// any order; the report lists them sorted by invoice id. A failing
    /// invoice is recorded with status `error` and does not stop the run.
    pub async fn run(
        &self,
        cfg: &RunnerConfig,
        progress: Option<ProgressSink>,
    ) -> anyhow::Result<RunReport> {
        let started_at = chrono::Utc::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        let field_types = cfg.field_types();
        let columns = columns_for(&field_types)?;

        let mut generators = Vec::with_capacity(field_types.len());
        for ft in &field_types {
            let strategy = self
                .prompts
                .create_generator(&cfg.prompt_category, ft, cfg.prompt_name.as_deref())
                .with_context(|| {
                    format!("failed to build {} prompt for {}", cfg.prompt_category, ft)
                })?;
            generators.push((ft.clone(), Arc::<dyn PromptStrategy>::from(strategy)));
        }
        let formatter = self.formatters.get(self.model_config.prompt_format())?;
        let preprocessor = self
            .model_config
            .preprocessing
            .clone()
            .map(ImageProcessor::new)
            .transpose()
            .context("invalid preprocessing config")?;

        let mut ids = self
            .loader
            .get_available_invoice_ids()
            .context("failed to list invoices")?;
        if let Some(limit) = cfg.limit {
            ids.truncate(limit);
        }
        if ids.is_empty() {
            tracing::warn!(
                data_dir = %self.loader.data_dir().display(),
                "no invoices with both an image and ground truth"
            );
        }
        let mut ground_truth = GroundTruthSet::new();
        for id in &ids {
            let fields = self.loader.ground_truth().get_ground_truth(id)?;
            ground_truth.insert(id.clone(), select(&fields, &columns));
        }

        let seed = cfg.order_seed.unwrap_or_else(rand::random);
        {
            use rand::seq::SliceRandom;
            use rand::SeedableRng;
            let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
            ids.shuffle(&mut rng);
        }

        let pipeline = Arc::new(Pipeline {
            loader: self.loader.clone(),
            model: self.model.clone(),
            preprocessor,
            generators,
            formatter,
            system_prompt: self.model_config.inference.system_prompt.clone(),
            parser: self.parser.clone(),
            retry: self.retry.clone(),
            timeout_seconds: self.model_config.processing_timeout(),
            columns: columns.clone(),
        });

        let total = ids.len();
        tracing::info!(
            run_id = %run_id,
            model = self.model.name(),
            invoices = total,
            concurrency = cfg.concurrency.max(1),
            order_seed = seed,
            "run started"
        );

        let limit = cfg.concurrency.max(1);
        let sem = Arc::new(Semaphore::new(limit));
        let mut join_set = JoinSet::new();
        let mut task_ids = HashMap::new();
        let mut results = Vec::with_capacity(total);
        for id in ids {
            // Collect finished invoices before waiting on a permit so progress
            // keeps moving while dispatch is still running.
            while join_set.len() >= limit {
                match join_set.join_next().await {
                    Some(res) => collect(res, &task_ids, &mut results, progress.as_ref(), total),
                    None => break,
                }
            }
            let permit = sem.clone().acquire_owned().await?;
            let pipeline = pipeline.clone();
            let expected = ground_truth.get(&id).cloned().unwrap_or_default();
            let invoice_id = id.clone();
            let handle = join_set.spawn(async move {
                let _permit = permit;
                pipeline.process(&invoice_id, &expected).await
            });
            task_ids.insert(handle.id(), id);
        }
        while let Some(res) = join_set.join_next().await {
            collect(res, &task_ids, &mut results, progress.as_ref(), total);
        }

        results.sort_by(|a, b| a.invoice_id.cmp(&b.invoice_id));

        let predictions = results
            .iter()
            .filter(|r| r.is_ok())
            .map(|r| (r.invoice_id.clone(), r.fields.clone()))
            .collect();
        let metrics = self
            .calculator
            .calculate(cfg.metrics.as_deref(), &predictions, &ground_truth)?;
        let summary = RunSummary::from_results(&results, &columns);
        tracing::info!(
            run_id = %run_id,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "run finished"
        );

        Ok(RunReport {
            run_id,
            started_at,
            finished_at: chrono::Utc::now(),
            model: self.model.name().to_string(),
            provider: self.model.provider_name().to_string(),
            prompt_category: cfg.prompt_category.clone(),
            prompt_name: cfg.prompt_name.clone(),
            fields: columns,
            ground_truth_fingerprint: fingerprint_ground_truth(&ground_truth),
            order_seed: Some(seed),
            invoices: results,
            metrics,
            summary,
        })
    }
}

fn collect(
    res: Result<InvoiceResult, tokio::task::JoinError>,
    task_ids: &HashMap<tokio::task::Id, String>,
    results: &mut Vec<InvoiceResult>,
    progress: Option<&ProgressSink>,
    total: usize,
) {
    let result = match res {
        Ok(result) => result,
        Err(e) => {
            let id = task_ids
                .get(&e.id())
                .cloned()
                .unwrap_or_else(|| "unknown".into());
            let kind = if e.is_panic() { "panic" } else { "join" };
            tracing::warn!(invoice_id = %id, kind, error = %e, "invoice task failed");
            InvoiceResult::failed(&id, kind, format!("join error: {}", e))
        }
    };
    results.push(result);
    if let Some(sink) = progress {
        sink(ProgressEvent {
            done: results.len(),
            total,
        });
    }
}

impl Pipeline {
    async fn process(&self, invoice_id: &str, expected: &FieldMap) -> InvoiceResult {
        let started = Instant::now();
        let mut trace = Trace::default();
        let outcome = self.extract(invoice_id, expected, &mut trace).await;
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        match outcome {
            Ok((fields, comparison)) => InvoiceResult {
                invoice_id: invoice_id.to_string(),
                status: InvoiceStatus::Ok,
                raw_output: trace.raw_output,
                fields,
                comparison,
                error: None,
                error_kind: None,
                attempts: trace.attempts,
                elapsed_ms,
            },
            Err(f) => {
                tracing::warn!(invoice_id, kind = %f.kind, error = %f.message, "invoice failed");
                InvoiceResult {
                    raw_output: trace.raw_output,
                    attempts: trace.attempts,
                    elapsed_ms,
                    ..InvoiceResult::failed(invoice_id, &f.kind, f.message)
                }
            }
        }
    }

    async fn extract(
        &self,
        invoice_id: &str,
        expected: &FieldMap,
        trace: &mut Trace,
    ) -> Result<(FieldMap, BTreeMap<String, FieldComparison>), Failure> {
        let image = self
            .loader
            .load_image(invoice_id)
            .map_err(|e| Failure::new("data", e))?;
        let image = self.prepare(image).map_err(|e| Failure::new("image", e))?;
        let prompt = self.prompt(&image)?;

        let timeout_seconds = self.timeout_seconds;
        let retried = with_retry(&self.retry, |_attempt| {
            let model = self.model.clone();
            let image = image.clone();
            let prompt = prompt.clone();
            async move {
                let path = image.path.display().to_string();
                with_timeout(timeout_seconds, Some(&path), model.extract(&image, &prompt)).await
            }
        })
        .await;
        trace.attempts = retried.attempts;
        let output = retried.result?;
        trace.raw_output = Some(output.text.clone());

        let parsed = self
            .parser
            .parse(&output.text)
            .map_err(|e| Failure::new("parse", e))?;
        let normalized = self.parser.normalize(&parsed);
        if let Err(e) = self.parser.validate(&normalized) {
            tracing::debug!(invoice_id, error = %e, "extracted fields did not validate");
        }
        let fields = select(&canonicalize_fields(&normalized), &self.columns);
        let comparison = compare_extracted_to_ground_truth(&fields, expected);
        Ok((fields, comparison))
    }

    /// Preprocessed images are re-encoded as PNG before upload.
    fn prepare(&self, image: Arc<InvoiceImage>) -> anyhow::Result<Arc<InvoiceImage>> {
        let Some(processor) = &self.preprocessor else {
            return Ok(image);
        };
        let decoded = image.decode()?;
        let processed = processor.preprocess(&decoded)?;
        let bytes = encode_png(&processed)?;
        Ok(Arc::new(InvoiceImage::from_bytes(
            image.invoice_id.clone(),
            image.path.clone(),
            bytes,
        )?))
    }

    fn prompt(&self, image: &InvoiceImage) -> Result<String, Failure> {
        let mut parts = Vec::with_capacity(self.generators.len());
        for (field_type, strategy) in &self.generators {
            let data: PromptData = [
                ("invoice_id", image.invoice_id.clone()),
                ("image_path", image.path.display().to_string()),
                ("field_type", field_type.clone()),
            ]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
            parts.push(strategy.generate(&data).map_err(|e| Failure::new("prompt", e))?);
        }
        let prompt = parts.join("\n\n");
        let formatted = self
            .formatter
            .format(&prompt, self.system_prompt.as_deref())
            .map_err(|e| Failure::new("format", e))?;
        self.formatter
            .validate(&formatted)
            .map_err(|e| Failure::new("format", e))?;
        Ok(formatted)
    }
}

/// Ground-truth columns for prompt field types.
pub fn columns_for(field_types: &[String]) -> anyhow::Result<Vec<String>> {
    field_types
        .iter()
        .map(|ft| {
            FieldKind::classify(ft)
                .column()
                .map(str::to_string)
                .ok_or_else(|| {
                    anyhow::anyhow!("Invalid field type: {}. Must be one of work_order, cost", ft)
                })
        })
        .collect()
}

fn select(fields: &FieldMap, columns: &[String]) -> FieldMap {
    fields
        .iter()
        .filter(|(k, _)| columns.contains(k))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}
