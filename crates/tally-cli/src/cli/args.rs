use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tally_core::config::evaluation::OutputFormat;

#[derive(Parser)]
#[command(
    name = "tally",
    version,
    about = "Evaluation harness for invoice field extraction with vision models"
)]
pub struct Cli {
    /// Raise log verbosity (-v info, -vv debug). RUST_LOG takes precedence.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Check ground truth and invoice images before a run
    Validate(ValidateArgs),
    /// Extract fields with a model and score them against ground truth
    Run(RunArgs),
    /// Compare saved metrics across models
    Compare(CompareArgs),
    /// Write SVG charts for saved runs
    Visualize(VisualizeArgs),
    /// Write a sample config tree
    Init(InitArgs),
    Version,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum ReportFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ResultFormat {
    Json,
    Yaml,
    Csv,
}

impl From<ResultFormat> for OutputFormat {
    fn from(f: ResultFormat) -> Self {
        match f {
            ResultFormat::Json => OutputFormat::Json,
            ResultFormat::Yaml => OutputFormat::Yaml,
            ResultFormat::Csv => OutputFormat::Csv,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FieldChoice {
    #[value(name = "work_order", alias = "work-order")]
    WorkOrder,
    Cost,
    All,
}

impl FieldChoice {
    /// Prompt field types to run; empty selects every field.
    pub fn field_types(self) -> Vec<String> {
        match self {
            FieldChoice::WorkOrder => vec!["work_order".into()],
            FieldChoice::Cost => vec!["cost".into()],
            FieldChoice::All => Vec::new(),
        }
    }
}

#[derive(clap::Args, Debug, Clone)]
pub struct ValidateArgs {
    /// Directory holding ground_truth.csv and images/
    #[arg(long, env = "TALLY_DATA_DIR")]
    pub data_dir: PathBuf,

    /// Treat malformed totals, work orders and undersized images as errors
    #[arg(long)]
    pub strict: bool,

    #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
    pub format: ReportFormat,
}

#[derive(clap::Args, Debug, Clone)]
pub struct RunArgs {
    /// Directory with models/, prompts/ and evaluation.yaml
    #[arg(long, default_value = "config")]
    pub config_root: PathBuf,

    /// Model config name (models/<name>.yaml)
    #[arg(long)]
    pub model: String,

    #[arg(long, default_value = "basic")]
    pub prompt_category: String,

    /// Prompt name inside the category; the first prompt per field otherwise
    #[arg(long)]
    pub prompt: Option<String>,

    #[arg(long, value_enum)]
    pub field: Option<FieldChoice>,

    /// Overrides dataset.path from evaluation.yaml
    #[arg(long, env = "TALLY_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Overrides output.results_dir from evaluation.yaml
    #[arg(long)]
    pub results_dir: Option<PathBuf>,

    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Evaluate at most this many invoices
    #[arg(long)]
    pub limit: Option<usize>,

    /// Metrics file format; overrides output.format
    #[arg(long, value_enum)]
    pub format: Option<ResultFormat>,

    /// Seed for the invoice dispatch order
    #[arg(long)]
    pub seed: Option<u64>,
}

#[derive(clap::Args, Debug, Clone)]
pub struct CompareArgs {
    #[arg(long, default_value = "results")]
    pub results_dir: PathBuf,

    /// Models to compare; every model with results when omitted
    #[arg(long, value_delimiter = ',')]
    pub models: Vec<String>,

    #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
    pub format: ReportFormat,
}

#[derive(clap::Args, Debug, Clone)]
pub struct VisualizeArgs {
    #[arg(long, default_value = "results")]
    pub results_dir: PathBuf,

    #[arg(long, value_delimiter = ',')]
    pub models: Vec<String>,

    /// Output directory for the SVG files
    #[arg(long, default_value = "charts")]
    pub out: PathBuf,

    /// Adds ground-truth charts when set
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
}

#[derive(clap::Args, Debug, Clone)]
pub struct InitArgs {
    #[arg(long, default_value = ".")]
    pub dir: PathBuf,
}
