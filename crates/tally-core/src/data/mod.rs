pub mod ground_truth;
pub mod loader;
pub mod table;
pub mod utils;
pub mod validators;

pub use ground_truth::GroundTruthManager;
pub use loader::{DataLoader, InvoiceData, InvoiceImage};
pub use table::Table;

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum DataError {
    #[error("Ground truth file does not exist: {0}")]
    GroundTruthMissing(PathBuf),
    #[error("Ground truth file not found: {0}")]
    GroundTruthNotFound(PathBuf),
    #[error("Image directory not found: {0}")]
    ImageDirNotFound(PathBuf),
    #[error("Failed to read ground truth file: {0}")]
    GroundTruthRead(String),
    /// Schema or field violation in ground truth data.
    #[error("{0}")]
    GroundTruth(String),
    #[error("Invoice ID {0} not found in ground truth data")]
    InvoiceNotFound(String),
    #[error("Image not found for invoice {0}")]
    ImageNotFound(String),
    #[error("Failed to load image {path}: {reason}")]
    ImageLoad { path: PathBuf, reason: String },
    #[error("Directory does not exist: {0}")]
    DirectoryMissing(PathBuf),
    #[error("Path is not a directory: {0}")]
    NotADirectory(PathBuf),
    #[error("File does not exist: {0}")]
    FileMissing(PathBuf),
    #[error("Path is not a file: {0}")]
    NotAFile(PathBuf),
    #[error("{0}")]
    Validation(String),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
