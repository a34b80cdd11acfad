pub mod config;
pub mod data;
pub mod errors;
pub mod evaluation;
pub mod fields;
pub mod image;
pub mod metrics_api;
pub mod models;
pub mod parsing;
pub mod prompts;

pub mod report;

pub use errors::{Diagnostic, TallyError};
