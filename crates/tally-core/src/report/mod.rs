pub mod console;
pub mod json;
pub mod progress;
pub mod svg;

pub use progress::{ProgressEvent, ProgressSink};
pub use svg::{write_all_charts, ChartInputs};
