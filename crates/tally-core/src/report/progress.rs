//! Completion-order progress from the runner; the console layer consumes it through a sink.

use std::sync::Arc;

/// How many invoices are done out of the total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressEvent {
    pub done: usize,
    pub total: usize,
}

/// Called once per completed invoice. Implementations may throttle.
pub type ProgressSink = Arc<dyn Fn(ProgressEvent) + Send + Sync>;
