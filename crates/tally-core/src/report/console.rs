use crate::evaluation::{InvoiceStatus, RunReport};
use crate::report::progress::{ProgressEvent, ProgressSink};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[must_use]
pub fn format_progress_line(done: usize, total: usize) -> String {
    format!("Processing invoice {}/{}...", done, total)
}

pub fn emit_progress_line(line: &str) {
    eprintln!("{}", line);
}

const PROGRESS_MIN_INTERVAL_MS: u64 = 200;

/// Emit at most every `total / 10` invoices on large runs.
pub(crate) fn progress_step(total: usize) -> usize {
    if total <= 10 {
        1
    } else {
        std::cmp::max(1, total / 10)
    }
}

struct ThrottleState {
    last_emit: Option<Instant>,
}

/// Throttled stderr progress. `None` for runs of at most one invoice; the
/// final `done == total` update is always printed.
pub fn default_progress_sink(total: usize) -> Option<ProgressSink> {
    if total <= 1 {
        return None;
    }
    let step = progress_step(total);
    let state = Arc::new(Mutex::new(ThrottleState { last_emit: None }));
    Some(Arc::new(move |ev: ProgressEvent| {
        if ev.total == 0 {
            return;
        }
        let now = Instant::now();
        let should_emit = {
            let mut g = state.lock().unwrap_or_else(|e| e.into_inner());
            let emit_final = ev.done == ev.total;
            let emit_step = ev.done.is_multiple_of(step) || ev.done == 1;
            let interval_ok = g
                .last_emit
                .map(|t| {
                    now.saturating_duration_since(t)
                        >= Duration::from_millis(PROGRESS_MIN_INTERVAL_MS)
                })
                .unwrap_or(true);
            let ok = emit_final || (emit_step && interval_ok);
            if ok {
                g.last_emit = Some(now);
            }
            ok
        };
        if should_emit {
            emit_progress_line(&format_progress_line(ev.done, ev.total));
        }
    }))
}

/// Human summary of a run, one line per invoice then per-field rates.
pub fn format_summary(report: &RunReport) -> String {
    let mut out = String::new();
    for r in &report.invoices {
        let secs = r.elapsed_ms as f64 / 1000.0;
        match r.status {
            InvoiceStatus::Ok => {
                let matched = r.comparison.values().filter(|c| c.normalized_match).count();
                let icon = if matched == report.fields.len() { "✅" } else { "⚠️ " };
                out.push_str(&format!(
                    "{} {:<20} {}/{} fields  ({:.1}s)\n",
                    icon,
                    r.invoice_id,
                    matched,
                    report.fields.len(),
                    secs
                ));
            }
            InvoiceStatus::Error => {
                out.push_str(&format!(
                    "❌ {:<20} ERROR ({})\n",
                    r.invoice_id,
                    r.error_kind.as_deref().unwrap_or("unknown")
                ));
                if let Some(msg) = &r.error {
                    out.push_str(&format!("    {}\n", msg));
                }
            }
        }
    }
    out.push('\n');
    for (field, stats) in &report.summary.fields {
        out.push_str(&format!(
            "{:<20} exact {:>6.1}%  normalized {:>6.1}%  missing {}\n",
            field,
            stats.exact_rate * 100.0,
            stats.normalized_rate * 100.0,
            stats.missing
        ));
    }
    if !report.metrics.is_empty() {
        out.push('\n');
        for (name, value) in &report.metrics {
            out.push_str(&format!("{:<32} {:.4}\n", name, value));
        }
    }
    out.push_str(&format!(
        "\nSummary: {} invoices, {} succeeded, {} failed\n",
        report.summary.total, report.summary.succeeded, report.summary.failed
    ));
    out
}

pub fn print_summary(report: &RunReport) {
    eprintln!();
    eprint!("{}", format_summary(report));
}

/// Metric rows by model columns. Missing values render as `-`.
pub fn format_comparison(results: &BTreeMap<String, BTreeMap<String, f64>>) -> String {
    let metrics: BTreeSet<&String> = results.values().flat_map(|m| m.keys()).collect();
    let width = metrics.iter().map(|m| m.len()).max().unwrap_or(6).max(6);
    let mut out = format!("{:<width$}", "metric", width = width);
    for model in results.keys() {
        out.push_str(&format!("  {:>12}", model));
    }
    out.push('\n');
    for metric in metrics {
        out.push_str(&format!("{:<width$}", metric, width = width));
        for values in results.values() {
            let cell = values
                .get(metric)
                .map(|v| format!("{:.4}", v))
                .unwrap_or_else(|| "-".into());
            out.push_str(&format!("  {:>12}", cell));
        }
        out.push('\n');
    }
    out
}

pub fn print_comparison(results: &BTreeMap<String, BTreeMap<String, f64>>) {
    eprint!("{}", format_comparison(results));
}
