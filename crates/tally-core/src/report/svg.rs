//! Static SVG charts for runs, model comparisons and ground-truth data.
//!
//! Every chart is a self-contained document built as a string; labels pass
//! through [`escape`].

use crate::data::Table;
use crate::evaluation::RunReport;
use crate::fields::{validate_total_amount, TOTAL_FIELD};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write;
use std::path::{Path, PathBuf};

const WIDTH: f64 = 720.0;
const HEIGHT: f64 = 420.0;
const PALETTE: [&str; 6] = ["#4c72b0", "#dd8452", "#55a868", "#c44e52", "#8172b3", "#937860"];

/// Metric name to value, per model.
pub type ModelMetrics = BTreeMap<String, BTreeMap<String, f64>>;

/// XML-escape text for element content and attribute values.
pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

#[derive(Debug, Clone, Copy)]
struct Plot {
    left: f64,
    top: f64,
    width: f64,
    height: f64,
}

impl Plot {
    fn standard(width: f64, height: f64) -> Self {
        Self {
            left: 70.0,
            top: 60.0,
            width: width - 100.0,
            height: height - 140.0,
        }
    }

    fn bottom(&self) -> f64 {
        self.top + self.height
    }
}

struct Canvas {
    out: String,
    width: f64,
    height: f64,
}

impl Canvas {
    fn new(width: f64, height: f64, title: &str) -> Self {
        let mut out = String::new();
        let _ = writeln!(
            out,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}" font-family="sans-serif">"#,
            w = width,
            h = height
        );
        let _ = writeln!(out, "<title>{}</title>", escape(title));
        let _ = writeln!(
            out,
            r##"<rect x="0" y="0" width="{}" height="{}" fill="#ffffff"/>"##,
            width, height
        );
        let mut c = Self { out, width, height };
        c.text(width / 2.0, 30.0, "middle", 18.0, title);
        c
    }

    fn rect(&mut self, x: f64, y: f64, w: f64, h: f64, fill: &str) {
        let _ = writeln!(
            self.out,
            r#"<rect x="{:.1}" y="{:.1}" width="{:.1}" height="{:.1}" fill="{}"/>"#,
            x,
            y,
            w.max(0.0),
            h.max(0.0),
            fill
        );
    }

    fn line(&mut self, x1: f64, y1: f64, x2: f64, y2: f64, stroke: &str) {
        let _ = writeln!(
            self.out,
            r#"<line x1="{:.1}" y1="{:.1}" x2="{:.1}" y2="{:.1}" stroke="{}"/>"#,
            x1, y1, x2, y2, stroke
        );
    }

    fn text(&mut self, x: f64, y: f64, anchor: &str, size: f64, content: &str) {
        self.styled_text(x, y, anchor, size, "#222222", content);
    }

    fn styled_text(&mut self, x: f64, y: f64, anchor: &str, size: f64, fill: &str, content: &str) {
        let _ = writeln!(
            self.out,
            r#"<text x="{:.1}" y="{:.1}" text-anchor="{}" font-size="{}" fill="{}">{}</text>"#,
            x,
            y,
            anchor,
            size,
            fill,
            escape(content)
        );
    }

    fn no_data(&mut self) {
        let (x, y) = (self.width / 2.0, self.height / 2.0);
        self.text(x, y, "middle", 14.0, "No data");
    }

    /// Left value axis with five gridlines from 0 to `max`.
    fn value_axis(&mut self, plot: &Plot, max: f64, label: &str, percent: bool) {
        for i in 0..=5 {
            let v = max * f64::from(i) / 5.0;
            let y = plot.bottom() - plot.height * f64::from(i) / 5.0;
            self.line(plot.left, y, plot.left + plot.width, y, "#e5e5e5");
            let tick = if percent {
                format!("{:.0}%", v * 100.0)
            } else {
                format_tick(v)
            };
            self.text(plot.left - 8.0, y + 4.0, "end", 11.0, &tick);
        }
        self.line(plot.left, plot.top, plot.left, plot.bottom(), "#444444");
        self.line(plot.left, plot.bottom(), plot.left + plot.width, plot.bottom(), "#444444");
        let _ = writeln!(
            self.out,
            r#"<text x="18" y="{:.1}" text-anchor="middle" font-size="12" transform="rotate(-90 18 {:.1})">{}</text>"#,
            plot.top + plot.height / 2.0,
            plot.top + plot.height / 2.0,
            escape(label)
        );
    }

    fn legend(&mut self, names: &[&str]) {
        let mut x = 70.0;
        let y = self.height - 18.0;
        for (i, name) in names.iter().enumerate() {
            self.rect(x, y - 10.0, 12.0, 12.0, PALETTE[i % PALETTE.len()]);
            self.text(x + 16.0, y, "start", 12.0, name);
            x += 24.0 + 7.0 * name.chars().count() as f64;
        }
    }

    fn finish(mut self) -> String {
        self.out.push_str("</svg>\n");
        self.out
    }
}

fn format_tick(v: f64) -> String {
    if v.fract().abs() < 1e-9 {
        format!("{:.0}", v)
    } else {
        format!("{:.2}", v)
    }
}

/// Vertical bars grouped by category, one colour per series.
fn grouped_bars(
    title: &str,
    y_label: &str,
    categories: &[String],
    series: &[(String, Vec<f64>)],
    y_max: f64,
    percent: bool,
) -> String {
    let mut c = Canvas::new(WIDTH, HEIGHT, title);
    let plot = Plot::standard(WIDTH, HEIGHT);
    if categories.is_empty() || series.is_empty() {
        c.no_data();
        return c.finish();
    }
    let y_max = if y_max > 0.0 { y_max } else { 1.0 };
    c.value_axis(&plot, y_max, y_label, percent);

    let group_w = plot.width / categories.len() as f64;
    let bar_w = group_w * 0.8 / series.len() as f64;
    for (ci, category) in categories.iter().enumerate() {
        let gx = plot.left + ci as f64 * group_w + group_w * 0.1;
        for (si, (_, values)) in series.iter().enumerate() {
            let v = values.get(ci).copied().unwrap_or(0.0).clamp(0.0, y_max);
            let h = plot.height * v / y_max;
            c.rect(
                gx + si as f64 * bar_w,
                plot.bottom() - h,
                bar_w * 0.92,
                h,
                PALETTE[si % PALETTE.len()],
            );
        }
        c.text(gx + group_w * 0.4, plot.bottom() + 18.0, "middle", 11.0, category);
    }
    let names: Vec<&str> = series.iter().map(|(n, _)| n.as_str()).collect();
    c.legend(&names);
    c.finish()
}

/// Horizontal bars, one row per item, scaled to `max`.
fn horizontal_bars(
    c: &mut Canvas,
    plot: &Plot,
    items: &[(String, f64)],
    max: f64,
    fmt: impl Fn(f64) -> String,
) {
    if items.is_empty() {
        c.no_data();
        return;
    }
    let max = if max > 0.0 { max } else { 1.0 };
    let row_h = plot.height / items.len() as f64;
    for (i, (label, value)) in items.iter().enumerate() {
        let y = plot.top + i as f64 * row_h;
        let w = plot.width * value.clamp(0.0, max) / max;
        c.rect(plot.left, y + row_h * 0.15, w, row_h * 0.7, PALETTE[i % PALETTE.len()]);
        c.text(plot.left - 8.0, y + row_h / 2.0 + 4.0, "end", 11.0, label);
        c.text(plot.left + w + 6.0, y + row_h / 2.0 + 4.0, "start", 11.0, &fmt(*value));
    }
}

/// Exact vs normalized match rate per field of one run.
pub fn field_accuracy_chart(report: &RunReport) -> String {
    let categories: Vec<String> = report.summary.fields.keys().cloned().collect();
    let exact = report.summary.fields.values().map(|s| s.exact_rate).collect();
    let normalized = report.summary.fields.values().map(|s| s.normalized_rate).collect();
    grouped_bars(
        &format!("Field Extraction Results: {}", report.model),
        "Match rate",
        &categories,
        &[
            ("Exact match".to_string(), exact),
            ("Normalized match".to_string(), normalized),
        ],
        1.0,
        true,
    )
}

/// One group per metric, one bar per model.
pub fn model_comparison_chart(results: &ModelMetrics) -> String {
    let metrics: Vec<String> = results
        .values()
        .flat_map(|m| m.keys().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let series: Vec<(String, Vec<f64>)> = results
        .iter()
        .map(|(model, values)| {
            let row = metrics.iter().map(|m| values.get(m).copied().unwrap_or(0.0)).collect();
            (model.clone(), row)
        })
        .collect();
    let y_max = series
        .iter()
        .flat_map(|(_, v)| v.iter().copied())
        .fold(1.0_f64, f64::max);
    grouped_bars("Model Comparison", "Score", &metrics, &series, y_max, false)
}

/// Rows are models, columns prompts; cells hold a score in `0..=1`.
pub fn model_prompt_heatmap(matrix: &ModelMetrics) -> String {
    let mut c = Canvas::new(WIDTH, HEIGHT, "Model-Prompt Performance Matrix");
    let prompts: Vec<&String> = matrix
        .values()
        .flat_map(|m| m.keys())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    if matrix.is_empty() || prompts.is_empty() {
        c.no_data();
        return c.finish();
    }
    let plot = Plot {
        left: 140.0,
        top: 60.0,
        width: WIDTH - 170.0,
        height: HEIGHT - 130.0,
    };
    let cell_w = plot.width / prompts.len() as f64;
    let cell_h = plot.height / matrix.len() as f64;
    for (ri, (model, scores)) in matrix.iter().enumerate() {
        let y = plot.top + ri as f64 * cell_h;
        c.text(plot.left - 8.0, y + cell_h / 2.0 + 4.0, "end", 12.0, model);
        for (ci, prompt) in prompts.iter().enumerate() {
            let x = plot.left + ci as f64 * cell_w;
            match scores.get(*prompt) {
                Some(v) => {
                    let v = v.clamp(0.0, 1.0);
                    c.rect(x, y, cell_w - 2.0, cell_h - 2.0, &heat_colour(v));
                    let fill = if v > 0.6 { "#ffffff" } else { "#222222" };
                    c.styled_text(
                        x + cell_w / 2.0,
                        y + cell_h / 2.0 + 4.0,
                        "middle",
                        12.0,
                        fill,
                        &format!("{:.2}", v),
                    );
                }
                None => {
                    c.rect(x, y, cell_w - 2.0, cell_h - 2.0, "#eeeeee");
                    c.text(x + cell_w / 2.0, y + cell_h / 2.0 + 4.0, "middle", 12.0, "-");
                }
            }
        }
    }
    for (ci, prompt) in prompts.iter().enumerate() {
        let x = plot.left + ci as f64 * cell_w + cell_w / 2.0;
        c.text(x, plot.bottom() + 18.0, "middle", 11.0, prompt);
    }
    c.text(plot.left + plot.width / 2.0, plot.bottom() + 40.0, "middle", 12.0, "Prompt Strategy");
    c.finish()
}

/// White to blue.
fn heat_colour(v: f64) -> String {
    let lerp = |from: f64, to: f64| (from + (to - from) * v).round() as u8;
    format!("#{:02x}{:02x}{:02x}", lerp(255.0, 33.0), lerp(255.0, 102.0), lerp(255.0, 172.0))
}

/// Metric bars on the left, invoice status counts on the right.
pub fn summary_dashboard(report: &RunReport) -> String {
    let width = 900.0;
    let mut c = Canvas::new(
        width,
        HEIGHT,
        &format!("Invoice Extraction Dashboard: {}", report.model),
    );

    let left = Plot {
        left: 200.0,
        top: 70.0,
        width: 300.0,
        height: HEIGHT - 120.0,
    };
    let metrics: Vec<(String, f64)> = report.metrics.iter().map(|(k, v)| (k.clone(), *v)).collect();
    let max = metrics.iter().map(|(_, v)| *v).fold(1.0_f64, f64::max);
    c.text(left.left + left.width / 2.0, 55.0, "middle", 13.0, "Metrics");
    horizontal_bars(&mut c, &left, &metrics, max, |v| format!("{:.3}", v));

    let right = Plot {
        left: 620.0,
        top: 70.0,
        width: 240.0,
        height: HEIGHT - 140.0,
    };
    let counts = [
        ("Succeeded", report.summary.succeeded, PALETTE[2]),
        ("Failed", report.summary.failed, PALETTE[3]),
    ];
    let total = report.summary.total.max(1) as f64;
    c.text(right.left + right.width / 2.0, 55.0, "middle", 13.0, "Invoices");
    let bar_w = right.width / counts.len() as f64;
    for (i, (label, count, colour)) in counts.iter().enumerate() {
        let h = right.height * *count as f64 / total;
        let x = right.left + i as f64 * bar_w;
        c.rect(x + bar_w * 0.15, right.bottom() - h, bar_w * 0.7, h, colour);
        c.text(x + bar_w / 2.0, right.bottom() - h - 6.0, "middle", 12.0, &count.to_string());
        c.text(x + bar_w / 2.0, right.bottom() + 18.0, "middle", 12.0, label);
    }
    c.finish()
}

/// Percentage of blank cells per ground-truth column.
pub fn missing_values_chart(table: &Table) -> String {
    let mut c = Canvas::new(WIDTH, HEIGHT, "Missing Values by Column");
    let rows = table.len().max(1) as f64;
    let items: Vec<(String, f64)> = table
        .missing_by_column()
        .into_iter()
        .map(|(col, n)| (col, n as f64 / rows * 100.0))
        .collect();
    let plot = Plot {
        left: 180.0,
        top: 60.0,
        width: WIDTH - 260.0,
        height: HEIGHT - 110.0,
    };
    horizontal_bars(&mut c, &plot, &items, 100.0, |v| format!("{:.1}%", v));
    c.finish()
}

/// `(lower, upper, count)` per bin. A constant series collapses into one bin.
pub fn histogram(values: &[f64], bins: usize) -> Vec<(f64, f64, usize)> {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    let (Some(min), Some(max)) = (
        finite.iter().copied().reduce(f64::min),
        finite.iter().copied().reduce(f64::max),
    ) else {
        return Vec::new();
    };
    if bins == 0 || (max - min).abs() < f64::EPSILON {
        return vec![(min, max, finite.len())];
    }
    let step = (max - min) / bins as f64;
    let mut counts = vec![0usize; bins];
    for v in &finite {
        let idx = (((v - min) / step) as usize).min(bins - 1);
        counts[idx] += 1;
    }
    counts
        .into_iter()
        .enumerate()
        .map(|(i, n)| (min + step * i as f64, min + step * (i + 1) as f64, n))
        .collect()
}

/// Distribution of valid `Total` values.
pub fn total_distribution_chart(table: &Table) -> String {
    let values: Vec<f64> = table
        .column(TOTAL_FIELD)
        .into_iter()
        .flatten()
        .filter_map(|v| validate_total_amount(v).ok())
        .filter_map(|v| v.parse().ok())
        .collect();
    let bins = histogram(&values, 10);
    let categories: Vec<String> = bins.iter().map(|(lo, _, _)| format!("{:.0}", lo)).collect();
    let counts: Vec<f64> = bins.iter().map(|(_, _, n)| *n as f64).collect();
    let y_max = counts.iter().copied().fold(1.0_f64, f64::max);
    grouped_bars(
        "Total Amount Distribution",
        "Invoices",
        &categories,
        &[("Invoices".to_string(), counts)],
        y_max,
        false,
    )
}

/// Mean normalized match rate over a run's fields.
pub fn run_score(report: &RunReport) -> f64 {
    let rates: Vec<f64> = report.summary.fields.values().map(|s| s.normalized_rate).collect();
    if rates.is_empty() {
        0.0
    } else {
        rates.iter().sum::<f64>() / rates.len() as f64
    }
}

/// Inputs for [`write_all_charts`]; every part is optional.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChartInputs<'a> {
    pub runs: &'a [RunReport],
    pub comparison: Option<&'a ModelMetrics>,
    pub ground_truth: Option<&'a Table>,
}

fn file_stem(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}

/// Write every chart the inputs allow and return the paths, in write order.
pub fn write_all_charts(out_dir: &Path, inputs: ChartInputs<'_>) -> anyhow::Result<Vec<PathBuf>> {
    std::fs::create_dir_all(out_dir)?;
    let mut written = Vec::new();
    let mut write = |name: String, body: String| -> anyhow::Result<()> {
        let path = out_dir.join(name);
        std::fs::write(&path, body)?;
        tracing::debug!(path = %path.display(), "chart written");
        written.push(path);
        Ok(())
    };

    for run in inputs.runs {
        let stem = file_stem(&run.model);
        write(format!("{}_fields.svg", stem), field_accuracy_chart(run))?;
        write(format!("{}_dashboard.svg", stem), summary_dashboard(run))?;
    }
    if !inputs.runs.is_empty() {
        let mut matrix = ModelMetrics::new();
        for run in inputs.runs {
            let prompt = run.prompt_name.clone().unwrap_or_else(|| run.prompt_category.clone());
            matrix.entry(run.model.clone()).or_default().insert(prompt, run_score(run));
        }
        write("model_prompt_heatmap.svg".into(), model_prompt_heatmap(&matrix))?;
    }
    if let Some(results) = inputs.comparison.filter(|r| !r.is_empty()) {
        write("model_comparison.svg".into(), model_comparison_chart(results))?;
    }
    if let Some(table) = inputs.ground_truth {
        write("gt_missing_values.svg".into(), missing_values_chart(table))?;
        write("gt_total_distribution.svg".into(), total_distribution_chart(table))?;
    }
    Ok(written)
}
