use crate::evaluation::RunReport;
use std::collections::BTreeMap;
use std::path::Path;

pub fn write_run_json(report: &RunReport, out: &Path) -> anyhow::Result<()> {
    if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(out, serde_json::to_string_pretty(report)?)?;
    Ok(())
}

/// `{"models": {...}, "best": {metric: model}}` for `tally compare --format json`.
pub fn comparison_json(results: &BTreeMap<String, BTreeMap<String, f64>>) -> serde_json::Value {
    let mut best: BTreeMap<&str, (&str, f64)> = BTreeMap::new();
    for (model, metrics) in results {
        for (metric, value) in metrics {
            let entry = best.entry(metric.as_str()).or_insert((model.as_str(), *value));
            if *value > entry.1 {
                *entry = (model.as_str(), *value);
            }
        }
    }
    let best: BTreeMap<&str, &str> = best.into_iter().map(|(k, (m, _))| (k, m)).collect();
    serde_json::json!({
        "models": results,
        "best": best,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn best_model_per_metric() {
        let mut results = BTreeMap::new();
        results.insert("a".to_string(), BTreeMap::from([("accuracy".to_string(), 0.5)]));
        results.insert("b".to_string(), BTreeMap::from([("accuracy".to_string(), 0.9)]));
        let v = comparison_json(&results);
        assert_eq!(v["best"]["accuracy"], "b");
        assert_eq!(v["models"]["a"]["accuracy"], 0.5);
    }
}
