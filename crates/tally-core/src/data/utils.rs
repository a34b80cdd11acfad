//! Path and dataset sanity checks shared by the CLI and the loader.

use super::loader::is_image_path;
use super::table::Table;
use super::DataError;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

pub fn validate_directory_exists(path: &Path) -> Result<(), DataError> {
    if !path.exists() {
        return Err(DataError::DirectoryMissing(path.to_path_buf()));
    }
    if !path.is_dir() {
        return Err(DataError::NotADirectory(path.to_path_buf()));
    }
    Ok(())
}

pub fn validate_file_exists(path: &Path) -> Result<(), DataError> {
    if !path.exists() {
        return Err(DataError::FileMissing(path.to_path_buf()));
    }
    if !path.is_file() {
        return Err(DataError::NotAFile(path.to_path_buf()));
    }
    Ok(())
}

/// Read a CSV and make sure it has the given columns.
pub fn validate_csv_file(path: &Path, required_columns: &[&str]) -> Result<Table, DataError> {
    validate_file_exists(path)?;
    let table = Table::from_path(path).map_err(|e| {
        DataError::Validation(format!("Failed to read CSV file {}: {}", path.display(), e))
    })?;
    let missing: Vec<&str> = required_columns
        .iter()
        .copied()
        .filter(|c| !table.has_column(c))
        .collect();
    if !missing.is_empty() {
        return Err(DataError::Validation(format!(
            "CSV file {} missing required columns: {}",
            path.display(),
            missing.join(", ")
        )));
    }
    Ok(table)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImageDirectoryStats {
    pub total_images: usize,
    /// Keyed by lower-case extension with leading dot.
    pub by_extension: BTreeMap<String, usize>,
}

pub fn validate_image_directory(dir: &Path) -> Result<ImageDirectoryStats, DataError> {
    validate_directory_exists(dir)?;
    let entries = std::fs::read_dir(dir).map_err(|source| DataError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut stats = ImageDirectoryStats::default();
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() || !is_image_path(&path) {
            continue;
        }
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e.to_lowercase()))
            .unwrap_or_default();
        *stats.by_extension.entry(ext).or_default() += 1;
        stats.total_images += 1;
    }
    if stats.total_images == 0 {
        return Err(DataError::Validation(format!(
            "No image files found in {}",
            dir.display()
        )));
    }
    Ok(stats)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataStatistics {
    pub rows: usize,
    pub columns: Vec<String>,
    pub missing_values: BTreeMap<String, usize>,
    pub total_missing_values: usize,
    /// Share of missing cells per column, 0.0 to 1.0.
    pub missing_ratio: BTreeMap<String, f64>,
}

pub fn data_statistics(table: &Table) -> DataStatistics {
    let missing_values = table.missing_by_column();
    let rows = table.len();
    let missing_ratio = missing_values
        .iter()
        .map(|(k, v)| (k.clone(), crate::fields::ratio(*v, rows)))
        .collect();
    DataStatistics {
        rows,
        columns: table.headers().to_vec(),
        total_missing_values: missing_values.values().sum(),
        missing_values,
        missing_ratio,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::loader::test_support::write_png;

    #[test]
    fn directory_and_file_checks() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.csv");
        std::fs::write(&file, "x\n1\n").unwrap();
        assert!(validate_directory_exists(dir.path()).is_ok());
        assert!(matches!(
            validate_directory_exists(&file),
            Err(DataError::NotADirectory(_))
        ));
        assert!(matches!(
            validate_file_exists(dir.path()),
            Err(DataError::NotAFile(_))
        ));
        assert!(matches!(
            validate_file_exists(&dir.path().join("nope")),
            Err(DataError::FileMissing(_))
        ));
    }

    #[test]
    fn csv_columns_are_checked() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("gt.csv");
        std::fs::write(&file, "Invoice,Total\n1,2\n").unwrap();
        assert!(validate_csv_file(&file, &["Invoice"]).is_ok());
        let err = validate_csv_file(&file, &["Invoice", "Work Order Number"]).unwrap_err();
        assert!(err.to_string().ends_with("missing required columns: Work Order Number"));
    }

    #[test]
    fn image_directory_counts_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        write_png(&dir.path().join("1.png"), 2, 2);
        write_png(&dir.path().join("2.PNG"), 2, 2);
        std::fs::write(dir.path().join("3.jpg"), b"x").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        let stats = validate_image_directory(dir.path()).unwrap();
        assert_eq!(stats.total_images, 3);
        assert_eq!(stats.by_extension[".png"], 2);
        assert_eq!(stats.by_extension[".jpg"], 1);

        let empty = tempfile::tempdir().unwrap();
        assert!(validate_image_directory(empty.path()).is_err());
    }

    #[test]
    fn statistics_report_missing_ratio() {
        let t = Table::from_reader("a,b\n1,\n2,\n3,x\n4,y\n".as_bytes()).unwrap();
        let stats = data_statistics(&t);
        assert_eq!(stats.rows, 4);
        assert_eq!(stats.total_missing_values, 2);
        assert_eq!(stats.missing_ratio["b"], 0.5);
    }
}
