use super::{ValidationReport, Validator};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// File-level checks on invoice images: existence, extension, size on disk
/// and minimum pixel dimensions.
#[derive(Debug, Clone)]
pub struct ImageValidator {
    pub min_width: u32,
    pub min_height: u32,
    pub max_size_mb: f64,
    pub allowed_formats: Vec<String>,
    report: ValidationReport,
}

impl Default for ImageValidator {
    fn default() -> Self {
        Self {
            min_width: 500,
            min_height: 500,
            max_size_mb: 10.0,
            allowed_formats: vec![".jpg".into(), ".jpeg".into(), ".png".into()],
            report: ValidationReport::new(true),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImageInfo {
    pub path: PathBuf,
    pub exists: bool,
    pub size_mb: f64,
    pub format: String,
    pub valid: bool,
    pub width: u32,
    pub height: u32,
    pub aspect_ratio: Option<f64>,
    pub mode: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchEntry {
    pub valid: bool,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub total: usize,
    pub valid: usize,
    pub invalid: usize,
    pub invalid_paths: Vec<String>,
    pub details: BTreeMap<String, BatchEntry>,
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_lowercase()))
        .unwrap_or_default()
}

impl ImageValidator {
    pub fn with_min_size(mut self, width: u32, height: u32) -> Self {
        self.min_width = width;
        self.min_height = height;
        self
    }

    pub fn with_max_size_mb(mut self, max: f64) -> Self {
        self.max_size_mb = max;
        self
    }

    pub fn get_image_info(&self, path: &Path) -> ImageInfo {
        let mut info = ImageInfo {
            path: path.to_path_buf(),
            exists: path.exists(),
            format: extension(path),
            ..ImageInfo::default()
        };
        if !info.exists {
            return info;
        }
        info.size_mb = std::fs::metadata(path)
            .map(|m| m.len() as f64 / BYTES_PER_MB)
            .unwrap_or(0.0);
        match image::open(path) {
            Ok(img) => {
                info.width = img.width();
                info.height = img.height();
                info.aspect_ratio =
                    (img.height() > 0).then(|| img.width() as f64 / img.height() as f64);
                info.mode = Some(format!("{:?}", img.color()));
                info.valid = true;
            }
            Err(e) => tracing::error!(path = %path.display(), error = %e, "cannot read image info"),
        }
        info
    }

    pub fn validate_batch<P: AsRef<Path>>(&mut self, paths: &[P]) -> BatchReport {
        let mut batch = BatchReport {
            total: paths.len(),
            ..BatchReport::default()
        };
        for path in paths {
            let path = path.as_ref();
            let key = path.display().to_string();
            let valid = self.validate(path);
            batch.details.insert(
                key.clone(),
                BatchEntry {
                    valid,
                    errors: if valid { Vec::new() } else { self.errors().to_vec() },
                },
            );
            if valid {
                batch.valid += 1;
            } else {
                batch.invalid += 1;
                batch.invalid_paths.push(key);
            }
        }
        batch
    }
}

impl Validator<Path> for ImageValidator {
    fn validate(&mut self, path: &Path) -> bool {
        self.report.clear();
        if !path.exists() {
            self.report
                .error(format!("Image file does not exist: {}", path.display()));
            return false;
        }

        let ext = extension(path);
        if !self.allowed_formats.iter().any(|f| f.eq_ignore_ascii_case(&ext)) {
            self.report.error(format!(
                "Invalid image format: {}. Allowed formats: {}",
                ext,
                self.allowed_formats.join(", ")
            ));
            return false;
        }

        let size_mb = std::fs::metadata(path)
            .map(|m| m.len() as f64 / BYTES_PER_MB)
            .unwrap_or(0.0);
        if size_mb > self.max_size_mb {
            self.report.error(format!(
                "Image file too large: {:.2} MB. Maximum allowed: {} MB",
                size_mb, self.max_size_mb
            ));
            return false;
        }

        match image::image_dimensions(path) {
            Ok((width, height)) => {
                if width < self.min_width {
                    self.report.error(format!(
                        "Image width too small: {}px. Minimum required: {}px",
                        width, self.min_width
                    ));
                }
                if height < self.min_height {
                    self.report.error(format!(
                        "Image height too small: {}px. Minimum required: {}px",
                        height, self.min_height
                    ));
                }
            }
            Err(_) => self
                .report
                .error(format!("Cannot identify image format: {}", path.display())),
        }

        let valid = self.report.valid();
        tracing::debug!(path = %path.display(), valid, "image validation finished");
        valid
    }

    fn report(&self) -> &ValidationReport {
        &self.report
    }

    fn clear_errors(&mut self) {
        self.report.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::loader::test_support::write_png;

    #[test]
    fn small_images_fail_with_both_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("a.png");
        write_png(&p, 10, 20);
        let mut v = ImageValidator::default();
        assert!(!v.validate(p.as_path()));
        assert_eq!(v.errors().len(), 2);
        assert_eq!(v.errors()[0], "Image width too small: 10px. Minimum required: 500px");
    }

    #[test]
    fn batch_counts_valid_and_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.png");
        write_png(&good, 16, 16);
        let text = dir.path().join("notes.txt");
        std::fs::write(&text, "hi").unwrap();
        let corrupt = dir.path().join("broken.jpg");
        std::fs::write(&corrupt, b"not an image").unwrap();
        let missing = dir.path().join("missing.png");

        let mut v = ImageValidator::default().with_min_size(8, 8);
        let batch = v.validate_batch(&[&good, &text, &corrupt, &missing]);
        assert_eq!(batch.total, 4);
        assert_eq!(batch.valid, 1);
        assert_eq!(batch.invalid, 3);
        let text_errors = &batch.details[&text.display().to_string()].errors;
        assert!(text_errors[0].starts_with("Invalid image format: .txt"));
        let corrupt_errors = &batch.details[&corrupt.display().to_string()].errors;
        assert!(corrupt_errors[0].starts_with("Cannot identify image format"));
    }

    #[test]
    fn oversized_files_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("big.png");
        write_png(&p, 64, 64);
        let mut v = ImageValidator::default().with_min_size(1, 1).with_max_size_mb(0.0);
        assert!(!v.validate(p.as_path()));
        assert!(v.errors()[0].starts_with("Image file too large"));
    }

    #[test]
    fn info_reports_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("a.png");
        write_png(&p, 40, 20);
        let info = ImageValidator::default().get_image_info(&p);
        assert!(info.valid);
        assert_eq!((info.width, info.height), (40, 20));
        assert_eq!(info.aspect_ratio, Some(2.0));
        assert_eq!(info.mode.as_deref(), Some("Rgb8"));
        assert!(!ImageValidator::default().get_image_info(&dir.path().join("x.png")).exists);
    }
}
