use super::ground_truth::GroundTruthManager;
use super::table::Table;
use super::DataError;
use crate::fields::FieldMap;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Raw invoice image as read from disk.
#[derive(Clone, Serialize)]
pub struct InvoiceImage {
    pub invoice_id: String,
    pub path: PathBuf,
    #[serde(skip)]
    pub bytes: Arc<Vec<u8>>,
    pub width: u32,
    pub height: u32,
    pub format: String,
}

impl std::fmt::Debug for InvoiceImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvoiceImage")
            .field("invoice_id", &self.invoice_id)
            .field("path", &self.path)
            .field("bytes", &self.bytes.len())
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .finish()
    }
}

impl InvoiceImage {
    pub fn from_bytes(
        invoice_id: impl Into<String>,
        path: impl Into<PathBuf>,
        bytes: Vec<u8>,
    ) -> Result<Self, DataError> {
        let path = path.into();
        let load_err = |reason: String| DataError::ImageLoad {
            path: path.clone(),
            reason,
        };
        let reader = image::ImageReader::new(Cursor::new(&bytes))
            .with_guessed_format()
            .map_err(|e| load_err(e.to_string()))?;
        let format = reader
            .format()
            .map(|f| format!("{:?}", f).to_lowercase())
            .ok_or_else(|| load_err("unrecognized image format".into()))?;
        let (width, height) = reader
            .into_dimensions()
            .map_err(|e| load_err(e.to_string()))?;
        Ok(Self {
            invoice_id: invoice_id.into(),
            path,
            bytes: Arc::new(bytes),
            width,
            height,
            format,
        })
    }

    pub fn decode(&self) -> Result<image::DynamicImage, DataError> {
        image::load_from_memory(&self.bytes).map_err(|e| DataError::ImageLoad {
            path: self.path.clone(),
            reason: e.to_string(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct InvoiceData {
    pub image: Arc<InvoiceImage>,
    pub ground_truth: FieldMap,
}

/// Pairs invoice images under `images/` with rows of `ground_truth.csv`.
#[derive(Debug)]
pub struct DataLoader {
    data_dir: PathBuf,
    image_dir: PathBuf,
    ground_truth: GroundTruthManager,
    cache_enabled: bool,
    images: Mutex<HashMap<String, Arc<InvoiceImage>>>,
}

impl DataLoader {
    pub fn new(
        data_dir: impl Into<PathBuf>,
        image_dir: Option<PathBuf>,
        ground_truth_path: Option<PathBuf>,
        cache_enabled: bool,
    ) -> Result<Self, DataError> {
        let data_dir = data_dir.into();
        let image_dir = image_dir.unwrap_or_else(|| data_dir.join("images"));
        let gt_path = ground_truth_path.unwrap_or_else(|| data_dir.join("ground_truth.csv"));
        if !image_dir.is_dir() {
            return Err(DataError::ImageDirNotFound(image_dir));
        }
        if !gt_path.is_file() {
            return Err(DataError::GroundTruthNotFound(gt_path));
        }
        let ground_truth = GroundTruthManager::new(gt_path, None, cache_enabled)?;
        Ok(Self {
            data_dir,
            image_dir,
            ground_truth,
            cache_enabled,
            images: Mutex::new(HashMap::new()),
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn image_dir(&self) -> &Path {
        &self.image_dir
    }

    pub fn ground_truth(&self) -> &GroundTruthManager {
        &self.ground_truth
    }

    /// First existing `<id>.<ext>` under the image directory.
    pub fn image_path(&self, invoice_id: &str) -> Option<PathBuf> {
        IMAGE_EXTENSIONS
            .iter()
            .map(|ext| self.image_dir.join(format!("{}.{}", invoice_id, ext)))
            .find(|p| p.is_file())
    }

    pub fn load_image(&self, invoice_id: &str) -> Result<Arc<InvoiceImage>, DataError> {
        if self.cache_enabled {
            if let Some(hit) = self.cache().get(invoice_id) {
                tracing::debug!(invoice_id, "image cache hit");
                return Ok(hit.clone());
            }
        }
        let path = self
            .image_path(invoice_id)
            .ok_or_else(|| DataError::ImageNotFound(invoice_id.to_string()))?;
        let bytes = std::fs::read(&path).map_err(|source| DataError::Io {
            path: path.clone(),
            source,
        })?;
        let image = Arc::new(InvoiceImage::from_bytes(invoice_id, path, bytes)?);
        if self.cache_enabled {
            self.cache().insert(invoice_id.to_string(), image.clone());
        }
        Ok(image)
    }

    pub fn load_ground_truth(&self) -> Result<Arc<Table>, DataError> {
        self.ground_truth.get_validated_data()
    }

    /// Invoice ids that have both an image and a ground truth row, sorted.
    pub fn get_available_invoice_ids(&self) -> Result<Vec<String>, DataError> {
        let stems = image_stems(&self.image_dir)?;
        let ids: BTreeSet<String> = self.ground_truth.invoice_ids()?.into_iter().collect();
        Ok(stems.intersection(&ids).cloned().collect())
    }

    pub fn get_invoice_data(&self, invoice_id: &str) -> Result<InvoiceData, DataError> {
        Ok(InvoiceData {
            image: self.load_image(invoice_id)?,
            ground_truth: self.ground_truth.get_ground_truth(invoice_id)?,
        })
    }

    pub fn clear_cache(&self) {
        self.cache().clear();
        self.ground_truth.clear_cache();
    }

    fn cache(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<InvoiceImage>>> {
        self.images.lock().unwrap_or_else(|e| e.into_inner())
    }
}

pub fn is_image_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn image_stems(dir: &Path) -> Result<BTreeSet<String>, DataError> {
    let entries = std::fs::read_dir(dir).map_err(|source| DataError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut stems = BTreeSet::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_file() && is_image_path(&path) {
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                stems.insert(stem.to_string());
            }
        }
    }
    Ok(stems)
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::Path;

    pub fn write_png(path: &Path, width: u32, height: u32) {
        let img = image::RgbImage::from_pixel(width, height, image::Rgb([255, 255, 255]));
        img.save(path).unwrap();
    }

    pub fn dataset(dir: &Path, ids: &[&str], csv: &str) {
        let images = dir.join("images");
        std::fs::create_dir_all(&images).unwrap();
        for id in ids {
            write_png(&images.join(format!("{}.png", id)), 8, 6);
        }
        std::fs::write(dir.join("ground_truth.csv"), csv).unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::dataset;
    use super::*;

    const GT: &str = "Invoice,Work Order Number,Total\n1001,01234,10\n1002,AB123,20\n1003,XY999,30\n";

    #[test]
    fn missing_directories_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = DataLoader::new(dir.path(), None, None, true).unwrap_err();
        assert!(err.to_string().starts_with("Image directory not found"));

        std::fs::create_dir(dir.path().join("images")).unwrap();
        let err = DataLoader::new(dir.path(), None, None, true).unwrap_err();
        assert!(err.to_string().starts_with("Ground truth file not found"));
    }

    #[test]
    fn available_ids_intersect_images_and_ground_truth() {
        let dir = tempfile::tempdir().unwrap();
        dataset(dir.path(), &["1003", "1001", "7777"], GT);
        let loader = DataLoader::new(dir.path(), None, None, true).unwrap();
        assert_eq!(loader.get_available_invoice_ids().unwrap(), vec!["1001", "1003"]);
    }

    #[test]
    fn loads_image_with_dimensions_and_caches() {
        let dir = tempfile::tempdir().unwrap();
        dataset(dir.path(), &["1001"], GT);
        let loader = DataLoader::new(dir.path(), None, None, true).unwrap();
        let first = loader.load_image("1001").unwrap();
        assert_eq!((first.width, first.height), (8, 6));
        assert_eq!(first.format, "png");
        let second = loader.load_image("1001").unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let err = loader.load_image("1002").unwrap_err();
        assert_eq!(err.to_string(), "Image not found for invoice 1002");
    }

    #[test]
    fn invoice_data_pairs_image_and_fields() {
        let dir = tempfile::tempdir().unwrap();
        dataset(dir.path(), &["1002"], GT);
        let loader = DataLoader::new(dir.path(), None, None, false).unwrap();
        let data = loader.get_invoice_data("1002").unwrap();
        assert_eq!(data.ground_truth["Total"], "20.00");
        assert_eq!(data.image.invoice_id, "1002");
    }
}
