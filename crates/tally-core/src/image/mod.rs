//! Image preprocessing applied before an invoice is sent to a model.

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use std::io::Cursor;

#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("Invalid image provided: {0}")]
    Invalid(String),
    #[error("Failed to process image: {0}")]
    Processing(String),
    #[error("Failed to process image at index {index}: {source}")]
    Batch {
        index: usize,
        #[source]
        source: Box<ImageError>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorMode {
    #[default]
    Rgb,
    Grayscale,
}

/// Enhancement factors, 1.0 meaning unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Enhancements {
    #[serde(default)]
    pub contrast: Option<f32>,
    #[serde(default)]
    pub brightness: Option<f32>,
    #[serde(default)]
    pub sharpness: Option<f32>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageProcessorConfig {
    #[serde(default)]
    pub target_size: Option<(u32, u32)>,
    #[serde(default)]
    pub color_mode: ColorMode,
    #[serde(default = "default_true")]
    pub maintain_aspect_ratio: bool,
    #[serde(default)]
    pub normalize: bool,
    #[serde(default)]
    pub enhancements: Enhancements,
}

impl Default for ImageProcessorConfig {
    fn default() -> Self {
        Self {
            target_size: None,
            color_mode: ColorMode::Rgb,
            maintain_aspect_ratio: true,
            normalize: false,
            enhancements: Enhancements::default(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ImageProcessor {
    config: ImageProcessorConfig,
}

impl ImageProcessor {
    pub fn new(config: ImageProcessorConfig) -> Result<Self, ImageError> {
        if let Some((w, h)) = config.target_size {
            if w == 0 || h == 0 {
                return Err(ImageError::Invalid(format!(
                    "target_size must be positive, got {}x{}",
                    w, h
                )));
            }
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &ImageProcessorConfig {
        &self.config
    }

    pub fn preprocess(&self, image: &DynamicImage) -> Result<DynamicImage, ImageError> {
        let (w, h) = image.dimensions();
        if w == 0 || h == 0 {
            return Err(ImageError::Invalid("image has zero width or height".into()));
        }

        let mut out = match self.config.color_mode {
            ColorMode::Rgb => DynamicImage::ImageRgb8(image.to_rgb8()),
            ColorMode::Grayscale => DynamicImage::ImageLuma8(image.to_luma8()),
        };

        if let Some((tw, th)) = self.config.target_size {
            out = if self.config.maintain_aspect_ratio {
                pad_to(&out.resize(tw, th, FilterType::Lanczos3), tw, th, self.config.color_mode)
            } else {
                out.resize_exact(tw, th, FilterType::Lanczos3)
            };
        }

        if self.config.normalize {
            out = stretch_contrast(&out);
        }

        let e = &self.config.enhancements;
        if let Some(c) = e.contrast {
            out = out.adjust_contrast((c - 1.0) * 100.0);
        }
        if let Some(b) = e.brightness {
            out = out.brighten(((b - 1.0) * 255.0).round() as i32);
        }
        if let Some(s) = e.sharpness {
            if s > 1.0 {
                out = out.unsharpen(s - 1.0, 0);
            } else if s < 1.0 {
                out = out.blur(1.0 - s);
            }
        }
        Ok(out)
    }

    pub fn batch_preprocess(
        &self,
        images: &[DynamicImage],
    ) -> Result<Vec<DynamicImage>, ImageError> {
        images
            .iter()
            .enumerate()
            .map(|(index, img)| {
                self.preprocess(img).map_err(|e| ImageError::Batch {
                    index,
                    source: Box::new(e),
                })
            })
            .collect()
    }
}

/// Center `img` on a white canvas of the given size.
fn pad_to(img: &DynamicImage, width: u32, height: u32, mode: ColorMode) -> DynamicImage {
    let mut canvas = RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255]));
    let x = (width.saturating_sub(img.width())) / 2;
    let y = (height.saturating_sub(img.height())) / 2;
    image::imageops::overlay(&mut canvas, &img.to_rgba8(), i64::from(x), i64::from(y));
    let canvas = DynamicImage::ImageRgba8(canvas);
    match mode {
        ColorMode::Rgb => DynamicImage::ImageRgb8(canvas.to_rgb8()),
        ColorMode::Grayscale => DynamicImage::ImageLuma8(canvas.to_luma8()),
    }
}

/// Linearly map the darkest channel value to 0 and the brightest to 255.
fn stretch_contrast(img: &DynamicImage) -> DynamicImage {
    let luma = img.to_luma8();
    let (lo, hi) = luma
        .pixels()
        .fold((u8::MAX, u8::MIN), |(lo, hi), p| (lo.min(p[0]), hi.max(p[0])));
    if hi <= lo {
        return img.clone();
    }
    let scale = 255.0 / f32::from(hi - lo);
    let map = |v: u8| ((f32::from(v.saturating_sub(lo))) * scale).round().min(255.0) as u8;
    match img {
        DynamicImage::ImageLuma8(g) => {
            let mut g = g.clone();
            g.pixels_mut().for_each(|p| p[0] = map(p[0]));
            DynamicImage::ImageLuma8(g)
        }
        other => {
            let mut rgb = other.to_rgb8();
            rgb.pixels_mut().for_each(|p| {
                for c in p.0.iter_mut() {
                    *c = map(*c);
                }
            });
            DynamicImage::ImageRgb8(rgb)
        }
    }
}

pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, ImageError> {
    let mut buf = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .map_err(|e| ImageError::Processing(e.to_string()))?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, RgbImage};

    fn sample(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(w, h, |x, _| {
            let v = (100 + (x % 50)) as u8;
            image::Rgb([v, v, v])
        }))
    }

    #[test]
    fn resize_keeps_aspect_and_pads() {
        let p = ImageProcessor::new(ImageProcessorConfig {
            target_size: Some((100, 100)),
            ..Default::default()
        })
        .unwrap();
        let out = p.preprocess(&sample(200, 100)).unwrap();
        assert_eq!(out.dimensions(), (100, 100));
        let rgb = out.to_rgb8();
        assert_eq!(rgb.get_pixel(50, 0).0, [255, 255, 255]);
    }

    #[test]
    fn resize_exact_when_aspect_not_kept() {
        let p = ImageProcessor::new(ImageProcessorConfig {
            target_size: Some((30, 40)),
            maintain_aspect_ratio: false,
            color_mode: ColorMode::Grayscale,
            ..Default::default()
        })
        .unwrap();
        let out = p.preprocess(&sample(10, 10)).unwrap();
        assert_eq!(out.dimensions(), (30, 40));
        assert!(matches!(out, DynamicImage::ImageLuma8(_)));
    }

    #[test]
    fn normalize_stretches_range() {
        let p = ImageProcessor::new(ImageProcessorConfig {
            normalize: true,
            color_mode: ColorMode::Grayscale,
            ..Default::default()
        })
        .unwrap();
        let out = p.preprocess(&sample(60, 2)).unwrap().to_luma8();
        let lo = out.pixels().map(|p| p[0]).min().unwrap();
        let hi = out.pixels().map(|p| p[0]).max().unwrap();
        assert_eq!((lo, hi), (0, 255));
    }

    #[test]
    fn zero_sized_inputs_rejected() {
        assert!(ImageProcessor::new(ImageProcessorConfig {
            target_size: Some((0, 10)),
            ..Default::default()
        })
        .is_err());
        let p = ImageProcessor::default();
        let empty = DynamicImage::ImageLuma8(image::GrayImage::from_pixel(0, 0, Luma([0])));
        let err = p.batch_preprocess(&[sample(2, 2), empty]).unwrap_err();
        assert!(err.to_string().starts_with("Failed to process image at index 1"));
    }

    #[test]
    fn png_encoding_round_trips_dimensions() {
        let bytes = encode_png(&sample(7, 3)).unwrap();
        let back = image::load_from_memory(&bytes).unwrap();
        assert_eq!(back.dimensions(), (7, 3));
    }
}
