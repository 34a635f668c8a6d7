//! Brain-scan classification boundary.
//!
//! Scans are resized to the model's declared input shape, converted to RGB (or
//! luma for single-channel models) and scaled to `[0, 1]`. The model returns a
//! single sigmoid score; scores above `0.5` mean a tumor was detected. No
//! network ships with this crate: callers provide a [`ScanModel`].

use std::path::Path;

use image::imageops::FilterType;
use image::{DynamicImage, ImageReader};
use ndarray::{Array3, ArrayView3};
use serde::Serialize;
use thiserror::Error;

pub const TUMOR_THRESHOLD: f32 = 0.5;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Failed to open scan '{path}': {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to decode scan image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("Unsupported input shape {height}x{width}x{channels}; expected 1 or 3 channels.")]
    UnsupportedShape {
        height: u32,
        width: u32,
        channels: usize,
    },
    #[error("Scan model produced a non-finite or out-of-range score {0}.")]
    InvalidScore(f32),
    #[error("Scan model failed: {0}")]
    Model(String),
}

/// Height, width and channel count the model consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InputShape {
    pub height: u32,
    pub width: u32,
    pub channels: usize,
}

impl Default for InputShape {
    fn default() -> Self {
        InputShape {
            height: 128,
            width: 128,
            channels: 3,
        }
    }
}

/// A fitted image classifier with a single sigmoid output.
pub trait ScanModel: Send + Sync {
    fn input_shape(&self) -> InputShape;

    /// Score in `[0, 1]` for a `(height, width, channels)` tensor.
    fn predict(&self, pixels: ArrayView3<f32>) -> Result<f32, ScanError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScanResult {
    pub tumor_detected: bool,
    pub score: f32,
}

pub fn load_scan(path: &Path) -> Result<DynamicImage, ScanError> {
    let reader = ImageReader::open(path)
        .map_err(|source| ScanError::Open {
            path: path.display().to_string(),
            source,
        })?
        .with_guessed_format()
        .map_err(|source| ScanError::Open {
            path: path.display().to_string(),
            source,
        })?;
    Ok(reader.decode()?)
}

/// Resizes and normalizes a scan into a `(height, width, channels)` tensor.
pub fn preprocess_scan(image: &DynamicImage, shape: InputShape) -> Result<Array3<f32>, ScanError> {
    let resized = image.resize_exact(shape.width, shape.height, FilterType::CatmullRom);
    let (height, width) = (shape.height as usize, shape.width as usize);
    let raw = match shape.channels {
        3 => resized.to_rgb8().into_raw(),
        1 => resized.to_luma8().into_raw(),
        channels => {
            return Err(ScanError::UnsupportedShape {
                height: shape.height,
                width: shape.width,
                channels,
            });
        }
    };
    let pixels: Vec<f32> = raw.into_iter().map(|p| f32::from(p) / 255.0).collect();
    Array3::from_shape_vec((height, width, shape.channels), pixels).map_err(|e| {
        ScanError::Model(format!("pixel buffer does not match input shape: {e}"))
    })
}

pub fn classify_scan(model: &dyn ScanModel, image: &DynamicImage) -> Result<ScanResult, ScanError> {
    let pixels = preprocess_scan(image, model.input_shape())?;
    let score = model.predict(pixels.view())?;
    if !score.is_finite() || !(0.0..=1.0).contains(&score) {
        return Err(ScanError::InvalidScore(score));
    }
    Ok(ScanResult {
        tumor_detected: score > TUMOR_THRESHOLD,
        score,
    })
}
