// Defect detector adapter boundary.
//
// A detector maps an RGB photo to a per-pixel class mask. The mask is an
// explicit typed value validated here; malformed model output is a typed
// error, and inference failures surface to the caller instead of degrading
// to an empty mask.

pub mod onnx;

pub use onnx::OnnxDetector;

use image::RgbImage;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("cannot load model {path}: {message}")]
    ModelLoad { path: PathBuf, message: String },
    #[error("inference failed: {0}")]
    Run(String),
    #[error("unexpected model output shape {0:?}")]
    OutputShape(Vec<usize>),
    #[error("class data length {len} does not match mask dimensions {width}x{height}")]
    DimensionMismatch { len: usize, width: u32, height: u32 },
}

/// Per-pixel class indices, row-major. Class 0 is background.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassMask {
    width: u32,
    height: u32,
    classes: Vec<u8>,
}

impl ClassMask {
    pub fn new(width: u32, height: u32, classes: Vec<u8>) -> Result<Self, InferenceError> {
        if classes.len() != (width as usize) * (height as usize) {
            return Err(InferenceError::DimensionMismatch {
                len: classes.len(),
                width,
                height,
            });
        }
        Ok(Self {
            width,
            height,
            classes,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn classes(&self) -> &[u8] {
        &self.classes
    }

    pub fn class_at(&self, x: u32, y: u32) -> u8 {
        self.classes[(y * self.width + x) as usize]
    }

    pub fn max_class(&self) -> u8 {
        self.classes.iter().copied().max().unwrap_or(0)
    }

    /// Nearest-neighbor resample to the target dimensions.
    pub fn resize_nearest(&self, width: u32, height: u32) -> ClassMask {
        if width == self.width && height == self.height {
            return self.clone();
        }
        let mut classes = Vec::with_capacity((width as usize) * (height as usize));
        for y in 0..height {
            let sy = (u64::from(y) * u64::from(self.height) / u64::from(height)) as u32;
            for x in 0..width {
                let sx = (u64::from(x) * u64::from(self.width) / u64::from(width)) as u32;
                classes.push(self.class_at(sx, sy));
            }
        }
        ClassMask {
            width,
            height,
            classes,
        }
    }
}

pub trait Detector: Send {
    fn infer(&mut self, image: &RgbImage) -> Result<ClassMask, InferenceError>;
}

/// Builds one detector instance per worker thread; sessions are not shared
/// across threads.
pub type DetectorFactory =
    Arc<dyn Fn() -> Result<Box<dyn Detector>, InferenceError> + Send + Sync>;
