// ONNX Runtime adapter for semantic-segmentation defect models.
//
// Models take one NCHW float tensor scaled to [0, 1] and emit per-class
// logits [1, C, H, W]; argmax over C gives the class mask.

use image::{imageops::FilterType, RgbImage};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;

use super::{ClassMask, Detector, InferenceError};

const DEFAULT_INPUT_SIZE: u32 = 512;

pub struct OnnxDetector {
    session: Session,
    input_name: String,
    input_width: u32,
    input_height: u32,
}

impl OnnxDetector {
    pub fn new(model_path: &Path) -> Result<Self, InferenceError> {
        let load = |message: String| InferenceError::ModelLoad {
            path: model_path.to_path_buf(),
            message,
        };

        // One intra-op thread per session; parallelism comes from the worker
        // pool running one session per thread.
        let session = Session::builder()
            .and_then(|builder| Ok(builder.with_intra_threads(1)?))
            .and_then(|mut builder| builder.commit_from_file(model_path))
            .map_err(|e| load(e.to_string()))?;

        let input_name = session
            .inputs()
            .first()
            .map(|input| input.name().to_string())
            .ok_or_else(|| load("model has no inputs".to_string()))?;

        Ok(Self {
            session,
            input_name,
            input_width: DEFAULT_INPUT_SIZE,
            input_height: DEFAULT_INPUT_SIZE,
        })
    }

}

impl Detector for OnnxDetector {
    fn infer(&mut self, image: &RgbImage) -> Result<ClassMask, InferenceError> {
        let input = to_nchw(image, self.input_width, self.input_height);
        let tensor =
            TensorRef::from_array_view(&input).map_err(|e| InferenceError::Run(e.to_string()))?;
        let name = self.input_name.clone();

        let outputs = self
            .session
            .run(ort::inputs![name.as_str() => tensor])
            .map_err(|e| InferenceError::Run(e.to_string()))?;

        let (_, value) = outputs
            .iter()
            .next()
            .ok_or_else(|| InferenceError::Run("model produced no outputs".to_string()))?;
        let (shape, data) = value
            .try_extract_tensor::<f32>()
            .map_err(|e| InferenceError::Run(e.to_string()))?;

        let dims: Vec<usize> = shape.iter().map(|d| *d as usize).collect();
        collapse_to_classes(&dims, data)
    }
}

/// Resize and repack an RGB image as a [1, 3, H, W] tensor scaled to [0, 1].
fn to_nchw(image: &RgbImage, width: u32, height: u32) -> Array4<f32> {
    let resized = image::imageops::resize(image, width, height, FilterType::Triangle);
    let mut input = Array4::<f32>::zeros((1, 3, height as usize, width as usize));
    for (x, y, pixel) in resized.enumerate_pixels() {
        for channel in 0..3 {
            input[[0, channel, y as usize, x as usize]] = f32::from(pixel[channel]) / 255.0;
        }
    }
    input
}

/// Argmax over the class axis of a [1, C, H, W] logit tensor.
fn collapse_to_classes(dims: &[usize], data: &[f32]) -> Result<ClassMask, InferenceError> {
    let [batch, channels, height, width] = dims else {
        return Err(InferenceError::OutputShape(dims.to_vec()));
    };
    if *batch != 1 || *channels == 0 || data.len() != channels * height * width {
        return Err(InferenceError::OutputShape(dims.to_vec()));
    }

    let plane = height * width;
    let mut classes = vec![0u8; plane];
    for (i, class) in classes.iter_mut().enumerate() {
        let mut best = 0usize;
        let mut best_score = data[i];
        for c in 1..*channels {
            let score = data[c * plane + i];
            if score > best_score {
                best_score = score;
                best = c;
            }
        }
        *class = best as u8;
    }

    ClassMask::new(*width as u32, *height as u32, classes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nchw_layout_and_scaling() {
        let mut image = RgbImage::new(2, 2);
        image.put_pixel(0, 0, image::Rgb([255, 0, 51]));
        let input = to_nchw(&image, 2, 2);
        assert_eq!(input.shape(), &[1, 3, 2, 2]);
        assert!((input[[0, 0, 0, 0]] - 1.0).abs() < 1e-6);
        assert!((input[[0, 1, 0, 0]]).abs() < 1e-6);
        assert!((input[[0, 2, 0, 0]] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn argmax_picks_strongest_class() {
        // 2 classes over a 2x2 map; class 1 wins on the right column
        let data = [
            0.9, 0.1, //
            0.8, 0.2, // class 0 scores
            0.1, 0.9, //
            0.2, 0.8, // class 1 scores
        ];
        let mask = collapse_to_classes(&[1, 2, 2, 2], &data).unwrap();
        assert_eq!(mask.classes(), &[0, 1, 0, 1]);
    }

    #[test]
    fn non_segmentation_output_is_rejected() {
        let err = collapse_to_classes(&[1, 84, 8400], &[0.0; 10]).unwrap_err();
        assert!(matches!(err, InferenceError::OutputShape(_)));

        let err = collapse_to_classes(&[2, 2, 2, 2], &[0.0; 16]).unwrap_err();
        assert!(matches!(err, InferenceError::OutputShape(_)));
    }
}
