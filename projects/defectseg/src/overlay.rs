// Overlay rendering: blend a class mask over the source photo and
// optionally persist the mask itself.

use anyhow::{anyhow, Context, Result};
use image::{GrayImage, Rgb, RgbImage};
use std::path::Path;

use crate::config::DefectKind;
use crate::detector::ClassMask;

// Stains are a single class drawn red; crack models emit several classes,
// cycled over a fixed palette.
const CRACK_PALETTE: [[u8; 3]; 4] = [
    [253, 231, 37],
    [94, 201, 98],
    [33, 145, 140],
    [59, 82, 139],
];

fn class_color(kind: DefectKind, class: u8) -> Rgb<u8> {
    match kind {
        DefectKind::Stain => Rgb([255, 0, 0]),
        DefectKind::Crack => {
            let index = (class as usize - 1) % CRACK_PALETTE.len();
            Rgb(CRACK_PALETTE[index])
        }
    }
}

#[derive(Debug, Clone)]
pub struct OverlayRenderer {
    kind: DefectKind,
    alpha: f32,
}

impl OverlayRenderer {
    pub fn new(kind: DefectKind, alpha: f32) -> Self {
        Self { kind, alpha }
    }

    /// Blend the detected classes over the original image. The mask is
    /// resampled to the photo dimensions with nearest-neighbor; background
    /// pixels pass through untouched.
    pub fn render(&self, original: &RgbImage, mask: &ClassMask) -> RgbImage {
        let resized = mask.resize_nearest(original.width(), original.height());
        let mut overlay = original.clone();
        for (x, y, pixel) in overlay.enumerate_pixels_mut() {
            let class = resized.class_at(x, y);
            if class == 0 {
                continue;
            }
            let color = class_color(self.kind, class);
            for channel in 0..3 {
                let blended = (1.0 - self.alpha) * f32::from(pixel[channel])
                    + self.alpha * f32::from(color[channel]);
                pixel[channel] = blended.round() as u8;
            }
        }
        overlay
    }

    /// Persist the class mask as an 8-bit grayscale image, classes scaled
    /// across the full 0-255 range.
    pub fn save_mask(&self, mask: &ClassMask, path: &Path) -> Result<()> {
        let max = mask.max_class();
        let scaled: Vec<u8> = mask
            .classes()
            .iter()
            .map(|&class| {
                if max == 0 {
                    0
                } else {
                    ((u16::from(class) * 255) / u16::from(max)) as u8
                }
            })
            .collect();
        let gray = GrayImage::from_raw(mask.width(), mask.height(), scaled)
            .ok_or_else(|| anyhow!("mask buffer does not match its dimensions"))?;
        gray.save(path)
            .with_context(|| format!("Cannot write mask to {}", path.display()))?;
        Ok(())
    }
}
