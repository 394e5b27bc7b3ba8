// Photo catalog: validated photo records plus the dataset manifest.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::scan;

#[derive(Debug, Error)]
pub enum PhotoError {
    #[error("cannot decode {filename}: {message}")]
    Corrupted { filename: String, message: String },
}

/// One accepted dataset photo. Immutable once constructed.
#[derive(Debug, Clone)]
pub struct Photo {
    /// Filename relative to the dataset root.
    pub filename: String,
    pub path: PathBuf,
    /// Paired mask filename, when a usable one exists.
    pub mask: Option<String>,
}

impl Photo {
    /// Validate and build the record for one accepted file. Decoding the
    /// image header is enough to reject files that are not readable images.
    pub fn new(images_dir: &Path, filename: &str) -> Result<Self, PhotoError> {
        let path = images_dir.join(filename);
        image::image_dimensions(&path).map_err(|e| PhotoError::Corrupted {
            filename: filename.to_string(),
            message: e.to_string(),
        })?;
        Ok(Self {
            filename: filename.to_string(),
            path,
            mask: None,
        })
    }

    fn with_mask(mut self, mask: Option<&str>) -> Self {
        self.mask = mask.map(str::to_string);
        self
    }
}

/// Build the photo list, writing each validated filename to the manifest in
/// the same order it is consumed. A corrupted file is skipped with a warning
/// and never aborts the batch.
pub fn build_catalog(
    images_dir: &Path,
    accepted: &[String],
    mask_index: &BTreeMap<String, String>,
    manifest_path: &Path,
) -> Result<Vec<Photo>> {
    let file = File::create(manifest_path)
        .with_context(|| format!("Cannot write dataset manifest {}", manifest_path.display()))?;
    let mut manifest = BufWriter::new(file);

    tracing::info!("Loading {} images", accepted.len());
    let mut photos = Vec::with_capacity(accepted.len());
    for filename in accepted {
        match Photo::new(images_dir, filename) {
            Ok(photo) => {
                let photo = photo.with_mask(scan::resolve_mask(filename, mask_index));
                writeln!(manifest, "{}", photo.filename)?;
                photos.push(photo);
            }
            Err(e) => {
                tracing::warn!("{} seems corrupted and will not be used ({})", filename, e);
            }
        }
    }
    manifest.flush()?;

    Ok(photos)
}
