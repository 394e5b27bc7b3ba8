// Work units flowing through the pool, and stage-level errors.

use std::path::PathBuf;
use thiserror::Error;

use super::catalog::Photo;

#[derive(Debug, Error)]
pub enum StageError {
    #[error("cannot read dataset directory: {0:#}")]
    DatasetScan(anyhow::Error),
    #[error("cannot prepare output directories: {0:#}")]
    OutputSetup(anyhow::Error),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// One unit of work: a photo plus its resolved output paths. Created per
/// dispatch, discarded after completion.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub photo: Photo,
    pub overlay_path: PathBuf,
    pub mask_path: Option<PathBuf>,
}

/// Terminal outcome for one work item. No retries: a failed item is simply
/// absent from the published output lists.
#[derive(Debug)]
pub enum WorkResult {
    Succeeded {
        overlay_path: PathBuf,
        mask_path: Option<PathBuf>,
    },
    Failed {
        filename: String,
        error: anyhow::Error,
    },
}
