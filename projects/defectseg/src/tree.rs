// Directory layout of a project run.
//
// All paths the stage reads or writes hang off the project root; downstream
// stages receive this struct through the shared output map.

use anyhow::{Context, Result};
use chrono::Local;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::DefectKind;

#[derive(Debug, Clone, Serialize)]
pub struct ProjectTree {
    pub root: PathBuf,
    /// Raw input images, optionally paired with *_mask siblings.
    pub dataset_raw: PathBuf,
    pub overlay_dir: PathBuf,
    pub mask_dir: PathBuf,
    /// Newline-delimited manifest of accepted image filenames.
    pub dataset_list: PathBuf,
    pub benchmarking: PathBuf,
}

impl ProjectTree {
    pub fn new(root: &Path, kind: DefectKind) -> Self {
        Self {
            root: root.to_path_buf(),
            dataset_raw: root.join("images"),
            overlay_dir: root.join(format!("{}_overlay", kind.as_str())),
            mask_dir: root.join(format!("{}_masks", kind.as_str())),
            dataset_list: root.join("img_list.txt"),
            benchmarking: root.join("benchmark.txt"),
        }
    }

    /// Create the output directories. Creating an already-existing directory
    /// is not an error.
    pub fn create_output_dirs(&self, save_masks: bool) -> Result<()> {
        fs::create_dir_all(&self.overlay_dir)
            .with_context(|| format!("Cannot create {}", self.overlay_dir.display()))?;
        if save_masks {
            fs::create_dir_all(&self.mask_dir)
                .with_context(|| format!("Cannot create {}", self.mask_dir.display()))?;
        }
        Ok(())
    }

    /// Reset the benchmarking artifact left behind by a previous run.
    /// Best-effort: failure to write is logged, never fatal.
    pub fn reset_benchmark(&self, cores: usize) {
        if !self.benchmarking.exists() {
            return;
        }
        let result = fs::remove_file(&self.benchmarking).and_then(|()| {
            fs::write(
                &self.benchmarking,
                format!(
                    "Benchmarking file created {}\nNumber of Cores: {}\n\n",
                    Local::now().format("%a %b %d %H:%M:%S %Y"),
                    cores
                ),
            )
        });
        if let Err(e) = result {
            tracing::warn!("Cannot write benchmark file: {}", e);
        }
    }

    /// Append one timing line to the benchmarking artifact. Best-effort.
    pub fn append_benchmark(&self, label: &str, elapsed: Duration) {
        if !self.benchmarking.exists() {
            return;
        }
        let result = fs::OpenOptions::new()
            .append(true)
            .open(&self.benchmarking)
            .and_then(|mut file| {
                writeln!(file, "{} runtime: {:.2} seconds", label, elapsed.as_secs_f64())
            });
        if let Err(e) = result {
            tracing::warn!("Cannot write benchmark file: {}", e);
        }
    }
}
