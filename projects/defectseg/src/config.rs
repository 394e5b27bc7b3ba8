// Stage configuration, assembled once from CLI arguments and passed into the
// stage entry point. Nothing here is read from ambient process state.

use clap::ValueEnum;
use std::fmt;
use std::path::PathBuf;

/// Which defect model the stage runs.
#[derive(ValueEnum, Copy, Clone, Debug, PartialEq, Eq)]
pub enum DefectKind {
    Crack,
    Stain,
}

impl DefectKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DefectKind::Crack => "crack",
            DefectKind::Stain => "stain",
        }
    }

    /// Name the model is registered under in the registry manifest.
    pub fn model_name(self) -> &'static str {
        match self {
            DefectKind::Crack => "crackdetection",
            DefectKind::Stain => "staindetection",
        }
    }
}

impl fmt::Display for DefectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where model weights come from.
#[derive(Debug, Clone)]
pub struct ModelSource {
    pub manifest_url: String,
    pub version: String,
    pub cache_dir: PathBuf,
}

/// Everything the stage needs for one invocation.
#[derive(Debug, Clone)]
pub struct StageConfig {
    pub project_path: PathBuf,
    pub kind: DefectKind,
    pub max_concurrency: usize,
    pub alpha: f32,
    pub save_masks: bool,
    pub model: ModelSource,
    pub exiftool_path: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names() {
        assert_eq!(DefectKind::Crack.as_str(), "crack");
        assert_eq!(DefectKind::Stain.to_string(), "stain");
        assert_eq!(DefectKind::Crack.model_name(), "crackdetection");
        assert_eq!(DefectKind::Stain.model_name(), "staindetection");
    }
}
