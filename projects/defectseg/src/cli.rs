use anyhow::{bail, Result};
use clap::Parser;
use std::path::PathBuf;

use crate::config::{DefectKind, ModelSource, StageConfig};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Root directory of the photogrammetry project (expects an images/ subdirectory)
    #[arg(long, env = "DEFECTSEG_PROJECT_PATH")]
    pub project_path: PathBuf,

    /// Defect model to run
    #[arg(long, value_enum, env = "DEFECTSEG_KIND")]
    pub kind: DefectKind,

    /// Maximum number of concurrent workers
    #[arg(long, env = "DEFECTSEG_MAX_CONCURRENCY", default_value_t = num_cpus::get())]
    pub max_concurrency: usize,

    /// Overlay transparency, 0.0 (invisible) to 1.0 (opaque)
    #[arg(long, env = "DEFECTSEG_ALPHA", default_value_t = 0.5)]
    pub alpha: f32,

    /// Also persist a standalone grayscale mask per image
    #[arg(long, env = "DEFECTSEG_SAVE_MASKS")]
    pub save_masks: bool,

    /// URL of the model registry manifest (config.json)
    #[arg(long, env = "DEFECTSEG_MODEL_URL")]
    pub model_url: String,

    /// Model version to request from the registry
    #[arg(long, env = "DEFECTSEG_MODEL_VERSION", default_value = "v1.0.0")]
    pub model_version: String,

    /// Directory for cached model weights (defaults to <project-path>/models)
    #[arg(long, env = "DEFECTSEG_MODEL_CACHE")]
    pub model_cache: Option<PathBuf>,

    /// Path to the exiftool executable
    #[arg(long, env = "DEFECTSEG_EXIFTOOL_PATH", default_value = "exiftool")]
    pub exiftool_path: String,
}

impl Args {
    pub fn into_config(self) -> Result<StageConfig> {
        if self.max_concurrency == 0 {
            bail!("--max-concurrency must be a positive integer");
        }
        if !(0.0..=1.0).contains(&self.alpha) {
            bail!("--alpha must be within [0, 1], got {}", self.alpha);
        }

        let cache_dir = self
            .model_cache
            .unwrap_or_else(|| self.project_path.join("models"));

        Ok(StageConfig {
            kind: self.kind,
            max_concurrency: self.max_concurrency,
            alpha: self.alpha,
            save_masks: self.save_masks,
            model: ModelSource {
                manifest_url: self.model_url,
                version: self.model_version,
                cache_dir,
            },
            exiftool_path: self.exiftool_path,
            project_path: self.project_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        let mut full = vec![
            "defectseg",
            "--project-path",
            "/data/project",
            "--kind",
            "stain",
            "--model-url",
            "http://registry.local/config.json",
        ];
        full.extend_from_slice(args);
        Args::try_parse_from(full).unwrap()
    }

    #[test]
    fn defaults_resolve() {
        let config = parse(&[]).into_config().unwrap();
        assert_eq!(config.kind, DefectKind::Stain);
        assert_eq!(config.alpha, 0.5);
        assert_eq!(config.model.version, "v1.0.0");
        assert_eq!(
            config.model.cache_dir,
            PathBuf::from("/data/project/models")
        );
        assert!(config.max_concurrency >= 1);
        assert!(!config.save_masks);
    }

    #[test]
    fn zero_concurrency_rejected() {
        let err = parse(&["--max-concurrency", "0"]).into_config().unwrap_err();
        assert!(err.to_string().contains("positive"));
    }

    #[test]
    fn alpha_out_of_range_rejected() {
        assert!(parse(&["--alpha", "1.5"]).into_config().is_err());
        assert!(parse(&["--alpha", "-0.1"]).into_config().is_err());
        assert!(parse(&["--alpha", "1.0"]).into_config().is_ok());
    }

    #[test]
    fn explicit_model_cache_wins() {
        let config = parse(&["--model-cache", "/var/cache/models"])
            .into_config()
            .unwrap();
        assert_eq!(config.model.cache_dir, PathBuf::from("/var/cache/models"));
    }
}
