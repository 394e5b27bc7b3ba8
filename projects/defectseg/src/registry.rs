// Model registry client.
//
// The registry serves a JSON manifest mapping model names to versioned
// weight URLs. Weights are downloaded once into a local cache; everything
// after the download is offline.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
struct Manifest {
    models: BTreeMap<String, ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    versions: BTreeMap<String, ModelVersion>,
}

#[derive(Debug, Deserialize)]
struct ModelVersion {
    url: String,
}

fn resolve<'a>(manifest: &'a Manifest, name: &str, version: &str) -> Option<&'a ModelVersion> {
    manifest.models.get(name)?.versions.get(version)
}

fn cached_model_path(cache_dir: &Path, name: &str, version: &str) -> PathBuf {
    cache_dir.join(format!("{name}-{version}.onnx"))
}

/// Fetch the model registered under `name` at `version`, reusing a cached
/// copy when one exists. Model availability is best-effort: any failure is
/// logged as a warning and yields `None`.
pub async fn get_model(
    name: &str,
    manifest_url: &str,
    version: &str,
    cache_dir: &Path,
) -> Option<PathBuf> {
    match fetch_model(name, manifest_url, version, cache_dir).await {
        Ok(path) => Some(path),
        Err(e) => {
            tracing::warn!("Cannot retrieve model {} {}: {:#}", name, version, e);
            None
        }
    }
}

async fn fetch_model(
    name: &str,
    manifest_url: &str,
    version: &str,
    cache_dir: &Path,
) -> Result<PathBuf> {
    let target = cached_model_path(cache_dir, name, version);
    if target.exists() {
        tracing::info!("Using cached model {}", target.display());
        return Ok(target);
    }

    let manifest: Manifest = reqwest::get(manifest_url)
        .await
        .with_context(|| format!("Cannot fetch model manifest from {manifest_url}"))?
        .error_for_status()?
        .json()
        .await
        .context("Model manifest is not valid JSON")?;

    let entry = resolve(&manifest, name, version)
        .ok_or_else(|| anyhow!("Manifest has no model {name} at version {version}"))?;

    tracing::info!("Downloading model {} {} from {}", name, version, entry.url);
    let bytes = reqwest::get(&entry.url)
        .await
        .with_context(|| format!("Cannot download model from {}", entry.url))?
        .error_for_status()?
        .bytes()
        .await?;

    fs::create_dir_all(cache_dir)
        .with_context(|| format!("Cannot create model cache {}", cache_dir.display()))?;
    fs::write(&target, &bytes)
        .with_context(|| format!("Cannot write model to {}", target.display()))?;

    Ok(target)
}
