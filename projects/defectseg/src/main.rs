mod cli;
mod config;
mod detector;
mod geo;
mod outputs;
mod overlay;
mod registry;
mod stage;
mod tree;

use anyhow::Result;
use clap::Parser;
use std::fs;

use cli::Args;
use outputs::StageOutputs;
use stage::orchestrator::SegmentationStage;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let config = args.into_config()?;
    let project_path = config.project_path.clone();
    let kind = config.kind;

    let mut outputs = StageOutputs::new();
    SegmentationStage::new(config).run(&mut outputs).await?;

    if let Some(overlays) = outputs.images(&format!("{kind}_overlay_images")) {
        tracing::info!(
            "{} overlay images available to downstream stages",
            overlays.len()
        );
    }
    tracing::info!(
        "Published output keys: {:?}",
        outputs.keys().collect::<Vec<_>>()
    );

    // Dump the published outputs for inspection; downstream stages read the
    // map in-process, this file is for humans.
    let summary_path = project_path.join("stage_outputs.json");
    match serde_json::to_string_pretty(&outputs) {
        Ok(json) => {
            if let Err(e) = fs::write(&summary_path, json) {
                tracing::warn!("Cannot write {}: {}", summary_path.display(), e);
            }
        }
        Err(e) => tracing::warn!("Cannot serialize stage outputs: {}", e),
    }

    Ok(())
}
