// Bounded worker pool: one inference + overlay + geotag-copy unit of work
// per photo. A failing item is logged and recorded, never propagated to its
// siblings.

use anyhow::{Context, Result};
use crossbeam::channel::{self, Receiver, Sender};
use indicatif::ProgressBar;
use std::sync::Arc;
use std::thread;

use crate::detector::{Detector, DetectorFactory};
use crate::geo::GeoCopier;
use crate::overlay::OverlayRenderer;

use super::types::{WorkItem, WorkResult};

/// Run every item through the pool and collect all results. Returns only
/// after the pool has fully drained; completion order is arbitrary.
pub fn process_items(
    items: Vec<WorkItem>,
    max_concurrency: usize,
    factory: DetectorFactory,
    renderer: OverlayRenderer,
    geo: Arc<dyn GeoCopier>,
) -> Vec<WorkResult> {
    let worker_count = max_concurrency.min(items.len()).max(1);

    // Tight bound keeps decoded images from piling up ahead of the workers.
    let (work_tx, work_rx) = channel::bounded::<WorkItem>(worker_count * 2);
    let (result_tx, result_rx) = channel::unbounded::<WorkResult>();
    let progress = ProgressBar::new(items.len() as u64);

    let mut handles = Vec::with_capacity(worker_count);
    for worker_id in 0..worker_count {
        let work_rx = work_rx.clone();
        let result_tx = result_tx.clone();
        let factory = factory.clone();
        let renderer = renderer.clone();
        let geo = geo.clone();
        let progress = progress.clone();
        handles.push(thread::spawn(move || {
            if let Err(e) = run_worker(work_rx, result_tx, factory, renderer, geo, progress) {
                tracing::error!("Detection worker {} failed: {}", worker_id, e);
            }
        }));
    }
    drop(work_rx);
    drop(result_tx);

    for item in items {
        if work_tx.send(item).is_err() {
            break;
        }
    }
    drop(work_tx);

    // Barrier: the result channel closes once every worker has exited.
    let results: Vec<WorkResult> = result_rx.iter().collect();
    for handle in handles {
        if handle.join().is_err() {
            tracing::error!("Detection worker panicked");
        }
    }
    progress.finish_and_clear();

    results
}

fn run_worker(
    rx: Receiver<WorkItem>,
    tx: Sender<WorkResult>,
    factory: DetectorFactory,
    renderer: OverlayRenderer,
    geo: Arc<dyn GeoCopier>,
    progress: ProgressBar,
) -> Result<()> {
    // Each worker owns its detector; sessions are created inside the thread.
    let mut detector = factory().context("Failed to load model")?;

    for item in rx {
        let result = match process_item(&item, detector.as_mut(), &renderer, geo.as_ref()) {
            Ok(result) => {
                tracing::info!("Generated overlay for {}", item.photo.filename);
                result
            }
            Err(error) => {
                tracing::warn!(
                    "Failed to generate overlay for {}: {:#}",
                    item.photo.filename,
                    error
                );
                WorkResult::Failed {
                    filename: item.photo.filename.clone(),
                    error,
                }
            }
        };
        progress.inc(1);
        if tx.send(result).is_err() {
            break;
        }
    }

    Ok(())
}

fn process_item(
    item: &WorkItem,
    detector: &mut dyn Detector,
    renderer: &OverlayRenderer,
    geo: &dyn GeoCopier,
) -> Result<WorkResult> {
    let original = image::open(&item.photo.path)
        .with_context(|| format!("Could not load image {}", item.photo.path.display()))?
        .to_rgb8();

    let mask = detector.infer(&original)?;

    let overlay = renderer.render(&original, &mask);
    overlay
        .save(&item.overlay_path)
        .with_context(|| format!("Cannot write overlay {}", item.overlay_path.display()))?;

    if let Some(mask_path) = &item.mask_path {
        renderer.save_mask(&mask, mask_path)?;
    }

    match geo.copy(&item.photo.path, &item.overlay_path)? {
        true => tracing::info!(
            "Geolocation copied from {} to {}",
            item.photo.path.display(),
            item.overlay_path.display()
        ),
        false => tracing::info!("No geolocation found in {}", item.photo.path.display()),
    }

    Ok(WorkResult::Succeeded {
        overlay_path: item.overlay_path.clone(),
        mask_path: item.mask_path.clone(),
    })
}
