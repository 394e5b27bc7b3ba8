// Segmentation stage orchestrator.
//
// Drives one stage invocation end to end: scan the dataset, build the
// catalog, acquire the detector, fan the photos out over the worker pool,
// and publish the aggregated results to the shared output map.

use anyhow::anyhow;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use crate::config::StageConfig;
use crate::detector::{DetectorFactory, OnnxDetector};
use crate::geo::{ExiftoolGeoCopier, GeoCopier};
use crate::outputs::{OutputValue, StageOutputs};
use crate::overlay::OverlayRenderer;
use crate::registry;
use crate::tree::ProjectTree;

use super::catalog::{self, Photo};
use super::scan;
use super::types::{StageError, WorkItem, WorkResult};
use super::worker;

pub struct SegmentationStage {
    config: StageConfig,
}

#[derive(Debug)]
pub(crate) struct Prepared {
    pub(crate) tree: ProjectTree,
    pub(crate) photos: Vec<Photo>,
}

impl SegmentationStage {
    pub fn new(config: StageConfig) -> Self {
        Self { config }
    }

    pub async fn run(&self, outputs: &mut StageOutputs) -> Result<(), StageError> {
        let Some(prepared) = self.prepare(outputs)? else {
            return Ok(());
        };

        let kind = self.config.kind;
        let model = &self.config.model;
        let Some(model_path) = registry::get_model(
            kind.model_name(),
            &model.manifest_url,
            &model.version,
            &model.cache_dir,
        )
        .await
        else {
            tracing::warn!(
                "Cannot load {} detection model. Skipping {} detection.",
                kind,
                kind
            );
            return Ok(());
        };

        let factory: DetectorFactory = Arc::new(move || {
            OnnxDetector::new(&model_path)
                .map(|detector| Box::new(detector) as Box<dyn crate::detector::Detector>)
        });
        // Probe once before dispatch so an unusable model degrades the whole
        // stage to a no-op instead of killing every worker.
        if let Err(e) = factory() {
            tracing::warn!(
                "Cannot initialize {} detector ({}). Skipping {} detection.",
                kind,
                e,
                kind
            );
            return Ok(());
        }

        let geo: Arc<dyn GeoCopier> =
            Arc::new(ExiftoolGeoCopier::new(self.config.exiftool_path.clone()));
        self.process(outputs, prepared, factory, geo).await
    }

    /// Steps before model acquisition: directory setup, benchmark reset,
    /// scan and catalog. Returns None when there is nothing to process,
    /// which is a successful run with empty outputs.
    pub(crate) fn prepare(
        &self,
        outputs: &mut StageOutputs,
    ) -> Result<Option<Prepared>, StageError> {
        let kind = self.config.kind;
        tracing::info!("Running {} detection on images", kind);

        outputs.publish("start_time", OutputValue::Timestamp(Utc::now()));
        let tree = ProjectTree::new(&self.config.project_path, kind);
        outputs.publish("tree", OutputValue::Tree(tree.clone()));

        tree.create_output_dirs(self.config.save_masks)
            .map_err(StageError::OutputSetup)?;
        tree.reset_benchmark(num_cpus::get());

        let (accepted, rejected) = scan::scan(&tree.dataset_raw)
            .map_err(|e| StageError::DatasetScan(anyhow!(e)))?;

        let photos = if accepted.is_empty() {
            Vec::new()
        } else {
            let mask_index = scan::build_mask_index(&rejected, scan::SUPPORTED_EXTENSIONS);
            catalog::build_catalog(&tree.dataset_raw, &accepted, &mask_index, &tree.dataset_list)?
        };

        if photos.is_empty() {
            tracing::info!("No usable images in {}", tree.dataset_raw.display());
            self.publish_results(outputs, Vec::new(), Vec::new(), 0, 0);
            return Ok(None);
        }

        Ok(Some(Prepared { tree, photos }))
    }

    /// Dispatch the catalog over the worker pool, then aggregate. Only runs
    /// once a detector is known to be available.
    pub(crate) async fn process(
        &self,
        outputs: &mut StageOutputs,
        prepared: Prepared,
        factory: DetectorFactory,
        geo: Arc<dyn GeoCopier>,
    ) -> Result<(), StageError> {
        let Prepared { tree, photos } = prepared;
        let total = photos.len();
        let started = Instant::now();

        let items: Vec<WorkItem> = photos
            .into_iter()
            .map(|photo| WorkItem {
                overlay_path: tree.overlay_dir.join(&photo.filename),
                mask_path: self
                    .config
                    .save_masks
                    .then(|| tree.mask_dir.join(mask_filename(&photo.filename))),
                photo,
            })
            .collect();

        let renderer = OverlayRenderer::new(self.config.kind, self.config.alpha);
        let max_concurrency = self.config.max_concurrency;
        let results =
            tokio::task::spawn_blocking(move || {
                worker::process_items(items, max_concurrency, factory, renderer, geo)
            })
            .await
            .map_err(|e| StageError::Internal(anyhow!("worker pool panicked: {e}")))?;

        // Aggregation barrier has passed: every item is terminal here.
        let mut overlays = Vec::new();
        let mut masks = Vec::new();
        let mut failures = 0usize;
        for result in results {
            match result {
                WorkResult::Succeeded {
                    overlay_path,
                    mask_path,
                } => {
                    overlays.push(overlay_path);
                    if let Some(mask_path) = mask_path {
                        masks.push(mask_path);
                    }
                }
                WorkResult::Failed { .. } => failures += 1,
            }
        }
        // Completion order is arbitrary; publish a stable order instead.
        overlays.sort();
        masks.sort();

        tree.append_benchmark(
            &format!("{}_segmentation", self.config.kind),
            started.elapsed(),
        );
        self.publish_results(outputs, overlays, masks, total, failures);

        Ok(())
    }

    fn publish_results(
        &self,
        outputs: &mut StageOutputs,
        overlays: Vec<PathBuf>,
        masks: Vec<PathBuf>,
        total: usize,
        failures: usize,
    ) {
        let kind = self.config.kind;
        tracing::info!(
            "Completed {} detection. Processed {} images, generated {} overlay images and {} mask images ({} failed).",
            kind,
            total,
            overlays.len(),
            masks.len(),
            failures
        );
        outputs.publish(
            &format!("{kind}_overlay_images"),
            OutputValue::Images(overlays),
        );
        outputs.publish(&format!("{kind}_mask_images"), OutputValue::Images(masks));
    }
}

/// Masks are grayscale; always persist them as PNG regardless of the photo
/// container format.
fn mask_filename(photo_filename: &str) -> String {
    let stem = Path::new(photo_filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(photo_filename);
    format!("{stem}.png")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DefectKind, ModelSource};
    use crate::detector::{ClassMask, Detector, InferenceError};
    use anyhow::Result;
    use image::{Rgb, RgbImage};
    use std::fs;
    use std::path::PathBuf;
    use std::sync::Mutex;

    struct MarkerDetector;

    impl Detector for MarkerDetector {
        fn infer(&mut self, image: &RgbImage) -> Result<ClassMask, InferenceError> {
            if image.get_pixel(0, 0) == &Rgb([255, 0, 0]) {
                return Err(InferenceError::Run("synthetic failure".to_string()));
            }
            let mut classes = vec![0u8; (image.width() * image.height()) as usize];
            classes[0] = 1;
            ClassMask::new(image.width(), image.height(), classes)
        }
    }

    #[derive(Default)]
    struct RecordingGeo {
        calls: Mutex<usize>,
    }

    impl GeoCopier for RecordingGeo {
        fn copy(&self, _source: &std::path::Path, _dest: &std::path::Path) -> Result<bool> {
            *self.calls.lock().unwrap() += 1;
            Ok(false)
        }
    }

    fn test_project(name: &str) -> PathBuf {
        let root =
            std::env::temp_dir().join(format!("defectseg-stage-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&root);
        fs::create_dir_all(root.join("images")).unwrap();
        root
    }

    fn config(root: &std::path::Path) -> StageConfig {
        StageConfig {
            project_path: root.to_path_buf(),
            kind: DefectKind::Stain,
            max_concurrency: 4,
            alpha: 0.5,
            save_masks: true,
            model: ModelSource {
                manifest_url: "http://registry.invalid/config.json".to_string(),
                version: "v1.0.0".to_string(),
                cache_dir: root.join("models"),
            },
            exiftool_path: "exiftool".to_string(),
        }
    }

    fn write_photo(root: &std::path::Path, name: &str, color: Rgb<u8>) {
        RgbImage::from_pixel(4, 4, color)
            .save(root.join("images").join(name))
            .unwrap();
    }

    fn factory() -> DetectorFactory {
        Arc::new(|| Ok(Box::new(MarkerDetector)))
    }

    #[tokio::test]
    async fn stage_publishes_overlays_and_masks() {
        let root = test_project("publish");
        write_photo(&root, "a.png", Rgb([60, 60, 60]));
        write_photo(&root, "b.png", Rgb([60, 60, 60]));
        write_photo(&root, "b_mask.png", Rgb([0, 0, 0]));
        write_photo(&root, "fail.png", Rgb([255, 0, 0]));
        fs::write(root.join("images/broken.png"), b"not an image").unwrap();

        let stage = SegmentationStage::new(config(&root));
        let mut outputs = StageOutputs::new();

        let prepared = stage.prepare(&mut outputs).unwrap().unwrap();
        let filenames: Vec<&str> = prepared.photos.iter().map(|p| p.filename.as_str()).collect();
        assert_eq!(filenames, ["a.png", "b.png", "fail.png"]);
        assert_eq!(prepared.photos[1].mask.as_deref(), Some("b_mask.png"));
        assert_eq!(prepared.photos[0].mask, None);

        let geo = Arc::new(RecordingGeo::default());
        stage
            .process(&mut outputs, prepared, factory(), geo.clone())
            .await
            .unwrap();

        let overlays = outputs.images("stain_overlay_images").unwrap();
        assert_eq!(
            overlays,
            &[
                root.join("stain_overlay/a.png"),
                root.join("stain_overlay/b.png")
            ]
        );
        for path in overlays {
            assert!(path.is_file());
        }

        let masks = outputs.images("stain_mask_images").unwrap();
        assert_eq!(
            masks,
            &[root.join("stain_masks/a.png"), root.join("stain_masks/b.png")]
        );

        assert!(outputs.get("tree").is_some());
        assert!(outputs.get("start_time").is_some());
        assert_eq!(*geo.calls.lock().unwrap(), 2);

        // the corrupted file never reached the manifest
        assert_eq!(
            fs::read_to_string(root.join("img_list.txt")).unwrap(),
            "a.png\nb.png\nfail.png\n"
        );
    }

    #[test]
    fn empty_dataset_is_a_successful_noop() {
        let root = test_project("empty");
        let stage = SegmentationStage::new(config(&root));
        let mut outputs = StageOutputs::new();

        assert!(stage.prepare(&mut outputs).unwrap().is_none());
        assert_eq!(outputs.images("stain_overlay_images").unwrap(), &[] as &[PathBuf]);
        assert_eq!(outputs.images("stain_mask_images").unwrap(), &[] as &[PathBuf]);
    }

    #[test]
    fn missing_dataset_dir_is_stage_fatal() {
        let root = test_project("fatal");
        fs::remove_dir_all(root.join("images")).unwrap();

        let stage = SegmentationStage::new(config(&root));
        let mut outputs = StageOutputs::new();
        let err = stage.prepare(&mut outputs).unwrap_err();
        assert!(matches!(err, StageError::DatasetScan(_)));
    }

    #[tokio::test]
    async fn rerun_reproduces_the_same_path_set() {
        let root = test_project("rerun");
        write_photo(&root, "a.png", Rgb([60, 60, 60]));
        write_photo(&root, "b.png", Rgb([60, 60, 60]));

        let stage = SegmentationStage::new(config(&root));

        let mut first = StageOutputs::new();
        let prepared = stage.prepare(&mut first).unwrap().unwrap();
        stage
            .process(&mut first, prepared, factory(), Arc::new(RecordingGeo::default()))
            .await
            .unwrap();

        let mut second = StageOutputs::new();
        let prepared = stage.prepare(&mut second).unwrap().unwrap();
        stage
            .process(&mut second, prepared, factory(), Arc::new(RecordingGeo::default()))
            .await
            .unwrap();

        assert_eq!(
            first.images("stain_overlay_images").unwrap(),
            second.images("stain_overlay_images").unwrap()
        );
    }

    #[test]
    fn mask_filenames_are_normalized_to_png() {
        assert_eq!(mask_filename("DJI_0001.JPG"), "DJI_0001.png");
        assert_eq!(mask_filename("a.png"), "a.png");
    }
}
