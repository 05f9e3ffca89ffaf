//! Snapshot case orchestration.
//!
//! A case runs one augmentation on the sample with a fixed seed, writes the
//! augmented image and annotation file into a scratch directory, then either
//! records them as the new snapshot pair or compares them byte for byte with
//! the stored pair.
//!
//! Two checks exist per augmentation:
//! - the snapshot case builds the augmentation through the registry and
//!   works on the raw annotation array
//! - the equivalence case builds it through the facade and must reproduce
//!   the snapshot pair exactly

use std::path::{Path, PathBuf};

use image::RgbImage;
use serde::Serialize;

use crate::annotation::{Annotation, annotations_from_array, annotations_to_array};
use crate::augmentations::{
    AugmentationError, AugmentationKind, AugmentationRegistry, seeded_rng,
};
use crate::config::HarnessConfig;
use crate::constants::{
    DEFAULT_JPEG_QUALITY, EQUIVALENCE_ANNOTATIONS_FILE, EQUIVALENCE_IMAGE_STEM,
};
use crate::error::{HarnessError, Result};
use crate::facade::Facade;
use crate::fixtures::FixtureResolver;
use crate::sample::Sample;
use crate::snapshot::{
    ProducedArtifacts, SnapshotError, SnapshotMode, SnapshotStore, annotations_file_name,
    image_file_name,
};
use crate::writers::{DirectoryWriter, FourCornersCsvWriter, ImageFileFormat, save_image};

/// Result of a successful case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CaseOutcome {
    /// Output was stored as the new snapshot pair
    Recorded,
    /// Output matched the stored snapshot pair
    Verified,
}

/// Which check a report entry describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CaseCheck {
    Snapshot,
    Equivalence,
}

/// One entry of a [`RunReport`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaseReport {
    pub name: String,
    pub kind: AugmentationKind,
    pub check: CaseCheck,
    /// `None` when the case failed
    pub outcome: Option<CaseOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CaseReport {
    pub fn passed(&self) -> bool {
        self.error.is_none()
    }
}

/// Summary of a [`Harness::run_all`] invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub mode: SnapshotMode,
    pub seed: u64,
    pub cases: Vec<CaseReport>,
}

impl RunReport {
    pub fn passed(&self) -> usize {
        self.cases.iter().filter(|c| c.passed()).count()
    }

    pub fn failed(&self) -> usize {
        self.cases.len() - self.passed()
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    pub fn failures(&self) -> impl Iterator<Item = &CaseReport> {
        self.cases.iter().filter(|c| !c.passed())
    }

    /// Pretty-printed JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Everything needed to run snapshot cases.
#[derive(Debug)]
pub struct Harness {
    registry: AugmentationRegistry,
    facade: Facade,
    fixtures: FixtureResolver,
    snapshots: SnapshotStore,
    mode: SnapshotMode,
    seed: u64,
    image_format: ImageFileFormat,
    sample: Sample,
}

impl Harness {
    /// Build a harness from configuration and a sample.
    pub fn new(config: &HarnessConfig, sample: Sample) -> Self {
        Self {
            registry: AugmentationRegistry::new(),
            facade: Facade::new(),
            fixtures: FixtureResolver::new(&config.fixtures_dir),
            snapshots: SnapshotStore::new(
                &config.snapshots_dir,
                config.image_format.extension(),
            ),
            mode: config.mode,
            seed: config.seed,
            image_format: config.image_format,
            sample,
        }
    }

    /// Build a harness on the generated sample.
    pub fn from_config(config: &HarnessConfig) -> Self {
        Self::new(config, Sample::generate())
    }

    pub fn registry(&self) -> &AugmentationRegistry {
        &self.registry
    }

    pub fn snapshots(&self) -> &SnapshotStore {
        &self.snapshots
    }

    pub fn mode(&self) -> SnapshotMode {
        self.mode
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn sample(&self) -> &Sample {
        &self.sample
    }

    /// Switch between recording and verifying.
    pub fn set_mode(&mut self, mode: SnapshotMode) {
        self.mode = mode;
    }

    fn jpeg_quality(&self) -> u8 {
        match self.image_format {
            ImageFileFormat::Jpeg { quality } => quality,
            ImageFileFormat::Png => DEFAULT_JPEG_QUALITY,
        }
    }

    /// Image id written into annotation files; the snapshot image name.
    fn image_id(&self, name: &str) -> String {
        image_file_name(name, self.image_format.extension())
    }

    /// Run `name` built through the registry, then record or verify.
    pub fn run_snapshot_case(&self, name: &str, work_dir: &Path) -> Result<CaseOutcome> {
        let fixture = self.fixtures.resolve(name)?;
        let augmentation = self.registry.create(name, &fixture.options)?;

        let boxes = annotations_to_array(&self.sample.annotations);
        let mut rng = seeded_rng(self.seed);
        let (image, aug_boxes) =
            augmentation.augment(&mut rng, self.sample.image.clone(), boxes.clone())?;

        if augmentation.kind().is_color_only() && aug_boxes != boxes {
            return Err(HarnessError::ColorAugmentationMovedBoxes {
                name: name.to_string(),
            });
        }

        let annotations = annotations_from_array(aug_boxes.view())?;
        let image_id = self.image_id(name);
        let produced = self.write_scoped(
            work_dir,
            &image_id,
            &annotations_file_name(name),
            &image,
            &annotations,
        )?;

        self.finish_case(name, &produced)
    }

    /// Run `name` built through the facade and compare with its snapshot pair.
    ///
    /// Needs existing snapshots, so it refuses to run in update mode.
    pub fn run_equivalence_case(&self, name: &str, work_dir: &Path) -> Result<()> {
        if self.mode.is_update() {
            return Err(SnapshotError::EquivalenceInUpdateMode {
                name: name.to_string(),
            }
            .into());
        }

        let fixture = self.fixtures.resolve(name)?;
        let augmentation = self.facade.by_name(name, &fixture.options)?;
        let (image, annotations) =
            augmentation.apply_seeded(self.seed, &self.sample.image, &self.sample.annotations)?;

        create_dir(work_dir)?;
        let image_path = work_dir.join(format!(
            "{}.{}",
            EQUIVALENCE_IMAGE_STEM,
            self.image_format.extension()
        ));
        save_image(&image_path, &image, self.jpeg_quality())?;

        let annotations_path = work_dir.join(EQUIVALENCE_ANNOTATIONS_FILE);
        let mut writer = FourCornersCsvWriter::create(&annotations_path, true)?;
        writer.write_annotations_for_image(&self.image_id(name), &image, &annotations)?;
        writer.finish()?;

        let produced = ProducedArtifacts {
            image: image_path,
            annotations: annotations_path,
        };
        self.snapshots.verify(name, &produced)?;
        log::info!("{}: facade output matches snapshot", name);
        Ok(())
    }

    /// Write the augmented pair with both writers open for the whole phase.
    fn write_scoped(
        &self,
        work_dir: &Path,
        image_file: &str,
        annotations_file: &str,
        image: &RgbImage,
        annotations: &[Annotation],
    ) -> Result<ProducedArtifacts> {
        let mut image_writer = DirectoryWriter::new(work_dir, false, self.jpeg_quality())?;
        let mut annotation_writer =
            FourCornersCsvWriter::create(work_dir.join(annotations_file), true)?;

        annotation_writer.write_annotations_for_image(image_file, image, annotations)?;
        let image_path = image_writer.write_image(image_file, image)?;

        let annotations_path = annotation_writer.path().to_path_buf();
        annotation_writer.finish()?;
        image_writer.finish();

        Ok(ProducedArtifacts {
            image: image_path,
            annotations: annotations_path,
        })
    }

    fn finish_case(&self, name: &str, produced: &ProducedArtifacts) -> Result<CaseOutcome> {
        match self.mode {
            SnapshotMode::Update => {
                self.snapshots.record(name, produced)?;
                Ok(CaseOutcome::Recorded)
            }
            SnapshotMode::Verify => {
                self.snapshots.verify(name, produced)?;
                Ok(CaseOutcome::Verified)
            }
        }
    }

    /// Run every registered augmentation, or only those in `filter`.
    ///
    /// Each check gets a fresh directory under `work_root`. Case failures are
    /// collected in the report; only unknown filter names and scratch
    /// directory problems abort the run.
    pub fn run_all(&self, work_root: &Path, filter: &[String]) -> Result<RunReport> {
        let names = self.select(filter)?;
        let mut cases = Vec::new();

        for (name, kind) in names {
            let snapshot_dir = fresh_dir(&work_root.join(name).join("snapshot"))?;
            let result = self.run_snapshot_case(name, &snapshot_dir);
            cases.push(case_report(name, kind, CaseCheck::Snapshot, result));

            if !self.mode.is_update() {
                let equivalence_dir = fresh_dir(&work_root.join(name).join("equivalence"))?;
                let result = self
                    .run_equivalence_case(name, &equivalence_dir)
                    .map(|()| CaseOutcome::Verified);
                cases.push(case_report(name, kind, CaseCheck::Equivalence, result));
            }
        }

        let report = RunReport {
            mode: self.mode,
            seed: self.seed,
            cases,
        };
        log::info!(
            "Ran {} checks: {} passed, {} failed",
            report.cases.len(),
            report.passed(),
            report.failed()
        );
        Ok(report)
    }

    fn select(&self, filter: &[String]) -> Result<Vec<(&'static str, AugmentationKind)>> {
        if filter.is_empty() {
            return Ok(self.registry.all().map(|e| (e.name, e.kind)).collect());
        }

        let mut selected = Vec::with_capacity(filter.len());
        for wanted in filter {
            let entry = self
                .registry
                .get(wanted)
                .ok_or_else(|| AugmentationError::unknown(wanted.as_str()))?;
            selected.push((entry.name, entry.kind));
        }
        selected.sort_unstable_by_key(|(name, _)| *name);
        selected.dedup_by_key(|(name, _)| *name);
        Ok(selected)
    }
}

fn case_report(
    name: &str,
    kind: AugmentationKind,
    check: CaseCheck,
    result: Result<CaseOutcome>,
) -> CaseReport {
    match result {
        Ok(outcome) => {
            log::info!("{} {:?}: {:?}", name, check, outcome);
            CaseReport {
                name: name.to_string(),
                kind,
                check,
                outcome: Some(outcome),
                error: None,
            }
        }
        Err(e) => {
            log::error!("{} {:?} failed: {}", name, check, e);
            CaseReport {
                name: name.to_string(),
                kind,
                check,
                outcome: None,
                error: Some(e.to_string()),
            }
        }
    }
}

fn create_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).map_err(|source| HarnessError::Io {
        path: dir.to_path_buf(),
        source,
    })
}

/// Create `dir`, removing anything a previous run left there.
fn fresh_dir(dir: &Path) -> Result<PathBuf> {
    if dir.exists() {
        std::fs::remove_dir_all(dir).map_err(|source| HarnessError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }
    create_dir(dir)?;
    Ok(dir.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn harness(snapshots: &Path, mode: SnapshotMode) -> Harness {
        let config = HarnessConfig {
            fixtures_dir: snapshots.join("no-fixtures"),
            snapshots_dir: snapshots.to_path_buf(),
            mode,
            ..HarnessConfig::default()
        };
        Harness::from_config(&config)
    }

    #[test]
    fn test_record_then_verify_single_case() {
        let snaps = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();

        let recorder = harness(snaps.path(), SnapshotMode::Update);
        assert_eq!(
            recorder.run_snapshot_case("Rotate", &work.path().join("a")).unwrap(),
            CaseOutcome::Recorded
        );
        assert!(snaps.path().join("Rotate-image.jpg").is_file());
        assert!(snaps.path().join("Rotate-bboxes").is_file());

        let verifier = harness(snaps.path(), SnapshotMode::Verify);
        assert_eq!(
            verifier.run_snapshot_case("Rotate", &work.path().join("b")).unwrap(),
            CaseOutcome::Verified
        );
        verifier
            .run_equivalence_case("Rotate", &work.path().join("c"))
            .unwrap();
    }

    #[test]
    fn test_annotation_file_uses_snapshot_image_name() {
        let snaps = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        harness(snaps.path(), SnapshotMode::Update)
            .run_snapshot_case("HorizontalFlip", work.path())
            .unwrap();

        let content = std::fs::read_to_string(snaps.path().join("HorizontalFlip-bboxes")).unwrap();
        let rows: Vec<&str> = content.lines().skip(1).collect();
        assert_eq!(rows.len(), 4);
        assert!(rows.iter().all(|r| r.starts_with("HorizontalFlip-image.jpg,")));
    }

    #[test]
    fn test_equivalence_refused_in_update_mode() {
        let snaps = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let case_dir = work.path().join("eq");

        let err = harness(snaps.path(), SnapshotMode::Update)
            .run_equivalence_case("Rotate", &case_dir)
            .unwrap_err();
        assert!(matches!(
            err,
            HarnessError::Snapshot(SnapshotError::EquivalenceInUpdateMode { .. })
        ));
        assert!(!case_dir.exists());
    }

    #[test]
    fn test_unknown_filter_name() {
        let snaps = tempfile::tempdir().unwrap();
        let err = harness(snaps.path(), SnapshotMode::Update)
            .run_all(snaps.path(), &["Sharpen".to_string()])
            .unwrap_err();
        assert!(err.to_string().contains("Sharpen"));
    }

    #[test]
    fn test_report_json() {
        let snaps = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let report = harness(snaps.path(), SnapshotMode::Verify)
            .run_all(work.path(), &["Grayscale".to_string()])
            .unwrap();

        assert_eq!(report.cases.len(), 2);
        assert!(!report.is_success());

        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["mode"], "verify");
        assert_eq!(json["cases"][0]["name"], "Grayscale");
        assert_eq!(json["cases"][0]["kind"], "color");
        assert!(json["cases"][0]["error"].as_str().unwrap().contains("Grayscale"));
    }
}
