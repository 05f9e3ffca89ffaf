//! Snapshot storage and byte-exact comparison.
//!
//! Every augmentation has a snapshot pair in the snapshot directory:
//! `<Name>-image.<ext>` and `<Name>-bboxes`. In update mode freshly produced
//! files replace the pair; in verify mode they must match it byte for byte.

use std::fmt;
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::UPDATE_SNAPSHOTS_ENV;

const COMPARE_CHUNK: usize = 64 * 1024;

/// Whether a run records new baselines or checks against existing ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotMode {
    /// Compare produced files against stored snapshots.
    #[default]
    Verify,
    /// Overwrite stored snapshots with produced files.
    Update,
}

impl SnapshotMode {
    /// Read the mode from the update environment variable.
    ///
    /// `1`, `true` and `yes` (any case) select update mode.
    pub fn from_env() -> Self {
        Self::from_flag(std::env::var(UPDATE_SNAPSHOTS_ENV).ok().as_deref())
    }

    /// Interpret an update flag value.
    pub fn from_flag(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()) {
            Some(v) if matches!(v.as_str(), "1" | "true" | "yes") => SnapshotMode::Update,
            _ => SnapshotMode::Verify,
        }
    }

    pub fn is_update(&self) -> bool {
        matches!(self, SnapshotMode::Update)
    }
}

/// The two files making up a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Annotations,
    Image,
}

impl ArtifactKind {
    /// Plural noun used in mismatch messages.
    pub fn subject(&self) -> &'static str {
        match self {
            ArtifactKind::Annotations => "Bounding boxes",
            ArtifactKind::Image => "Images",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactKind::Annotations => write!(f, "annotation file"),
            ArtifactKind::Image => write!(f, "image file"),
        }
    }
}

/// Errors raised by snapshot recording and verification.
#[derive(Error, Debug)]
pub enum SnapshotError {
    /// A stored snapshot file does not exist or cannot be opened
    #[error("No such {artifact} snapshot for {name}: {path:?} ({source})")]
    Missing {
        /// Augmentation name
        name: String,
        /// Which file is missing
        artifact: ArtifactKind,
        /// Expected snapshot path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Produced and stored bytes differ
    #[error("{} for {name} do not match", .artifact.subject())]
    Mismatch {
        /// Augmentation name
        name: String,
        /// Which file differs
        artifact: ArtifactKind,
    },

    /// Reading or writing a produced file failed
    #[error("IO error on {path:?}: {source}")]
    Io {
        /// File involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The equivalence check was requested while recording snapshots
    #[error(
        "Equivalence check for {name} needs existing snapshots and cannot run in update mode"
    )]
    EquivalenceInUpdateMode {
        /// Augmentation name
        name: String,
    },
}

/// Paths of a freshly produced image/annotation pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducedArtifacts {
    pub image: PathBuf,
    pub annotations: PathBuf,
}

/// Snapshot file name for an augmentation's image.
pub fn image_file_name(name: &str, extension: &str) -> String {
    format!("{}-image.{}", name, extension)
}

/// Snapshot file name for an augmentation's annotation file.
pub fn annotations_file_name(name: &str) -> String {
    format!("{}-bboxes", name)
}

/// Directory of stored snapshot pairs.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    directory: PathBuf,
    image_extension: String,
}

impl SnapshotStore {
    pub fn new(directory: impl Into<PathBuf>, image_extension: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            image_extension: image_extension.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn image_extension(&self) -> &str {
        &self.image_extension
    }

    pub fn image_path(&self, name: &str) -> PathBuf {
        self.directory
            .join(image_file_name(name, &self.image_extension))
    }

    pub fn annotations_path(&self, name: &str) -> PathBuf {
        self.directory.join(annotations_file_name(name))
    }

    /// Replace the stored pair for `name` with the produced files.
    pub fn record(&self, name: &str, produced: &ProducedArtifacts) -> Result<(), SnapshotError> {
        fs::create_dir_all(&self.directory).map_err(|source| SnapshotError::Io {
            path: self.directory.clone(),
            source,
        })?;

        for (from, to) in [
            (&produced.annotations, self.annotations_path(name)),
            (&produced.image, self.image_path(name)),
        ] {
            fs::copy(from, &to).map_err(|source| SnapshotError::Io {
                path: to.clone(),
                source,
            })?;
        }

        log::info!("Recorded snapshots for {} in {:?}", name, self.directory);
        Ok(())
    }

    /// Check the produced files against the stored pair, annotations first.
    pub fn verify(&self, name: &str, produced: &ProducedArtifacts) -> Result<(), SnapshotError> {
        self.verify_artifact(
            name,
            ArtifactKind::Annotations,
            &produced.annotations,
            &self.annotations_path(name),
        )?;
        self.verify_artifact(
            name,
            ArtifactKind::Image,
            &produced.image,
            &self.image_path(name),
        )?;
        log::info!("Snapshots match for {}", name);
        Ok(())
    }

    fn verify_artifact(
        &self,
        name: &str,
        artifact: ArtifactKind,
        produced: &Path,
        stored: &Path,
    ) -> Result<(), SnapshotError> {
        let stored_file = File::open(stored).map_err(|source| SnapshotError::Missing {
            name: name.to_string(),
            artifact,
            path: stored.to_path_buf(),
            source,
        })?;
        let produced_file = File::open(produced).map_err(|source| SnapshotError::Io {
            path: produced.to_path_buf(),
            source,
        })?;

        let same = files_identical(produced_file, stored_file).map_err(|source| {
            SnapshotError::Io {
                path: stored.to_path_buf(),
                source,
            }
        })?;

        if same {
            Ok(())
        } else {
            log::debug!("{} differs: {:?} vs {:?}", artifact, produced, stored);
            Err(SnapshotError::Mismatch {
                name: name.to_string(),
                artifact,
            })
        }
    }
}

/// Byte-exact comparison of two open files.
pub fn files_identical(a: File, b: File) -> std::io::Result<bool> {
    if a.metadata()?.len() != b.metadata()?.len() {
        return Ok(false);
    }

    let mut a = BufReader::new(a);
    let mut b = BufReader::new(b);
    let mut buf_a = vec![0u8; COMPARE_CHUNK];
    let mut buf_b = vec![0u8; COMPARE_CHUNK];

    loop {
        let read = read_full(&mut a, &mut buf_a)?;
        if read_full(&mut b, &mut buf_b[..read])? != read {
            return Ok(false);
        }
        if buf_a[..read] != buf_b[..read] {
            return Ok(false);
        }
        if read == 0 {
            return Ok(true);
        }
    }
}

/// Fill `buf` as far as possible; a short count means end of file.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn produce(dir: &Path, image: &[u8], bboxes: &[u8]) -> ProducedArtifacts {
        let produced = ProducedArtifacts {
            image: dir.join("out-image.jpg"),
            annotations: dir.join("out-bboxes"),
        };
        fs::write(&produced.image, image).unwrap();
        fs::write(&produced.annotations, bboxes).unwrap();
        produced
    }

    #[test]
    fn test_mode_from_flag() {
        assert_eq!(SnapshotMode::from_flag(None), SnapshotMode::Verify);
        assert_eq!(SnapshotMode::from_flag(Some("")), SnapshotMode::Verify);
        assert_eq!(SnapshotMode::from_flag(Some("0")), SnapshotMode::Verify);
        assert_eq!(SnapshotMode::from_flag(Some("1")), SnapshotMode::Update);
        assert_eq!(SnapshotMode::from_flag(Some(" TRUE ")), SnapshotMode::Update);
        assert_eq!(SnapshotMode::from_flag(Some("yes")), SnapshotMode::Update);
    }

    #[test]
    fn test_file_names() {
        let store = SnapshotStore::new("snaps", "jpg");
        assert_eq!(store.image_path("Rotate"), PathBuf::from("snaps/Rotate-image.jpg"));
        assert_eq!(store.annotations_path("Rotate"), PathBuf::from("snaps/Rotate-bboxes"));
    }

    #[test]
    fn test_record_then_verify() {
        let work = tempfile::tempdir().unwrap();
        let snaps = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(snaps.path().join("nested/augmentations"), "jpg");
        let produced = produce(work.path(), b"pixels", b"boxes");

        store.record("Blur", &produced).unwrap();
        store.verify("Blur", &produced).unwrap();
        assert_eq!(fs::read(store.image_path("Blur")).unwrap(), b"pixels");
    }

    #[test]
    fn test_missing_snapshot() {
        let work = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(work.path().join("absent"), "jpg");
        let produced = produce(work.path(), b"pixels", b"boxes");

        let err = store.verify("Rotate", &produced).unwrap_err();
        match &err {
            SnapshotError::Missing { name, artifact, .. } => {
                assert_eq!(name, "Rotate");
                assert_eq!(*artifact, ArtifactKind::Annotations);
            }
            other => panic!("unexpected error: {}", other),
        }
        assert!(err.to_string().contains("No such annotation file snapshot for Rotate"));
    }

    #[test]
    fn test_mismatch_names_artifact() {
        let work = tempfile::tempdir().unwrap();
        let snaps = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(snaps.path(), "jpg");
        store
            .record("Rotate", &produce(work.path(), b"pixels", b"boxes"))
            .unwrap();

        let err = store
            .verify("Rotate", &produce(work.path(), b"pixelz", b"boxes"))
            .unwrap_err();
        assert!(matches!(
            err,
            SnapshotError::Mismatch {
                artifact: ArtifactKind::Image,
                ..
            }
        ));
        assert_eq!(err.to_string(), "Images for Rotate do not match");

        let err = store
            .verify("Rotate", &produce(work.path(), b"pixels", b"boxes!"))
            .unwrap_err();
        assert_eq!(err.to_string(), "Bounding boxes for Rotate do not match");
    }

    #[test]
    fn test_files_identical_across_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let data: Vec<u8> = (0..(COMPARE_CHUNK * 2 + 17)).map(|i| (i % 251) as u8).collect();
        let mut other = data.clone();
        *other.last_mut().unwrap() ^= 1;

        fs::write(dir.path().join("a"), &data).unwrap();
        fs::write(dir.path().join("b"), &data).unwrap();
        fs::write(dir.path().join("c"), &other).unwrap();

        let open = |n: &str| File::open(dir.path().join(n)).unwrap();
        assert!(files_identical(open("a"), open("b")).unwrap());
        assert!(!files_identical(open("a"), open("c")).unwrap());
    }
}
