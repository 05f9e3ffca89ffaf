//! Global constants for augsnap

/// Seed used for every snapshot case unless configured otherwise
pub const DEFAULT_SEED: u64 = 1;

/// Directory holding per-augmentation option files
pub const DEFAULT_FIXTURES_DIR: &str = "fixtures";

/// Directory holding stored snapshot pairs
pub const DEFAULT_SNAPSHOTS_DIR: &str = "snapshots/augmentations";

/// Environment variable that switches the harness into update mode
pub const UPDATE_SNAPSHOTS_ENV: &str = "AUGSNAP_UPDATE_SNAPSHOTS";

/// Extension of per-augmentation option files
pub const FIXTURE_EXTENSION: &str = "yml";

/// Default JPEG quality for written images
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

/// Default sample image width
pub const SAMPLE_WIDTH: u32 = 256;

/// Default sample image height
pub const SAMPLE_HEIGHT: u32 = 192;

/// Boxes keeping less than this fraction of their area after a geometric
/// transform are dropped
pub const MIN_VISIBLE_AREA_FRACTION: f64 = 0.25;

/// Decimal places used for coordinates in annotation files
pub const COORDINATE_PRECISION: usize = 6;

/// File name of the image produced by the facade equivalence check
pub const EQUIVALENCE_IMAGE_STEM: &str = "aug_image";

/// File name of the annotations produced by the facade equivalence check
pub const EQUIVALENCE_ANNOTATIONS_FILE: &str = "aug_annotations.csv";
