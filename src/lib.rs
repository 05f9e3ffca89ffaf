//! augsnap - deterministic augmentation snapshots
//!
//! Image augmentations for object detection data plus a regression harness
//! that pins their output. Each augmentation runs on a fixed sample with a
//! fixed seed; the augmented image and its four-corner annotation file are
//! compared byte for byte against stored snapshots.
//!
//! ```rust,ignore
//! use augsnap::config::HarnessConfig;
//! use augsnap::harness::Harness;
//!
//! let harness = Harness::from_config(&HarnessConfig::default());
//! let report = harness.run_all(work_dir, &[])?;
//! assert!(report.is_success());
//! ```

pub mod annotation;
pub mod augmentations;
pub mod config;
pub mod constants;
pub mod error;
pub mod facade;
pub mod fixtures;
pub mod harness;
pub mod sample;
pub mod snapshot;
pub mod writers;

pub use error::{HarnessError, Result};
pub use harness::{CaseOutcome, Harness, RunReport};
