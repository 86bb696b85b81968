//! Shared data models for the vdet detection pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Detections and bounding boxes
//! - Media jobs and their source kinds
//! - The job state machine
//! - Progress reporting (fractional or indeterminate)

pub mod detection;
pub mod job;
pub mod progress;

// Re-export common types
pub use detection::{BoundingBox, Detection, COCO_CLASSES};
pub use job::{JobId, JobState, MediaJob, SourceKind};
pub use progress::{Progress, ProgressState};
