#![deny(unreachable_patterns)]
//! Media I/O and inference for the vdet pipeline.
//!
//! This crate provides:
//! - Frame sources over OpenCV (still image, video file, live camera)
//! - Frame sinks (PNG artifact, incremental `mp4v` re-encode)
//! - YOLO ONNX object detection over ONNX Runtime
//! - Annotation rendering onto BGR frames
//! - Per-job temp-file lifecycle with guaranteed release

pub mod annotate;
pub mod detect;
pub mod error;
pub mod fs_utils;
pub mod sink;
pub mod source;
pub mod workspace;

pub use annotate::{draw_detections, frame_dimensions, frame_to_rgb};
pub use detect::{shared_detector, DetectorConfig, ObjectDetector, YoloDetector};
pub use error::{MediaError, MediaResult};
pub use fs_utils::move_file;
pub use sink::{FrameSink, ImageSink, VideoSink};
pub use source::{CameraSource, FrameSource, ImageSource, VideoFileSource, DEFAULT_FPS};
pub use workspace::JobWorkspace;

/// Re-export of the OpenCV matrix type that flows through sources,
/// the detector boundary and sinks.
pub use opencv::core::Mat;
