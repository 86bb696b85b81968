//! Object detection capability boundary.
//!
//! The pipeline treats detection as an opaque, pure per-frame function:
//! RGB pixels in, detections out. The real implementation is a YOLO ONNX
//! model over ONNX Runtime; tests substitute fakes through the
//! [`ObjectDetector`] trait.

mod yolo;

pub use yolo::{YoloDetector, DetectorConfig};

use std::sync::{Arc, Mutex};

use vdet_models::Detection;

use crate::error::{MediaError, MediaResult};

/// Per-frame detection capability.
///
/// Implementations must be pure with respect to pipeline state: the same
/// frame always yields the same detections, and instances may be shared
/// read-only across concurrent jobs.
pub trait ObjectDetector: Send + Sync {
    /// Detect objects in one frame of raw RGB pixels (width * height * 3).
    fn detect(&self, rgb: &[u8], width: u32, height: u32) -> MediaResult<Vec<Detection>>;
}

/// Process-wide detector handle, loaded lazily on first use.
static SHARED: Mutex<Option<Arc<YoloDetector>>> = Mutex::new(None);

/// Get the process-wide detector, loading the model on first call.
///
/// Initialization is serialized: the model is loaded at most once, and
/// the config of the first successful call wins; later calls get the
/// same handle and their config is ignored. A failed load leaves the
/// slot empty so the next call retries.
///
/// Load failure is fatal for the caller and is reported as
/// `MediaError::ModelLoad` / `ModelNotFound`, distinct from per-frame
/// detection failures.
pub fn shared_detector(config: &DetectorConfig) -> MediaResult<Arc<YoloDetector>> {
    let mut shared = SHARED
        .lock()
        .map_err(|_| MediaError::internal("detector slot poisoned"))?;
    if let Some(detector) = shared.as_ref() {
        return Ok(detector.clone());
    }
    let detector = Arc::new(YoloDetector::load(config.clone())?);
    *shared = Some(detector.clone());
    Ok(detector)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_detector_load_failure_leaves_slot_retryable() {
        let config = DetectorConfig {
            model_path: "/nonexistent/yolov5s.onnx".to_string(),
            ..Default::default()
        };
        assert!(shared_detector(&config).is_err());
        // The failed attempt must not poison or half-populate the slot.
        assert!(shared_detector(&config).is_err());
    }
}
