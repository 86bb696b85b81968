//! Worker configuration.

use std::path::PathBuf;

use vdet_media::DetectorConfig;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Path to the ONNX model file
    pub model_path: String,
    /// Confidence threshold for detections
    pub confidence_threshold: f32,
    /// IoU threshold for NMS
    pub nms_threshold: f32,
    /// Model input size (square)
    pub input_size: u32,
    /// Base directory for job workspaces; system temp dir when unset
    pub work_dir: Option<PathBuf>,
    /// Log a progress heartbeat every N frames
    pub heartbeat_every: u64,
    /// Stop a camera run after this many frames; unbounded when unset
    pub camera_frame_cap: Option<u64>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            model_path: "models/yolov5s.onnx".to_string(),
            confidence_threshold: 0.25,
            nms_threshold: 0.45,
            input_size: 640,
            work_dir: None,
            heartbeat_every: 40,
            camera_frame_cap: None,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            model_path: std::env::var("VDET_MODEL_PATH").unwrap_or(defaults.model_path),
            confidence_threshold: std::env::var("VDET_CONFIDENCE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.confidence_threshold),
            nms_threshold: std::env::var("VDET_NMS_IOU")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.nms_threshold),
            input_size: std::env::var("VDET_INPUT_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.input_size),
            work_dir: std::env::var("VDET_WORK_DIR").ok().map(PathBuf::from),
            heartbeat_every: std::env::var("VDET_HEARTBEAT_FRAMES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.heartbeat_every),
            camera_frame_cap: std::env::var("VDET_CAMERA_FRAME_CAP")
                .ok()
                .and_then(|s| s.parse().ok()),
        }
    }

    /// Detector configuration slice of this config.
    pub fn detector_config(&self) -> DetectorConfig {
        DetectorConfig {
            model_path: self.model_path.clone(),
            confidence_threshold: self.confidence_threshold,
            nms_threshold: self.nms_threshold,
            input_size: self.input_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = WorkerConfig::default();
        assert_eq!(config.input_size, 640);
        assert!(config.work_dir.is_none());
        assert!(config.camera_frame_cap.is_none());
    }

    #[test]
    fn test_detector_config_slice() {
        let config = WorkerConfig {
            confidence_threshold: 0.5,
            ..Default::default()
        };
        let det = config.detector_config();
        assert!((det.confidence_threshold - 0.5).abs() < 0.001);
        assert_eq!(det.model_path, config.model_path);
    }
}
