//! YOLOv5 ONNX detector.
//!
//! Runs a pretrained YOLOv5 model (ONNX export) through ONNX Runtime
//! with automatic execution provider selection:
//! - CUDA on Linux with NVIDIA GPU (when `cuda` feature enabled)
//! - CoreML on macOS with Apple Silicon
//! - CPU fallback on all platforms

use std::path::Path;
use std::sync::Mutex;

use image::{DynamicImage, ImageBuffer, Rgb};
use ndarray::Array;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::{Tensor, Value};
use tracing::{debug, info};

use vdet_models::{BoundingBox, Detection, COCO_CLASSES};

use crate::detect::ObjectDetector;
use crate::error::{MediaError, MediaResult};

/// YOLOv5 output row layout: cx, cy, w, h, objectness, 80 class scores.
const ROW_FEATURES: usize = 5 + COCO_CLASSES.len();

/// Configuration for the YOLO detector.
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Path to the ONNX model file
    pub model_path: String,
    /// Confidence threshold for detections
    pub confidence_threshold: f32,
    /// IoU threshold for NMS
    pub nms_threshold: f32,
    /// Model input size (square)
    pub input_size: u32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model_path: "models/yolov5s.onnx".to_string(),
            confidence_threshold: 0.25,
            nms_threshold: 0.45,
            input_size: 640,
        }
    }
}

/// YOLOv5 detector over ONNX Runtime.
///
/// Inference is a pure function of the input frame; the session mutex
/// only serializes access to the runtime, so a single instance can be
/// shared across jobs.
pub struct YoloDetector {
    session: Mutex<Session>,
    config: DetectorConfig,
}

impl YoloDetector {
    /// Load the model. Fails with `ModelNotFound`/`ModelLoad` when the
    /// weights are missing or unreadable; callers treat this as fatal.
    pub fn load(config: DetectorConfig) -> MediaResult<Self> {
        let model_path = Path::new(&config.model_path);
        if !model_path.exists() {
            return Err(MediaError::ModelNotFound(model_path.to_path_buf()));
        }

        let session = Mutex::new(create_session(model_path)?);
        info!(
            model_path = %config.model_path,
            input_size = config.input_size,
            "YOLO detector initialized"
        );

        Ok(Self { session, config })
    }

    /// Get the configuration.
    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Preprocess: resize to square input, normalize to [0,1], NCHW.
    fn preprocess(&self, img: &DynamicImage) -> MediaResult<Value> {
        let input_size = self.config.input_size;

        let resized = img.resize_exact(
            input_size,
            input_size,
            image::imageops::FilterType::Triangle,
        );

        let rgb = resized.to_rgb8();
        let (w, h) = (input_size as usize, input_size as usize);

        // HWC -> CHW with normalization to [0, 1]
        let mut chw_data: Vec<f32> = Vec::with_capacity(3 * h * w);
        for c in 0..3 {
            for y in 0..h {
                for x in 0..w {
                    let pixel = rgb.get_pixel(x as u32, y as u32);
                    chw_data.push(pixel[c] as f32 / 255.0);
                }
            }
        }

        let shape = vec![1usize, 3, h, w];
        Tensor::from_array((shape, chw_data.into_boxed_slice()))
            .map(Value::from)
            .map_err(|e| MediaError::detection_failed(format!("failed to create tensor: {}", e)))
    }

    /// Run ONNX inference and return the flattened output tensor.
    fn run_inference(&self, input: Value) -> MediaResult<Vec<f32>> {
        let mut session = self
            .session
            .lock()
            .map_err(|_| MediaError::internal("session lock poisoned"))?;

        let outputs = session
            .run(ort::inputs![input])
            .map_err(|e| MediaError::detection_failed(format!("inference failed: {}", e)))?;

        // YOLOv5 exports name the tensor "output0" or "output" depending
        // on the exporter version.
        let output = outputs
            .get("output0")
            .or_else(|| outputs.get("output"))
            .ok_or_else(|| MediaError::detection_failed("missing output tensor"))?;

        let tensor = output
            .try_extract_tensor::<f32>()
            .map_err(|e| MediaError::detection_failed(format!("failed to extract tensor: {}", e)))?;

        Ok(tensor.1.iter().copied().collect())
    }

    /// Postprocess YOLOv5 output.
    ///
    /// Output format: [1, N, 85] where each row is
    /// (cx, cy, w, h, objectness, 80 class scores) in model input
    /// coordinates. Confidence is objectness * best class score.
    fn postprocess(
        &self,
        outputs: &[f32],
        orig_width: u32,
        orig_height: u32,
    ) -> MediaResult<Vec<Detection>> {
        if outputs.len() % ROW_FEATURES != 0 {
            return Err(MediaError::detection_failed(format!(
                "unexpected output size {} (not a multiple of {})",
                outputs.len(),
                ROW_FEATURES
            )));
        }
        let num_boxes = outputs.len() / ROW_FEATURES;

        let rows = Array::from_shape_vec((num_boxes, ROW_FEATURES), outputs.to_vec())
            .map_err(|e| MediaError::detection_failed(format!("failed to reshape output: {}", e)))?;

        let input_size = self.config.input_size as f32;
        let scale_w = orig_width as f32 / input_size;
        let scale_h = orig_height as f32 / input_size;

        let mut candidates: Vec<Detection> = Vec::new();

        for i in 0..num_boxes {
            let objectness = rows[[i, 4]];
            if objectness < self.config.confidence_threshold {
                continue;
            }

            let mut best_class = 0;
            let mut best_score = 0.0f32;
            for c in 0..COCO_CLASSES.len() {
                let score = rows[[i, 5 + c]];
                if score > best_score {
                    best_score = score;
                    best_class = c;
                }
            }

            let confidence = objectness * best_score;
            if confidence < self.config.confidence_threshold {
                continue;
            }

            // Center format in input coordinates -> corner format in
            // original pixels.
            let cx = rows[[i, 0]];
            let cy = rows[[i, 1]];
            let w = rows[[i, 2]];
            let h = rows[[i, 3]];

            let bbox = BoundingBox::new(
                (cx - w / 2.0) * scale_w,
                (cy - h / 2.0) * scale_h,
                w * scale_w,
                h * scale_h,
            )
            .clamp_to(orig_width as f32, orig_height as f32);

            if bbox.width <= 0.0 || bbox.height <= 0.0 {
                continue;
            }

            candidates.push(Detection::new(bbox, best_class, confidence));
        }

        Ok(non_maximum_suppression(
            candidates,
            self.config.nms_threshold,
        ))
    }
}

impl ObjectDetector for YoloDetector {
    fn detect(&self, rgb: &[u8], width: u32, height: u32) -> MediaResult<Vec<Detection>> {
        let expected_len = (width as usize) * (height as usize) * 3;
        if rgb.len() != expected_len {
            return Err(MediaError::detection_failed(format!(
                "invalid frame data length: expected {}, got {}",
                expected_len,
                rgb.len()
            )));
        }

        let img_buffer: ImageBuffer<Rgb<u8>, Vec<u8>> =
            ImageBuffer::from_raw(width, height, rgb.to_vec())
                .ok_or_else(|| MediaError::detection_failed("failed to create image buffer"))?;
        let img = DynamicImage::ImageRgb8(img_buffer);

        let input = self.preprocess(&img)?;
        let outputs = self.run_inference(input)?;
        let detections = self.postprocess(&outputs, width, height)?;

        debug!(count = detections.len(), "Detection completed");
        Ok(detections)
    }
}

/// Remove overlapping detections of the same class, keeping the highest
/// confidence one.
fn non_maximum_suppression(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    if detections.is_empty() {
        return detections;
    }

    detections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep = Vec::new();
    let mut suppressed = vec![false; detections.len()];

    for i in 0..detections.len() {
        if suppressed[i] {
            continue;
        }
        keep.push(detections[i].clone());

        for j in (i + 1)..detections.len() {
            if suppressed[j] || detections[i].class_id != detections[j].class_id {
                continue;
            }
            if detections[i].bbox.iou(&detections[j].bbox) > iou_threshold {
                suppressed[j] = true;
            }
        }
    }

    keep
}

/// Create ONNX Runtime session with automatic execution provider selection.
fn create_session(model_path: &Path) -> MediaResult<Session> {
    let model_bytes = std::fs::read(model_path)
        .map_err(|e| MediaError::model_load(format!("failed to read model file: {}", e)))?;

    let builder = Session::builder()
        .map_err(|e| MediaError::model_load(format!("failed to create session builder: {}", e)))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| MediaError::model_load(format!("failed to set optimization level: {}", e)))?;

    // Try CUDA on Linux with cuda feature
    #[cfg(all(target_os = "linux", feature = "cuda"))]
    {
        use ort::execution_providers::CUDAExecutionProvider;
        if let Ok(cuda_builder) = builder
            .clone()
            .with_execution_providers([CUDAExecutionProvider::default().build()])
        {
            if let Ok(session) = cuda_builder.commit_from_memory(&model_bytes) {
                info!("Using CUDA execution provider for detection");
                return Ok(session);
            }
        }
        debug!("CUDA execution provider not available, trying alternatives");
    }

    // Try CoreML on macOS
    #[cfg(target_os = "macos")]
    {
        use ort::execution_providers::CoreMLExecutionProvider;
        if let Ok(coreml_builder) = builder
            .clone()
            .with_execution_providers([CoreMLExecutionProvider::default().build()])
        {
            if let Ok(session) = coreml_builder.commit_from_memory(&model_bytes) {
                info!("Using CoreML execution provider for detection");
                return Ok(session);
            }
        }
        debug!("CoreML execution provider not available, using CPU");
    }

    // CPU fallback
    info!("Using CPU execution provider for detection");
    builder
        .commit_from_memory(&model_bytes)
        .map_err(|e| MediaError::model_load(format!("failed to load ONNX model: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detection(x: f32, class_id: usize, confidence: f32) -> Detection {
        Detection::new(BoundingBox::new(x, 0.0, 100.0, 100.0), class_id, confidence)
    }

    #[test]
    fn test_nms_suppresses_same_class_overlap() {
        let dets = vec![
            detection(0.0, 0, 0.9),
            detection(5.0, 0, 0.8), // heavy overlap, same class
            detection(500.0, 0, 0.7),
        ];
        let kept = non_maximum_suppression(dets, 0.45);
        assert_eq!(kept.len(), 2);
        assert!((kept[0].confidence - 0.9).abs() < 0.001);
    }

    #[test]
    fn test_nms_keeps_different_classes() {
        let dets = vec![detection(0.0, 0, 0.9), detection(5.0, 2, 0.8)];
        let kept = non_maximum_suppression(dets, 0.45);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn test_nms_empty_input() {
        assert!(non_maximum_suppression(Vec::new(), 0.45).is_empty());
    }

    #[test]
    fn test_missing_model_is_model_not_found() {
        let config = DetectorConfig {
            model_path: "/nonexistent/yolov5s.onnx".to_string(),
            ..Default::default()
        };
        let err = YoloDetector::load(config).unwrap_err();
        assert!(matches!(err, MediaError::ModelNotFound(_)));
    }

    #[test]
    fn test_config_default() {
        let config = DetectorConfig::default();
        assert_eq!(config.input_size, 640);
        assert!((config.confidence_threshold - 0.25).abs() < 0.001);
        assert!((config.nms_threshold - 0.45).abs() < 0.001);
    }
}
