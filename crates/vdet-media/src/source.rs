//! Frame sources: still image, video file, live camera.
//!
//! All three variants yield BGR `Mat` frames through the same
//! [`FrameSource`] trait. Sequences are lazy and non-restartable; a
//! source signals exhaustion by returning `Ok(None)`.

use std::path::Path;

use opencv::core::Mat;
use opencv::imgcodecs;
use opencv::prelude::{MatTraitConst, VideoCaptureTrait, VideoCaptureTraitConst};
use opencv::videoio::{
    VideoCapture, CAP_ANY, CAP_PROP_FPS, CAP_PROP_FRAME_COUNT, CAP_PROP_FRAME_HEIGHT,
    CAP_PROP_FRAME_WIDTH,
};
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};

/// Fallback frame rate when the container reports none.
pub const DEFAULT_FPS: f64 = 30.0;

/// Containers sometimes advertise absurd frame counts; anything above
/// this is treated as unknown.
const MAX_PLAUSIBLE_FRAME_COUNT: f64 = 1e9;

/// A lazy, ordered sequence of raw frames.
pub trait FrameSource: Send {
    /// Pull the next frame. `Ok(None)` signals end of sequence.
    fn next_frame(&mut self) -> MediaResult<Option<Mat>>;

    /// Total frame count when known (file sources); `None` for live
    /// devices and malformed containers.
    fn total_frames(&self) -> Option<u64>;

    /// Frame rate when known.
    fn frame_rate(&self) -> Option<f64>;

    /// Frame dimensions when known before the first frame.
    fn dimensions(&self) -> Option<(u32, u32)>;
}

/// A single still image: sequence of length one.
pub struct ImageSource {
    frame: Option<Mat>,
    width: u32,
    height: u32,
}

impl ImageSource {
    /// Decode an image file eagerly.
    pub fn open(path: impl AsRef<Path>) -> MediaResult<Self> {
        let path = path.as_ref();
        let path_str = path
            .to_str()
            .ok_or_else(|| MediaError::source_open(format!("non-UTF8 path: {}", path.display())))?;

        let frame = imgcodecs::imread(path_str, imgcodecs::IMREAD_COLOR)
            .map_err(|e| MediaError::source_open(format!("failed to read image: {}", e)))?;

        if frame.empty() {
            return Err(MediaError::source_open(format!(
                "image could not be decoded: {}",
                path.display()
            )));
        }

        let width = frame.cols() as u32;
        let height = frame.rows() as u32;
        debug!(path = %path.display(), width, height, "Opened image source");

        Ok(Self {
            frame: Some(frame),
            width,
            height,
        })
    }
}

impl FrameSource for ImageSource {
    fn next_frame(&mut self) -> MediaResult<Option<Mat>> {
        Ok(self.frame.take())
    }

    fn total_frames(&self) -> Option<u64> {
        Some(1)
    }

    fn frame_rate(&self) -> Option<f64> {
        None
    }

    fn dimensions(&self) -> Option<(u32, u32)> {
        Some((self.width, self.height))
    }
}

/// A finite video container decoded with OpenCV `VideoCapture`.
pub struct VideoFileSource {
    capture: VideoCapture,
    total_frames: Option<u64>,
    fps: f64,
    width: u32,
    height: u32,
    exhausted: bool,
}

impl VideoFileSource {
    /// Open a video container.
    pub fn open(path: impl AsRef<Path>) -> MediaResult<Self> {
        let path = path.as_ref();
        let path_str = path
            .to_str()
            .ok_or_else(|| MediaError::source_open(format!("non-UTF8 path: {}", path.display())))?;

        let capture = VideoCapture::from_file(path_str, CAP_ANY)
            .map_err(|e| MediaError::source_open(format!("failed to open video: {}", e)))?;

        if !capture.is_opened().unwrap_or(false) {
            return Err(MediaError::source_open(format!(
                "unreadable or unsupported video file: {}",
                path.display()
            )));
        }

        let fps = match capture.get(CAP_PROP_FPS) {
            Ok(v) if v.is_finite() && v > 0.0 => v,
            _ => {
                warn!(path = %path.display(), "Container reports no frame rate, assuming {}", DEFAULT_FPS);
                DEFAULT_FPS
            }
        };
        let width = capture.get(CAP_PROP_FRAME_WIDTH).unwrap_or(0.0) as u32;
        let height = capture.get(CAP_PROP_FRAME_HEIGHT).unwrap_or(0.0) as u32;

        // Frame count is best effort; malformed containers report zero,
        // negative or nonsense values.
        let total_frames = match capture.get(CAP_PROP_FRAME_COUNT) {
            Ok(v) if v.is_finite() && v > 0.0 && v < MAX_PLAUSIBLE_FRAME_COUNT => Some(v as u64),
            _ => None,
        };

        debug!(
            path = %path.display(),
            fps,
            width,
            height,
            total_frames = ?total_frames,
            "Opened video file source"
        );

        Ok(Self {
            capture,
            total_frames,
            fps,
            width,
            height,
            exhausted: false,
        })
    }
}

impl FrameSource for VideoFileSource {
    fn next_frame(&mut self) -> MediaResult<Option<Mat>> {
        if self.exhausted {
            return Ok(None);
        }

        let mut frame = Mat::default();
        let grabbed = self
            .capture
            .read(&mut frame)
            .map_err(|e| MediaError::internal(format!("frame read failed: {}", e)))?;

        if !grabbed || frame.empty() {
            self.exhausted = true;
            return Ok(None);
        }

        Ok(Some(frame))
    }

    fn total_frames(&self) -> Option<u64> {
        self.total_frames
    }

    fn frame_rate(&self) -> Option<f64> {
        Some(self.fps)
    }

    fn dimensions(&self) -> Option<(u32, u32)> {
        if self.width > 0 && self.height > 0 {
            Some((self.width, self.height))
        } else {
            None
        }
    }
}

/// A live camera device. Unbounded; ends only on cancellation or when
/// the device stops delivering frames.
pub struct CameraSource {
    capture: VideoCapture,
    fps: Option<f64>,
    dimensions: Option<(u32, u32)>,
}

impl CameraSource {
    /// Open a camera by device index.
    pub fn open(device_index: i32) -> MediaResult<Self> {
        let capture = VideoCapture::new(device_index, CAP_ANY)
            .map_err(|e| MediaError::source_open(format!("failed to open camera: {}", e)))?;

        if !capture.is_opened().unwrap_or(false) {
            return Err(MediaError::source_open(format!(
                "camera device {} unavailable",
                device_index
            )));
        }

        // Cameras may not report geometry until the first frame arrives.
        let fps = match capture.get(CAP_PROP_FPS) {
            Ok(v) if v.is_finite() && v > 0.0 => Some(v),
            _ => None,
        };
        let width = capture.get(CAP_PROP_FRAME_WIDTH).unwrap_or(0.0) as u32;
        let height = capture.get(CAP_PROP_FRAME_HEIGHT).unwrap_or(0.0) as u32;
        let dimensions = (width > 0 && height > 0).then_some((width, height));

        debug!(device_index, fps = ?fps, dimensions = ?dimensions, "Opened camera source");

        Ok(Self {
            capture,
            fps,
            dimensions,
        })
    }
}

impl FrameSource for CameraSource {
    fn next_frame(&mut self) -> MediaResult<Option<Mat>> {
        let mut frame = Mat::default();
        let grabbed = self
            .capture
            .read(&mut frame)
            .map_err(|e| MediaError::internal(format!("camera read failed: {}", e)))?;

        if !grabbed || frame.empty() {
            // Device stopped delivering; treat as end of stream.
            return Ok(None);
        }

        if self.dimensions.is_none() {
            self.dimensions = Some((frame.cols() as u32, frame.rows() as u32));
        }

        Ok(Some(frame))
    }

    fn total_frames(&self) -> Option<u64> {
        None
    }

    fn frame_rate(&self) -> Option<f64> {
        self.fps
    }

    fn dimensions(&self) -> Option<(u32, u32)> {
        self.dimensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_image_is_source_open_failure() {
        let err = ImageSource::open("/nonexistent/picture.png").unwrap_err();
        assert!(matches!(err, MediaError::SourceOpen { .. }));
    }

    #[test]
    fn test_corrupt_video_is_source_open_failure() {
        // A text file is not a decodable container.
        let dir = tempfile::TempDir::new().unwrap();
        let bogus = dir.path().join("not_a_video.mp4");
        std::fs::write(&bogus, b"this is not an mp4").unwrap();

        let err = VideoFileSource::open(&bogus).unwrap_err();
        assert!(matches!(err, MediaError::SourceOpen { .. }));
    }

    #[test]
    fn test_missing_video_is_source_open_failure() {
        let err = VideoFileSource::open("/nonexistent/clip.mp4").unwrap_err();
        assert!(matches!(err, MediaError::SourceOpen { .. }));
    }
}
