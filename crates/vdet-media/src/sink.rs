//! Frame sinks: PNG image artifact or incremental MP4 re-encode.

use std::path::{Path, PathBuf};

use opencv::core::{Mat, Size, Vector};
use opencv::imgcodecs;
use opencv::prelude::{MatTraitConst, VideoWriterTrait, VideoWriterTraitConst};
use opencv::videoio::VideoWriter;
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};

/// Consumes annotated frames and produces one output artifact.
///
/// Frames must arrive in source order. `finalize` flushes and closes the
/// artifact and returns its path, or `None` when nothing was written.
pub trait FrameSink: Send {
    /// Accept the next annotated frame.
    fn write(&mut self, frame: &Mat) -> MediaResult<()>;

    /// Frames accepted so far.
    fn frames_written(&self) -> u64;

    /// Flush and close the artifact. Idempotent.
    fn finalize(&mut self) -> MediaResult<Option<PathBuf>>;
}

/// Encodes a single annotated frame as a PNG, on finalize rather than
/// incrementally.
pub struct ImageSink {
    output: PathBuf,
    frame: Option<Mat>,
    finalized: bool,
}

impl ImageSink {
    pub fn new(output: impl AsRef<Path>) -> Self {
        Self {
            output: output.as_ref().to_path_buf(),
            frame: None,
            finalized: false,
        }
    }
}

impl FrameSink for ImageSink {
    fn write(&mut self, frame: &Mat) -> MediaResult<()> {
        if self.frame.is_some() {
            return Err(MediaError::sink_write(
                "image sink accepts exactly one frame",
            ));
        }
        // The sink owns its copy; the pipeline's frame does not outlive
        // the iteration.
        self.frame = Some(frame.clone());
        Ok(())
    }

    fn frames_written(&self) -> u64 {
        u64::from(self.frame.is_some())
    }

    fn finalize(&mut self) -> MediaResult<Option<PathBuf>> {
        if self.finalized {
            return Ok(self.frame.as_ref().map(|_| self.output.clone()));
        }
        self.finalized = true;

        let Some(frame) = self.frame.as_ref() else {
            return Ok(None);
        };

        let path_str = self.output.to_str().ok_or_else(|| {
            MediaError::sink_write(format!("non-UTF8 path: {}", self.output.display()))
        })?;

        let ok = imgcodecs::imwrite(path_str, frame, &Vector::new())
            .map_err(|e| MediaError::sink_write(format!("PNG encode failed: {}", e)))?;
        if !ok {
            return Err(MediaError::sink_write(format!(
                "PNG encode refused: {}",
                self.output.display()
            )));
        }

        debug!(path = %self.output.display(), "Image sink finalized");
        Ok(Some(self.output.clone()))
    }
}

/// Re-encodes annotated frames into an MP4 container with the `mp4v`
/// fourcc at the source's frame rate and resolution.
pub struct VideoSink {
    output: PathBuf,
    writer: VideoWriter,
    width: i32,
    height: i32,
    frames_written: u64,
    finalized: bool,
}

impl VideoSink {
    /// Open the output container eagerly.
    pub fn new(
        output: impl AsRef<Path>,
        fps: f64,
        width: u32,
        height: u32,
    ) -> MediaResult<Self> {
        let output = output.as_ref().to_path_buf();
        let path_str = output.to_str().ok_or_else(|| {
            MediaError::sink_write(format!("non-UTF8 path: {}", output.display()))
        })?;

        let fourcc = VideoWriter::fourcc('m', 'p', '4', 'v')
            .map_err(|e| MediaError::sink_write(format!("fourcc: {}", e)))?;

        let writer = VideoWriter::new(
            path_str,
            fourcc,
            fps,
            Size::new(width as i32, height as i32),
            true,
        )
        .map_err(|e| MediaError::sink_write(format!("failed to open video writer: {}", e)))?;

        if !writer.is_opened().unwrap_or(false) {
            return Err(MediaError::sink_write(format!(
                "output container unavailable: {}",
                output.display()
            )));
        }

        debug!(path = %output.display(), fps, width, height, "Video sink opened");

        Ok(Self {
            output,
            writer,
            width: width as i32,
            height: height as i32,
            frames_written: 0,
            finalized: false,
        })
    }
}

impl FrameSink for VideoSink {
    fn write(&mut self, frame: &Mat) -> MediaResult<()> {
        if self.finalized {
            return Err(MediaError::sink_write("video sink already finalized"));
        }
        if frame.cols() != self.width || frame.rows() != self.height {
            return Err(MediaError::sink_write(format!(
                "frame size {}x{} does not match container {}x{}",
                frame.cols(),
                frame.rows(),
                self.width,
                self.height
            )));
        }

        self.writer
            .write(frame)
            .map_err(|e| MediaError::sink_write(format!("frame encode failed: {}", e)))?;
        self.frames_written += 1;
        Ok(())
    }

    fn frames_written(&self) -> u64 {
        self.frames_written
    }

    fn finalize(&mut self) -> MediaResult<Option<PathBuf>> {
        if self.finalized {
            return Ok((self.frames_written > 0).then(|| self.output.clone()));
        }
        self.finalized = true;

        self.writer
            .release()
            .map_err(|e| MediaError::sink_write(format!("container flush failed: {}", e)))?;

        if self.frames_written == 0 {
            // Immediate cancellation leaves an empty container; drop it
            // and report that no artifact exists.
            if let Err(e) = std::fs::remove_file(&self.output) {
                warn!(path = %self.output.display(), error = %e, "Failed to remove empty container");
            }
            return Ok(None);
        }

        debug!(
            path = %self.output.display(),
            frames = self.frames_written,
            "Video sink finalized"
        );
        Ok(Some(self.output.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::core::{Scalar, CV_8UC3};

    fn black_frame(width: i32, height: i32) -> Mat {
        Mat::new_rows_cols_with_default(height, width, CV_8UC3, Scalar::all(0.0)).unwrap()
    }

    #[test]
    fn test_image_sink_accepts_exactly_one_frame() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut sink = ImageSink::new(dir.path().join("out.png"));
        let frame = black_frame(8, 8);

        sink.write(&frame).unwrap();
        let err = sink.write(&frame).unwrap_err();
        assert!(matches!(err, MediaError::SinkWrite { .. }));
        assert_eq!(sink.frames_written(), 1);
    }

    #[test]
    fn test_image_sink_encodes_on_finalize() {
        let dir = tempfile::TempDir::new().unwrap();
        let out = dir.path().join("out.png");
        let mut sink = ImageSink::new(&out);

        sink.write(&black_frame(8, 8)).unwrap();
        assert!(!out.exists(), "encode must be deferred to finalize");

        let artifact = sink.finalize().unwrap();
        assert_eq!(artifact, Some(out.clone()));
        assert!(out.exists());
    }

    #[test]
    fn test_empty_image_sink_produces_no_artifact() {
        let dir = tempfile::TempDir::new().unwrap();
        let out = dir.path().join("out.png");
        let mut sink = ImageSink::new(&out);
        assert_eq!(sink.finalize().unwrap(), None);
        assert!(!out.exists());
    }

    #[test]
    fn test_video_sink_writes_frames_in_order() {
        let dir = tempfile::TempDir::new().unwrap();
        let out = dir.path().join("out.mp4");
        let mut sink = VideoSink::new(&out, 30.0, 16, 16).unwrap();

        for _ in 0..3 {
            sink.write(&black_frame(16, 16)).unwrap();
        }
        assert_eq!(sink.frames_written(), 3);

        let artifact = sink.finalize().unwrap();
        assert_eq!(artifact, Some(out.clone()));
        assert!(out.exists());
    }

    #[test]
    fn test_video_sink_rejects_mismatched_frames() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut sink = VideoSink::new(dir.path().join("out.mp4"), 30.0, 16, 16).unwrap();
        let err = sink.write(&black_frame(8, 8)).unwrap_err();
        assert!(matches!(err, MediaError::SinkWrite { .. }));
    }

    #[test]
    fn test_video_sink_tolerates_zero_frames() {
        let dir = tempfile::TempDir::new().unwrap();
        let out = dir.path().join("out.mp4");
        let mut sink = VideoSink::new(&out, 30.0, 16, 16).unwrap();

        // Immediate cancellation: finalize without any writes.
        assert_eq!(sink.finalize().unwrap(), None);
        assert!(!out.exists(), "empty container must not survive");

        // Finalize is idempotent.
        assert_eq!(sink.finalize().unwrap(), None);
    }
}
