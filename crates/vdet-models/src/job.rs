//! Media jobs and the job state machine.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique job identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(String);

impl JobId {
    /// Generate a fresh job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Supported image extensions.
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Supported video container extensions.
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi", "mov"];

/// The kind of media a job consumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum SourceKind {
    /// A single still image file.
    Image { path: PathBuf },
    /// A finite video container file.
    VideoFile { path: PathBuf },
    /// A live camera device, unbounded.
    Camera { device_index: i32 },
}

impl SourceKind {
    /// Classify a media file by extension.
    ///
    /// Returns `None` for extensions outside the supported
    /// jpg/jpeg/png + mp4/avi/mov set.
    pub fn from_path(path: impl AsRef<Path>) -> Option<Self> {
        let path = path.as_ref();
        let ext = path.extension()?.to_str()?.to_lowercase();
        if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            Some(Self::Image { path: path.to_path_buf() })
        } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            Some(Self::VideoFile { path: path.to_path_buf() })
        } else {
            None
        }
    }

    /// Whether this source produces a video stream (file or camera).
    pub fn is_stream(&self) -> bool {
        !matches!(self, Self::Image { .. })
    }

    /// Extension of the output artifact this source produces.
    pub fn output_extension(&self) -> &'static str {
        match self {
            Self::Image { .. } => "png",
            Self::VideoFile { .. } | Self::Camera { .. } => "mp4",
        }
    }
}

/// Describes one pipeline run.
///
/// Lifetime is bounded to a single run; all temp artifacts created for
/// the job are removed when the run reaches a terminal state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaJob {
    /// Unique job identifier
    pub id: JobId,
    /// What the job reads frames from
    pub source: SourceKind,
    /// Where the annotated artifact lands on success (or cancellation
    /// with partial output)
    pub output_target: PathBuf,
}

impl MediaJob {
    /// Create a job for a media file, classifying it by extension.
    pub fn for_file(input: impl AsRef<Path>, output_target: impl AsRef<Path>) -> Option<Self> {
        Some(Self {
            id: JobId::new(),
            source: SourceKind::from_path(input)?,
            output_target: output_target.as_ref().to_path_buf(),
        })
    }

    /// Create a job for a live camera device.
    pub fn for_camera(device_index: i32, output_target: impl AsRef<Path>) -> Self {
        Self {
            id: JobId::new(),
            source: SourceKind::Camera { device_index },
            output_target: output_target.as_ref().to_path_buf(),
        }
    }
}

/// Pipeline run states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Job created, not yet started
    #[default]
    Idle,
    /// Acquiring source and sink
    Opening,
    /// Frame loop in progress
    Running,
    /// All frames processed
    Completed,
    /// Stopped by external cancellation; partial output preserved
    Cancelled,
    /// Aborted by a job-level fatal error
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Idle => "idle",
            JobState::Opening => "opening",
            JobState::Running => "running",
            JobState::Completed => "completed",
            JobState::Cancelled => "cancelled",
            JobState::Failed => "failed",
        }
    }

    /// Check if this is a terminal state (no more transitions expected).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Cancelled | JobState::Failed
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_kind_classification() {
        assert!(matches!(
            SourceKind::from_path("photo.JPG"),
            Some(SourceKind::Image { .. })
        ));
        assert!(matches!(
            SourceKind::from_path("clip.mp4"),
            Some(SourceKind::VideoFile { .. })
        ));
        assert!(matches!(
            SourceKind::from_path("clip.mov"),
            Some(SourceKind::VideoFile { .. })
        ));
        assert!(SourceKind::from_path("notes.txt").is_none());
        assert!(SourceKind::from_path("no_extension").is_none());
    }

    #[test]
    fn test_output_extension() {
        let image = SourceKind::from_path("a.png").unwrap();
        assert_eq!(image.output_extension(), "png");
        assert!(!image.is_stream());

        let camera = SourceKind::Camera { device_index: 0 };
        assert_eq!(camera.output_extension(), "mp4");
        assert!(camera.is_stream());
    }

    #[test]
    fn test_job_state_terminal() {
        assert!(!JobState::Idle.is_terminal());
        assert!(!JobState::Opening.is_terminal());
        assert!(!JobState::Running.is_terminal());
        assert!(JobState::Completed.is_terminal());
        assert!(JobState::Cancelled.is_terminal());
        assert!(JobState::Failed.is_terminal());
    }

    #[test]
    fn test_job_ids_are_unique() {
        assert_ne!(JobId::new(), JobId::new());
    }

    #[test]
    fn test_source_kind_wire_format() {
        let camera = SourceKind::Camera { device_index: 1 };
        let json = serde_json::to_string(&camera).unwrap();
        assert_eq!(json, r#"{"kind":"camera","device_index":1}"#);

        let parsed: SourceKind = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, camera);
    }

    #[test]
    fn test_job_state_wire_format() {
        assert_eq!(
            serde_json::to_string(&JobState::Completed).unwrap(),
            r#""completed""#
        );
    }

    #[test]
    fn test_media_job_for_file_rejects_unsupported() {
        assert!(MediaJob::for_file("input.gif", "out.png").is_none());
        let job = MediaJob::for_file("input.avi", "out.mp4").unwrap();
        assert!(matches!(job.source, SourceKind::VideoFile { .. }));
    }
}
