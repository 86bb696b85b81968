//! Pipeline controller: Source -> Detector -> Sink.
//!
//! A single logical worker drives each job: pull one frame, detect,
//! annotate, emit to the sink, update progress, check cancellation,
//! repeat. Frames flow in strict source order with no parallel frame
//! processing, which keeps the output container playable.
//!
//! Per-frame detection failures degrade to emitting the unannotated
//! frame instead of aborting the run; job-level failures (source open,
//! sink open, sink write) terminate the run with a distinguishing cause.
//! Every path through a run releases the job workspace exactly once.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::debug;

use vdet_media::{
    draw_detections, frame_dimensions, frame_to_rgb, move_file, CameraSource, FrameSink,
    FrameSource, ImageSink, ImageSource, JobWorkspace, Mat, MediaError, MediaResult,
    ObjectDetector, VideoFileSource, VideoSink, DEFAULT_FPS,
};
use vdet_models::{Detection, JobId, JobState, MediaJob, Progress, ProgressState, SourceKind};

use crate::config::WorkerConfig;
use crate::logging::JobLogger;

/// Result of processing one frame, as an explicit tagged type so the
/// controller's branching is total rather than catch-and-ignore.
pub enum FrameOutcome {
    /// Detection succeeded; the frame carries rendered annotations.
    Annotated(Mat, Vec<Detection>),
    /// Detection failed recoverably; the original frame passes through.
    Degraded(Mat),
    /// The run cannot continue.
    Fatal(MediaError),
}

/// Distinguishing cause of a failed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Source unavailable: corrupt file, unsupported codec, dead device
    SourceOpen,
    /// Output target unavailable
    SinkOpen,
    /// Output write or flush failed mid-run
    SinkWrite,
    /// Unexpected failure inside the frame loop
    Internal,
}

/// Terminal summary of one pipeline run.
#[derive(Debug, Serialize)]
pub struct JobReport {
    pub job_id: JobId,
    pub state: JobState,
    pub frames_processed: u64,
    pub degraded_frames: u64,
    /// Delivered artifact; present for completed runs and for cancelled
    /// runs that wrote at least one frame
    pub output: Option<PathBuf>,
    pub failure: Option<FailureKind>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Per-progress-update callback.
pub type ProgressHook = Box<dyn FnMut(Progress) + Send>;

/// Live-display tap: sees every emitted frame without consuming it from
/// the encode path.
pub type FrameTap = Box<dyn FnMut(&Mat) + Send>;

/// Optional observers for a run.
#[derive(Default)]
pub struct PipelineHooks {
    pub on_progress: Option<ProgressHook>,
    pub on_frame: Option<FrameTap>,
}

/// Outcome of the frame loop, before artifact delivery.
pub struct DriveOutcome {
    pub state: JobState,
    pub frames_processed: u64,
    pub degraded_frames: u64,
    pub failure: Option<(FailureKind, String)>,
}

/// Drives Source -> Detector -> Sink for one job.
pub struct PipelineController {
    detector: Arc<dyn ObjectDetector>,
    cancel_rx: watch::Receiver<bool>,
    hooks: PipelineHooks,
    heartbeat_every: u64,
    max_frames: Option<u64>,
}

impl PipelineController {
    pub fn new(detector: Arc<dyn ObjectDetector>, cancel_rx: watch::Receiver<bool>) -> Self {
        Self {
            detector,
            cancel_rx,
            hooks: PipelineHooks::default(),
            heartbeat_every: 40,
            max_frames: None,
        }
    }

    /// Attach observers.
    pub fn with_hooks(mut self, hooks: PipelineHooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Heartbeat log interval in frames.
    pub fn with_heartbeat_every(mut self, frames: u64) -> Self {
        self.heartbeat_every = frames.max(1);
        self
    }

    /// Bound an otherwise unbounded run (camera) to a frame count.
    pub fn with_frame_cap(mut self, cap: Option<u64>) -> Self {
        self.max_frames = cap;
        self
    }

    fn cancelled(&self) -> bool {
        *self.cancel_rx.borrow()
    }

    /// Run one frame through the detector.
    ///
    /// Recoverable detection errors turn into `Degraded` carrying the
    /// original frame; everything else is fatal for the run.
    fn process_frame(&self, mut frame: Mat) -> FrameOutcome {
        let detections = match frame_to_rgb(&frame)
            .and_then(|(rgb, width, height)| self.detector.detect(&rgb, width, height))
        {
            Ok(detections) => detections,
            Err(e) if e.is_recoverable() => return FrameOutcome::Degraded(frame),
            Err(e) => return FrameOutcome::Fatal(e),
        };

        match draw_detections(&mut frame, &detections) {
            Ok(()) => FrameOutcome::Annotated(frame, detections),
            Err(e) if e.is_recoverable() => FrameOutcome::Degraded(frame),
            Err(e) => FrameOutcome::Fatal(e),
        }
    }

    /// The frame loop. Returns only terminal states.
    ///
    /// Cancellation is cooperative: the flag is polled at each iteration
    /// boundary, so it takes effect between frames, never mid-inference.
    pub fn drive(
        &mut self,
        source: &mut dyn FrameSource,
        sink: &mut dyn FrameSink,
        logger: &JobLogger,
    ) -> DriveOutcome {
        let mut progress = ProgressState::new(source.total_frames());
        let mut degraded_frames = 0u64;

        let terminal = loop {
            if self.cancelled() {
                logger.log_progress(progress.processed(), "cancellation requested, stopping");
                break (JobState::Cancelled, None);
            }
            if let Some(cap) = self.max_frames {
                if progress.processed() >= cap {
                    break (JobState::Completed, None);
                }
            }

            let frame = match source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break (JobState::Completed, None),
                Err(e) => break (JobState::Failed, Some((FailureKind::Internal, e.to_string()))),
            };

            let emitted = match self.process_frame(frame) {
                FrameOutcome::Annotated(frame, detections) => {
                    debug!(detections = detections.len(), "Frame annotated");
                    frame
                }
                FrameOutcome::Degraded(frame) => {
                    degraded_frames += 1;
                    logger.log_warning("detection failed, emitting unannotated frame");
                    frame
                }
                FrameOutcome::Fatal(e) => {
                    break (JobState::Failed, Some((FailureKind::Internal, e.to_string())));
                }
            };

            if let Some(tap) = self.hooks.on_frame.as_mut() {
                tap(&emitted);
            }
            if let Err(e) = sink.write(&emitted) {
                break (JobState::Failed, Some((FailureKind::SinkWrite, e.to_string())));
            }

            let current = progress.advance();
            if let Some(hook) = self.hooks.on_progress.as_mut() {
                hook(current);
            }
            if progress.processed() % self.heartbeat_every == 0 {
                logger.log_progress(progress.processed(), "frame loop heartbeat");
            }
        };

        let (state, failure) = terminal;
        DriveOutcome {
            state,
            frames_processed: progress.processed(),
            degraded_frames,
            failure,
        }
    }
}

/// Wraps a source whose first frame was pulled early to learn the
/// stream geometry; replays that frame before delegating.
struct PeekedSource {
    inner: Box<dyn FrameSource>,
    pending: Option<Mat>,
    dimensions: (u32, u32),
}

impl FrameSource for PeekedSource {
    fn next_frame(&mut self) -> MediaResult<Option<Mat>> {
        if let Some(frame) = self.pending.take() {
            return Ok(Some(frame));
        }
        self.inner.next_frame()
    }

    fn total_frames(&self) -> Option<u64> {
        self.inner.total_frames()
    }

    fn frame_rate(&self) -> Option<f64> {
        self.inner.frame_rate()
    }

    fn dimensions(&self) -> Option<(u32, u32)> {
        Some(self.dimensions)
    }
}

/// Run one media job end to end: stage input, open source and sink,
/// drive the frame loop, deliver the artifact, release the workspace.
///
/// Always produces a terminal report; job-level failures are carried in
/// `report.failure` with a single distinguishing cause.
pub fn run_media_job(
    job: &MediaJob,
    detector: Arc<dyn ObjectDetector>,
    cancel_rx: watch::Receiver<bool>,
    hooks: PipelineHooks,
    config: &WorkerConfig,
) -> JobReport {
    let started_at = Utc::now();
    let source_kind = match &job.source {
        SourceKind::Image { .. } => "image",
        SourceKind::VideoFile { .. } => "video_file",
        SourceKind::Camera { .. } => "camera",
    };
    let logger = JobLogger::new(&job.id, source_kind);
    let span = logger.create_span();
    let _guard = span.enter();

    logger.log_start("opening source and sink");

    let finish = |state: JobState,
                  frames: u64,
                  degraded: u64,
                  output: Option<PathBuf>,
                  failure: Option<(FailureKind, String)>| {
        let (failure_kind, error) = match failure {
            Some((kind, message)) => {
                logger.log_error(&message);
                (Some(kind), Some(message))
            }
            None => (None, None),
        };
        logger.log_terminal(state.as_str(), &format!("{} frames processed", frames));
        JobReport {
            job_id: job.id.clone(),
            state,
            frames_processed: frames,
            degraded_frames: degraded,
            output,
            failure: failure_kind,
            error,
            started_at,
            finished_at: Utc::now(),
        }
    };

    // Opening: workspace first, everything transient lives inside it.
    let workspace = match JobWorkspace::create(&job.id, config.work_dir.as_deref()) {
        Ok(ws) => ws,
        Err(e) => {
            return finish(
                JobState::Failed,
                0,
                0,
                None,
                Some((FailureKind::Internal, e.to_string())),
            )
        }
    };

    let mut controller = PipelineController::new(detector, cancel_rx)
        .with_hooks(hooks)
        .with_heartbeat_every(config.heartbeat_every)
        .with_frame_cap(match &job.source {
            SourceKind::Camera { .. } => config.camera_frame_cap,
            _ => None,
        });

    let (state, frames, degraded, output, failure) =
        open_and_drive(job, &workspace, &mut controller, &logger);

    // Release step: exactly once, after the sink is already finalized.
    workspace.close();

    finish(state, frames, degraded, output, failure)
}

/// Opening + Running portion of the state machine. The workspace
/// outlives this call; the sink is finalized before returning on every
/// path.
fn open_and_drive(
    job: &MediaJob,
    workspace: &JobWorkspace,
    controller: &mut PipelineController,
    logger: &JobLogger,
) -> (
    JobState,
    u64,
    u64,
    Option<PathBuf>,
    Option<(FailureKind, String)>,
) {
    // Acquire the source, staging file inputs into the workspace first
    // so the original upload can be released by the caller immediately.
    let mut source: Box<dyn FrameSource> = match open_source(&job.source, workspace) {
        Ok(source) => source,
        Err(e) => {
            return (
                JobState::Failed,
                0,
                0,
                None,
                Some((FailureKind::SourceOpen, e.to_string())),
            )
        }
    };

    // A camera may not report geometry until the first frame arrives;
    // pull it early so the sink can open at the right resolution.
    if job.source.is_stream() && source.dimensions().is_none() {
        match source.next_frame() {
            Ok(Some(frame)) => {
                let dimensions = frame_dimensions(&frame);
                source = Box::new(PeekedSource {
                    inner: source,
                    pending: Some(frame),
                    dimensions,
                });
            }
            Ok(None) => {
                // Device opened but never delivered a frame.
                return (JobState::Completed, 0, 0, None, None);
            }
            Err(e) => {
                return (
                    JobState::Failed,
                    0,
                    0,
                    None,
                    Some((FailureKind::SourceOpen, e.to_string())),
                );
            }
        }
    }

    // Acquire the sink inside the workspace.
    let scratch = workspace.output_path(job.source.output_extension());
    let mut sink: Box<dyn FrameSink> = if job.source.is_stream() {
        let (width, height) = match source.dimensions() {
            Some(dims) => dims,
            None => {
                return (
                    JobState::Failed,
                    0,
                    0,
                    None,
                    Some((
                        FailureKind::SourceOpen,
                        "source reports no frame dimensions".to_string(),
                    )),
                )
            }
        };
        let fps = source.frame_rate().unwrap_or(DEFAULT_FPS);
        match VideoSink::new(&scratch, fps, width, height) {
            Ok(sink) => Box::new(sink),
            Err(e) => {
                return (
                    JobState::Failed,
                    0,
                    0,
                    None,
                    Some((FailureKind::SinkOpen, e.to_string())),
                )
            }
        }
    } else {
        Box::new(ImageSink::new(&scratch))
    };

    // Running.
    let outcome = controller.drive(source.as_mut(), sink.as_mut(), logger);
    let mut state = outcome.state;
    let mut failure = outcome.failure;

    // Close/flush the sink before anything is deleted, on every path.
    let artifact = match sink.finalize() {
        Ok(artifact) => artifact,
        Err(e) => {
            if state != JobState::Failed {
                state = JobState::Failed;
                failure = Some((FailureKind::SinkWrite, e.to_string()));
            }
            None
        }
    };

    // Deliver the artifact for completed runs, and for cancelled runs so
    // partial output is preserved rather than discarded.
    let output = match (state, artifact) {
        (JobState::Completed | JobState::Cancelled, Some(artifact)) => {
            match move_file(&artifact, &job.output_target) {
                Ok(()) => Some(job.output_target.clone()),
                Err(e) => {
                    state = JobState::Failed;
                    failure = Some((FailureKind::Internal, e.to_string()));
                    None
                }
            }
        }
        _ => None,
    };

    (
        state,
        outcome.frames_processed,
        outcome.degraded_frames,
        output,
        failure,
    )
}

/// Open the job's source, staging file inputs into the workspace.
fn open_source(
    source: &SourceKind,
    workspace: &JobWorkspace,
) -> MediaResult<Box<dyn FrameSource>> {
    match source {
        SourceKind::Image { path } => {
            let staged = workspace.stage_input_file(path)?;
            Ok(Box::new(ImageSource::open(&staged)?))
        }
        SourceKind::VideoFile { path } => {
            let staged = workspace.stage_input_file(path)?;
            Ok(Box::new(VideoFileSource::open(&staged)?))
        }
        SourceKind::Camera { device_index } => Ok(Box::new(CameraSource::open(*device_index)?)),
    }
}
