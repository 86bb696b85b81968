//! Detection pipeline worker.
//!
//! This crate provides:
//! - The pipeline controller (source -> detector -> sink frame loop)
//! - Job lifecycle: workspace staging, artifact delivery, cleanup
//! - Cooperative cancellation via a watch channel
//! - Structured per-job logging

pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod pipeline;

pub use cli::CliArgs;
pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use logging::JobLogger;
pub use pipeline::{
    run_media_job, FailureKind, FrameOutcome, JobReport, PipelineController, PipelineHooks,
};
