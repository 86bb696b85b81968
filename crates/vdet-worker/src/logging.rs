//! Structured job logging utilities.

use tracing::{error, info, warn, Span};

use vdet_models::JobId;

/// Job logger with consistent contextual fields (job ID, source kind).
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    source_kind: String,
}

impl JobLogger {
    /// Create a logger for one job.
    pub fn new(job_id: &JobId, source_kind: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            source_kind: source_kind.to_string(),
        }
    }

    /// Log the start of a run.
    pub fn log_start(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            source = %self.source_kind,
            "Job started: {}", message
        );
    }

    /// Log a progress heartbeat.
    pub fn log_progress(&self, frames: u64, message: &str) {
        info!(
            job_id = %self.job_id,
            source = %self.source_kind,
            frames,
            "Job progress: {}", message
        );
    }

    /// Log a per-frame degradation or other warning.
    pub fn log_warning(&self, message: &str) {
        warn!(
            job_id = %self.job_id,
            source = %self.source_kind,
            "Job warning: {}", message
        );
    }

    /// Log a job-level failure.
    pub fn log_error(&self, message: &str) {
        error!(
            job_id = %self.job_id,
            source = %self.source_kind,
            "Job error: {}", message
        );
    }

    /// Log arrival at a terminal state.
    pub fn log_terminal(&self, state: &str, message: &str) {
        info!(
            job_id = %self.job_id,
            source = %self.source_kind,
            state,
            "Job finished: {}", message
        );
    }

    /// Create a tracing span for this job.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "job",
            job_id = %self.job_id,
            source = %self.source_kind
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_logger_creation() {
        let job_id = JobId::new();
        let logger = JobLogger::new(&job_id, "video_file");
        assert_eq!(logger.job_id, job_id.to_string());
        assert_eq!(logger.source_kind, "video_file");
    }
}
