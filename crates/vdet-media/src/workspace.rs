//! Per-job transient storage.
//!
//! A [`JobWorkspace`] owns every temporary file a media job creates: the
//! staged copy of the uploaded input and the in-progress output artifact.
//! The workspace directory is removed exactly once when the job reaches
//! a terminal state, on every exit path; an unexpected unwind is covered
//! by the `TempDir` drop guard. Removal failures are logged and
//! swallowed so cleanup never masks the run's primary outcome.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, warn};

use vdet_models::JobId;

use crate::error::{MediaError, MediaResult};

/// Scoped temporary storage for one media job.
pub struct JobWorkspace {
    dir: TempDir,
    job_id: String,
}

impl JobWorkspace {
    /// Create the workspace directory, under `base` when given,
    /// otherwise under the system temp dir.
    pub fn create(job_id: &JobId, base: Option<&Path>) -> MediaResult<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(&format!("vdet-{}-", job_id));

        let dir = match base {
            Some(base) => {
                fs::create_dir_all(base)?;
                builder.tempdir_in(base)?
            }
            None => builder.tempdir()?,
        };

        debug!(job_id = %job_id, path = %dir.path().display(), "Job workspace created");
        Ok(Self {
            dir,
            job_id: job_id.to_string(),
        })
    }

    /// The workspace directory.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Stage uploaded bytes as a file the source can open.
    pub fn stage_input_bytes(&self, file_name: &str, bytes: &[u8]) -> MediaResult<PathBuf> {
        let path = self.dir.path().join(file_name);
        fs::write(&path, bytes)?;
        debug!(job_id = %self.job_id, path = %path.display(), "Staged input bytes");
        Ok(path)
    }

    /// Stage an existing file by copying it into the workspace.
    pub fn stage_input_file(&self, src: impl AsRef<Path>) -> MediaResult<PathBuf> {
        let src = src.as_ref();
        let file_name = src
            .file_name()
            .ok_or_else(|| MediaError::internal(format!("no file name: {}", src.display())))?;
        let path = self.dir.path().join(file_name);
        fs::copy(src, &path)?;
        debug!(job_id = %self.job_id, path = %path.display(), "Staged input file");
        Ok(path)
    }

    /// Path for the in-progress output artifact.
    pub fn output_path(&self, extension: &str) -> PathBuf {
        self.dir.path().join(format!("annotated.{}", extension))
    }

    /// Remove the workspace. Failures are non-fatal: they are logged at
    /// `warn` and swallowed.
    pub fn close(self) {
        let path = self.dir.path().to_path_buf();
        let job_id = self.job_id.clone();
        match self.dir.close() {
            Ok(()) => debug!(job_id = %job_id, path = %path.display(), "Job workspace removed"),
            Err(e) => warn!(
                job_id = %job_id,
                path = %path.display(),
                error = %e,
                "Failed to remove job workspace"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workspace_removed_on_close() {
        let ws = JobWorkspace::create(&JobId::new(), None).unwrap();
        let path = ws.path().to_path_buf();
        ws.stage_input_bytes("input.mp4", b"payload").unwrap();
        assert!(path.exists());

        ws.close();
        assert!(!path.exists());
    }

    #[test]
    fn test_workspace_removed_on_drop() {
        let path;
        {
            let ws = JobWorkspace::create(&JobId::new(), None).unwrap();
            path = ws.path().to_path_buf();
            ws.stage_input_bytes("frame.png", b"pixels").unwrap();
        }
        assert!(!path.exists());
    }

    #[test]
    fn test_workspace_under_custom_base() {
        let base = tempfile::TempDir::new().unwrap();
        let ws = JobWorkspace::create(&JobId::new(), Some(base.path())).unwrap();
        assert!(ws.path().starts_with(base.path()));
        ws.close();
    }

    #[test]
    fn test_stage_input_file_copies() {
        let dir = tempfile::TempDir::new().unwrap();
        let src = dir.path().join("upload.png");
        fs::write(&src, b"pixels").unwrap();

        let ws = JobWorkspace::create(&JobId::new(), None).unwrap();
        let staged = ws.stage_input_file(&src).unwrap();
        assert!(staged.exists());
        assert!(src.exists(), "staging copies, it does not move");
        assert_eq!(fs::read(&staged).unwrap(), b"pixels");
    }

    #[test]
    fn test_output_path_extension() {
        let ws = JobWorkspace::create(&JobId::new(), None).unwrap();
        assert!(ws.output_path("mp4").to_string_lossy().ends_with("annotated.mp4"));
    }
}
