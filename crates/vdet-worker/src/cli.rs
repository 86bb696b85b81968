//! Command-line argument handling for the worker binary.

use vdet_models::MediaJob;

use crate::error::{WorkerError, WorkerResult};

pub const USAGE: &str = "\
Usage:
  vdet-worker <input-file> <output-path>
  vdet-worker --camera <device-index> <output-path>

Supported inputs: jpg, jpeg, png, mp4, avi, mov, or a live camera.
";

/// Parsed invocation.
#[derive(Debug)]
pub struct CliArgs {
    pub job: MediaJob,
}

impl CliArgs {
    /// Parse arguments (without the program name).
    pub fn parse<I>(args: I) -> WorkerResult<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let args: Vec<String> = args.into_iter().collect();

        let job = match args.as_slice() {
            [flag, index, output] if flag == "--camera" => {
                let device_index: i32 = index.parse().map_err(|_| {
                    WorkerError::invalid_input(format!("invalid camera index: {}", index))
                })?;
                MediaJob::for_camera(device_index, output)
            }
            [input, output] => MediaJob::for_file(input, output).ok_or_else(|| {
                WorkerError::invalid_input(format!("unsupported media format: {}", input))
            })?,
            _ => return Err(WorkerError::invalid_input("wrong number of arguments")),
        };

        Ok(Self { job })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vdet_models::SourceKind;

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_file_job() {
        let args = CliArgs::parse(strings(&["clip.mp4", "out.mp4"])).unwrap();
        assert!(matches!(args.job.source, SourceKind::VideoFile { .. }));
        assert_eq!(args.job.output_target, std::path::PathBuf::from("out.mp4"));
    }

    #[test]
    fn test_parse_camera_job() {
        let args = CliArgs::parse(strings(&["--camera", "0", "out.mp4"])).unwrap();
        assert!(matches!(
            args.job.source,
            SourceKind::Camera { device_index: 0 }
        ));
    }

    #[test]
    fn test_rejects_unsupported_format() {
        let err = CliArgs::parse(strings(&["notes.txt", "out.png"])).unwrap_err();
        assert!(matches!(err, WorkerError::InvalidInput(_)));
    }

    #[test]
    fn test_rejects_bad_camera_index() {
        let err = CliArgs::parse(strings(&["--camera", "zero", "out.mp4"])).unwrap_err();
        assert!(matches!(err, WorkerError::InvalidInput(_)));
    }

    #[test]
    fn test_rejects_missing_arguments() {
        assert!(CliArgs::parse(strings(&["only_one.mp4"])).is_err());
        assert!(CliArgs::parse(Vec::new()).is_err());
    }
}
