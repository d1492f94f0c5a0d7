//! Per-request temporary files.
//!
//! Each request gets a [`JobFiles`] guard holding a freshly generated id and the two paths derived
//! from it: `input_<id>.upload` for the staged upload and `output_<id>.mp3` for the encoder result.
//! Extensions are fixed; nothing the client sends (filename, content type) ends up in a path.
//!
//! Dropping the guard deletes whichever of the two files exist, so cleanup happens on every exit
//! path of the handler, including early returns and panics.

use std::path::{Path, PathBuf};

use tracing::{info, warn};
use uuid::Uuid;

/// Extension for staged uploads, whatever the client claims the file is.
pub const INPUT_EXTENSION: &str = "upload";

/// Extension for encoder output.
pub const OUTPUT_EXTENSION: &str = "mp3";

/// Scoped owner of one request's temporary input and output paths.
#[derive(Debug)]
pub struct JobFiles {
    id: Uuid,
    input: PathBuf,
    output: PathBuf,
}

impl JobFiles {
    /// Assign a new job id and derive its paths under `temp_dir`. Nothing is created on disk.
    pub fn new(temp_dir: &Path) -> Self {
        let id = Uuid::new_v4();
        Self {
            id,
            input: temp_dir.join(format!("input_{id}.{INPUT_EXTENSION}")),
            output: temp_dir.join(format!("output_{id}.{OUTPUT_EXTENSION}")),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn input_path(&self) -> &Path {
        &self.input
    }

    pub fn output_path(&self) -> &Path {
        &self.output
    }
}

impl Drop for JobFiles {
    fn drop(&mut self) {
        // Blocking unlinks: Drop can't await, and two removals don't stall the worker
        for path in [&self.input, &self.output] {
            match std::fs::remove_file(path) {
                Ok(()) => info!(job_id = %self.id, path = %path.display(), "Cleaned up temporary file"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(
                    job_id = %self.id,
                    path = %path.display(),
                    error = %e,
                    "Failed to remove temporary file"
                ),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_share_id_and_fixed_extensions() {
        let dir = tempfile::tempdir().unwrap();
        let job = JobFiles::new(dir.path());

        assert_eq!(job.input_path().parent(), Some(dir.path()));
        assert_eq!(job.output_path().parent(), Some(dir.path()));

        let input_name = job.input_path().file_name().unwrap().to_str().unwrap();
        let output_name = job.output_path().file_name().unwrap().to_str().unwrap();
        assert_eq!(input_name, format!("input_{}.upload", job.id()));
        assert_eq!(output_name, format!("output_{}.mp3", job.id()));
    }

    #[test]
    fn test_jobs_never_share_paths() {
        let dir = tempfile::tempdir().unwrap();
        let a = JobFiles::new(dir.path());
        let b = JobFiles::new(dir.path());

        assert_ne!(a.id(), b.id());
        assert_ne!(a.input_path(), b.input_path());
        assert_ne!(a.output_path(), b.output_path());
    }

    #[test]
    fn test_drop_removes_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let job = JobFiles::new(dir.path());
        let (input, output) = (job.input_path().to_path_buf(), job.output_path().to_path_buf());
        std::fs::write(&input, b"in").unwrap();
        std::fs::write(&output, b"out").unwrap();

        drop(job);

        assert!(!input.exists());
        assert!(!output.exists());
    }

    #[test]
    fn test_drop_tolerates_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let job = JobFiles::new(dir.path());
        std::fs::write(job.input_path(), b"only input was staged").unwrap();

        drop(job);

        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_drop_leaves_other_files_alone() {
        let dir = tempfile::tempdir().unwrap();
        let unrelated = dir.path().join("keep.txt");
        std::fs::write(&unrelated, b"keep").unwrap();

        drop(JobFiles::new(dir.path()));

        assert!(unrelated.exists());
    }
}
