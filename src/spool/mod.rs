//! Everything that reads or writes the `at` spool directory.

pub mod emitter;
pub mod fire_time;
pub mod registry;
pub mod script;

use std::io;
use std::path::PathBuf;

use crate::models::alarm::running_file_name;
use crate::models::JobState;

pub use emitter::{JobEmitter, ScheduledAlarm};
pub use registry::JobRegistry;

/// The pending/running flag of a job.
///
/// A job moves from pending to running exactly once, performed by the job
/// itself. Other processes only observe the state.
pub trait JobStateFlag: Send + Sync {
    /// Current state of `job_id`, or `None` if the job no longer exists.
    fn current_state(&self, job_id: &str) -> Option<JobState>;

    /// Mark `job_id` as running.
    fn transition(&self, job_id: &str) -> io::Result<()>;
}

/// State flag backed by the file name: `{id}` is pending, `x{id}` running.
/// A single `rename(2)` flips it atomically.
#[derive(Debug, Clone)]
pub struct RenameFlag {
    spool_dir: PathBuf,
}

impl RenameFlag {
    pub fn new(spool_dir: PathBuf) -> Self {
        Self { spool_dir }
    }
}

impl JobStateFlag for RenameFlag {
    fn current_state(&self, job_id: &str) -> Option<JobState> {
        // Check running first: the rename may land between the two lookups.
        if self.spool_dir.join(running_file_name(job_id)).exists() {
            Some(JobState::Running)
        } else if self.spool_dir.join(job_id).exists() {
            Some(JobState::Pending)
        } else {
            None
        }
    }

    fn transition(&self, job_id: &str) -> io::Result<()> {
        std::fs::rename(
            self.spool_dir.join(job_id),
            self.spool_dir.join(running_file_name(job_id)),
        )
    }
}
