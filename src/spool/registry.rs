use std::collections::BTreeSet;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::errors::AlarmError;
use crate::models::alarm::{classify, AlarmJob, JobState};
use crate::spool::script::{has_marker, MARKER_WINDOW};

/// Read-only view of the alarm jobs in an `at` spool directory.
#[derive(Debug, Clone)]
pub struct JobRegistry {
    spool_dir: PathBuf,
}

impl JobRegistry {
    pub fn new(spool_dir: PathBuf) -> Self {
        Self { spool_dir }
    }

    pub fn spool_dir(&self) -> &Path {
        &self.spool_dir
    }

    /// Pending alarms, ordered by timestamp then job id.
    pub fn list_alarms(&self) -> Result<Vec<AlarmJob>, AlarmError> {
        let mut alarms = self.scan(JobState::Pending)?;
        alarms.sort_by(|a, b| (a.timestamp, &a.job_id).cmp(&(b.timestamp, &b.job_id)));
        Ok(alarms)
    }

    /// Job ids (pending form) of alarms whose script has started.
    pub fn list_running(&self) -> Result<BTreeSet<String>, AlarmError> {
        Ok(self
            .scan(JobState::Running)?
            .into_iter()
            .map(|job| job.job_id)
            .collect())
    }

    fn scan(&self, wanted: JobState) -> Result<Vec<AlarmJob>, AlarmError> {
        let entries = std::fs::read_dir(&self.spool_dir).map_err(|e| {
            AlarmError::RegistryUnavailable(format!("{}: {}", self.spool_dir.display(), e))
        })?;

        let mut found = Vec::new();
        for entry in entries.flatten() {
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            let Some((job_id, timestamp, state)) = classify(name) else {
                continue;
            };
            if state != wanted {
                continue;
            }
            if !file_has_marker(&entry.path()) {
                tracing::debug!("Ignoring foreign spool entry {}", name);
                continue;
            }
            found.push(AlarmJob {
                timestamp,
                job_id,
                state,
            });
        }
        Ok(found)
    }
}

/// Whether the file at `path` starts with our marker. Unreadable files
/// (vanished, permission denied) are treated as foreign.
pub fn file_has_marker(path: &Path) -> bool {
    let mut head = Vec::with_capacity(MARKER_WINDOW);
    match File::open(path) {
        Ok(file) => match file.take(MARKER_WINDOW as u64).read_to_end(&mut head) {
            Ok(_) => has_marker(&head),
            Err(_) => false,
        },
        Err(_) => false,
    }
}
