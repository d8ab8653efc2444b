// Alarm controller: cancels pending alarms and terminates firing ones.

use std::collections::BTreeSet;
use std::io;
use std::sync::Arc;

use crate::errors::AlarmError;
use crate::models::JobState;
use crate::process::{ProcessLocator, Signal, Signaller};
use crate::spool::{JobRegistry, JobStateFlag};

/// Diagnostic appended when a delete needed a kill but nothing was running.
pub const NO_ALARM_RUNNING: &str = "No alarm was running";

pub struct AlarmController {
    registry: JobRegistry,
    state: Arc<dyn JobStateFlag>,
    locator: ProcessLocator,
    signaller: Arc<dyn Signaller>,
}

impl AlarmController {
    pub fn new(
        registry: JobRegistry,
        state: Arc<dyn JobStateFlag>,
        locator: ProcessLocator,
        signaller: Arc<dyn Signaller>,
    ) -> Self {
        Self {
            registry,
            state,
            locator,
            signaller,
        }
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    /// Send SIGTERM to every live process executing a running alarm.
    ///
    /// Returns whether at least one signal reached a process. Several stale
    /// running files resolving to the same pid produce one signal.
    pub fn kill(&self) -> Result<bool, AlarmError> {
        let running = self.registry.list_running()?;

        let mut pids = BTreeSet::new();
        for job_id in &running {
            match self.locator.find_process(job_id) {
                Some(pid) => {
                    pids.insert(pid);
                }
                None => tracing::debug!("No live process for running job {}", job_id),
            }
        }

        let mut killed = false;
        for pid in pids {
            match self.signaller.send(pid, Signal::Terminate) {
                Ok(()) => {
                    tracing::info!("Sent SIGTERM to alarm process {}", pid);
                    killed = true;
                }
                Err(e) => tracing::warn!("Failed to signal alarm process {}: {}", pid, e),
            }
        }
        Ok(killed)
    }

    /// Delete a batch of alarms, best effort.
    ///
    /// Pending jobs are removed directly. A job that already started firing
    /// is stopped with a single `kill()` for the whole batch. Returns the
    /// newline-joined diagnostics, or `None` when everything succeeded.
    pub fn delete(&self, job_ids: &[String]) -> Option<String> {
        let mut diagnostics = Vec::new();
        let mut kill_owed = false;

        for job_id in job_ids {
            if job_id.contains('/') || job_id.is_empty() {
                diagnostics.push(format!("{}: invalid job id", job_id));
                continue;
            }
            match std::fs::remove_file(self.registry.spool_dir().join(job_id)) {
                Ok(()) => tracing::info!("Deleted pending alarm {}", job_id),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    if self.state.current_state(job_id) == Some(JobState::Running) {
                        tracing::debug!("Alarm {} is already firing", job_id);
                        kill_owed = true;
                    } else {
                        diagnostics.push(format!("{}: {}", job_id, e));
                    }
                }
                Err(e) => diagnostics.push(format!("{}: {}", job_id, e)),
            }
        }

        if kill_owed {
            match self.kill() {
                Ok(true) => {}
                Ok(false) => diagnostics.push(NO_ALARM_RUNNING.to_string()),
                Err(e) => diagnostics.push(e.to_string()),
            }
        }

        if diagnostics.is_empty() {
            None
        } else {
            Some(diagnostics.join("\n"))
        }
    }

    /// Delete every pending alarm scheduled for `timestamp`.
    pub fn delete_by_timestamp(&self, timestamp: i64) -> Result<Option<String>, AlarmError> {
        let ids: Vec<String> = self
            .registry
            .list_alarms()?
            .into_iter()
            .filter(|alarm| alarm.timestamp == timestamp)
            .map(|alarm| alarm.job_id)
            .collect();
        if ids.is_empty() {
            return Err(AlarmError::NotFound(format!(
                "no alarm scheduled at timestamp {}",
                timestamp
            )));
        }
        Ok(self.delete(&ids))
    }

    /// Wake the first watcher process that accepts SIGUSR1.
    pub fn notify_watcher(&self, app_name: &str) -> bool {
        let watchers = self.locator.find_watchers(app_name, std::process::id());
        for pid in watchers {
            match self.signaller.send(pid, Signal::Wake) {
                Ok(()) => {
                    tracing::info!("Woke watcher {}", pid);
                    return true;
                }
                Err(e) => tracing::debug!("Watcher {} did not take the signal: {}", pid, e),
            }
        }
        false
    }
}
