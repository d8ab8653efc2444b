use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::models::alarm::running_file_name;
use crate::models::config::absolute;
use crate::process::ProcessTable;

/// Subcommand a watcher process runs under; `find_watchers` looks for it.
pub const WATCH_SUBCOMMAND: &str = "watch";

/// The three predicates a process must satisfy to be the one executing a
/// given running job.
///
/// The shell keeps the argv it was started with, so argv carries the
/// pending name while the open script descriptor follows the renamed file.
#[derive(Debug, Clone)]
pub struct MatchPolicy {
    shell: String,
    spool_dir: PathBuf,
}

impl MatchPolicy {
    /// `spool_dir` is resolved to an absolute, symlink-free path so it can
    /// be compared with what procfs reports.
    pub fn new(shell: &str, spool_dir: &Path) -> Self {
        Self {
            shell: shell.to_string(),
            spool_dir: absolute(spool_dir),
        }
    }

    /// Absolute path of the job's running-form file.
    pub fn script_path(&self, job_id: &str) -> PathBuf {
        self.spool_dir.join(running_file_name(job_id))
    }

    /// argv is exactly `[shell, job_id]`.
    pub fn argv_matches(&self, cmdline: &[u8], job_id: &str) -> bool {
        let trimmed = cmdline.strip_suffix(&[0u8]).unwrap_or(cmdline);
        let mut args = trimmed.split(|b| *b == 0);
        args.next() == Some(self.shell.as_bytes())
            && args.next() == Some(job_id.as_bytes())
            && args.next().is_none()
    }

    pub fn cwd_matches(&self, cwd: &Path) -> bool {
        cwd == self.spool_dir
    }

    /// One of the descriptors is the renamed job script.
    pub fn fd_matches(&self, fd_targets: &[PathBuf], job_id: &str) -> bool {
        let script = self.script_path(job_id);
        fd_targets.iter().any(|target| *target == script)
    }
}

/// Maps running jobs to live pids by scanning a `ProcessTable`.
pub struct ProcessLocator {
    table: Arc<dyn ProcessTable>,
    policy: MatchPolicy,
}

impl ProcessLocator {
    pub fn new(table: Arc<dyn ProcessTable>, policy: MatchPolicy) -> Self {
        Self { table, policy }
    }

    /// First pid executing `job_id`, or `None` after a full scan.
    pub fn find_process(&self, job_id: &str) -> Option<u32> {
        let pids = match self.table.pids() {
            Ok(pids) => pids,
            Err(e) => {
                tracing::warn!("Cannot list processes: {}", e);
                return None;
            }
        };
        pids.into_iter().find(|&pid| self.is_match(pid, job_id))
    }

    fn is_match(&self, pid: u32, job_id: &str) -> bool {
        let Ok(cmdline) = self.table.cmdline(pid) else {
            return false;
        };
        if !self.policy.argv_matches(&cmdline, job_id) {
            return false;
        }
        match self.table.cwd(pid) {
            Ok(cwd) if self.policy.cwd_matches(&cwd) => {}
            Ok(cwd) => {
                tracing::debug!(
                    "pid {} runs {} but in {}, skipping",
                    pid,
                    job_id,
                    cwd.display()
                );
                return false;
            }
            Err(_) => return false,
        }
        match self.table.fd_targets(pid) {
            Ok(targets) => self.policy.fd_matches(&targets, job_id),
            Err(_) => false,
        }
    }

    /// Pids of watcher processes: `comm` equal to `app_name` and running the
    /// watch subcommand. `exclude` (normally the caller) is skipped.
    pub fn find_watchers(&self, app_name: &str, exclude: u32) -> Vec<u32> {
        let pids = match self.table.pids() {
            Ok(pids) => pids,
            Err(e) => {
                tracing::warn!("Cannot list processes: {}", e);
                return Vec::new();
            }
        };
        pids.into_iter()
            .filter(|&pid| pid != exclude)
            .filter(|&pid| matches!(self.table.comm(pid), Ok(comm) if comm == app_name))
            .filter(|&pid| match self.table.cmdline(pid) {
                Ok(cmdline) => cmdline
                    .split(|b| *b == 0)
                    .skip(1)
                    .any(|arg| arg == WATCH_SUBCOMMAND.as_bytes()),
                Err(_) => false,
            })
            .collect()
    }
}
