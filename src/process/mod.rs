// Process table access: procfs for real processes, an in-memory table for
// tests.

pub mod locator;
pub mod signal;

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, Read};
use std::path::PathBuf;

pub use locator::{MatchPolicy, ProcessLocator};
pub use signal::{LibcSignaller, RecordingSignaller, Signal, Signaller};

/// Upper bound on bytes read from a process's command line.
pub const MAX_CMDLINE_BYTES: u64 = 4096;

/// Upper bound on file descriptors inspected per process.
pub const MAX_FDS_PER_PROCESS: usize = 1024;

/// Read-only access to per-process metadata, keyed by pid.
///
/// Every method may fail for a pid that exited after `pids()` listed it;
/// callers treat such failures as "not this process".
pub trait ProcessTable: Send + Sync {
    fn pids(&self) -> io::Result<Vec<u32>>;
    /// Raw NUL-separated argv.
    fn cmdline(&self, pid: u32) -> io::Result<Vec<u8>>;
    fn cwd(&self, pid: u32) -> io::Result<PathBuf>;
    /// Targets of the process's open file descriptors.
    fn fd_targets(&self, pid: u32) -> io::Result<Vec<PathBuf>>;
    /// Short command name (`comm`).
    fn comm(&self, pid: u32) -> io::Result<String>;
}

// --- procfs implementation ---

pub struct ProcFs {
    root: PathBuf,
}

impl ProcFs {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn pid_dir(&self, pid: u32) -> PathBuf {
        self.root.join(pid.to_string())
    }
}

impl ProcessTable for ProcFs {
    fn pids(&self) -> io::Result<Vec<u32>> {
        let mut pids = Vec::new();
        for entry in std::fs::read_dir(&self.root)?.flatten() {
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            if !name.is_empty() && name.bytes().all(|b| b.is_ascii_digit()) {
                if let Ok(pid) = name.parse() {
                    pids.push(pid);
                }
            }
        }
        Ok(pids)
    }

    fn cmdline(&self, pid: u32) -> io::Result<Vec<u8>> {
        let file = File::open(self.pid_dir(pid).join("cmdline"))?;
        let mut buf = Vec::new();
        file.take(MAX_CMDLINE_BYTES).read_to_end(&mut buf)?;
        Ok(buf)
    }

    fn cwd(&self, pid: u32) -> io::Result<PathBuf> {
        std::fs::read_link(self.pid_dir(pid).join("cwd"))
    }

    fn fd_targets(&self, pid: u32) -> io::Result<Vec<PathBuf>> {
        let mut targets = Vec::new();
        for entry in std::fs::read_dir(self.pid_dir(pid).join("fd"))?
            .flatten()
            .take(MAX_FDS_PER_PROCESS)
        {
            // A descriptor can close between readdir and readlink.
            if let Ok(target) = std::fs::read_link(entry.path()) {
                targets.push(target);
            }
        }
        Ok(targets)
    }

    fn comm(&self, pid: u32) -> io::Result<String> {
        let comm = std::fs::read_to_string(self.pid_dir(pid).join("comm"))?;
        Ok(comm.trim_end_matches('\n').to_string())
    }
}

// --- Mock implementation for testing ---

/// A process as seen by `MockProcessTable`.
#[derive(Debug, Clone, Default)]
pub struct MockProcess {
    pub argv: Vec<String>,
    pub cwd: PathBuf,
    pub fds: Vec<PathBuf>,
    pub comm: String,
}

impl MockProcess {
    pub fn new(argv: &[&str], cwd: impl Into<PathBuf>) -> Self {
        let comm = argv
            .first()
            .map(|a| a.rsplit('/').next().unwrap_or_default().to_string())
            .unwrap_or_default();
        Self {
            argv: argv.iter().map(|a| a.to_string()).collect(),
            cwd: cwd.into(),
            fds: Vec::new(),
            comm,
        }
    }

    pub fn with_fd(mut self, target: impl Into<PathBuf>) -> Self {
        self.fds.push(target.into());
        self
    }

    pub fn with_comm(mut self, comm: &str) -> Self {
        self.comm = comm.to_string();
        self
    }
}

/// In-memory process table. Pids registered with `with_vanished` are
/// listed but every read on them fails, like a process that exited mid-scan.
#[derive(Debug, Clone, Default)]
pub struct MockProcessTable {
    processes: BTreeMap<u32, MockProcess>,
    vanished: Vec<u32>,
}

impl MockProcessTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_process(mut self, pid: u32, process: MockProcess) -> Self {
        self.processes.insert(pid, process);
        self
    }

    pub fn with_vanished(mut self, pid: u32) -> Self {
        self.vanished.push(pid);
        self
    }

    fn get(&self, pid: u32) -> io::Result<&MockProcess> {
        self.processes
            .get(&pid)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("no process {}", pid)))
    }
}

impl ProcessTable for MockProcessTable {
    fn pids(&self) -> io::Result<Vec<u32>> {
        let mut pids: Vec<u32> = self.processes.keys().copied().collect();
        pids.extend(&self.vanished);
        pids.sort_unstable();
        Ok(pids)
    }

    fn cmdline(&self, pid: u32) -> io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        for arg in &self.get(pid)?.argv {
            buf.extend_from_slice(arg.as_bytes());
            buf.push(0);
        }
        Ok(buf)
    }

    fn cwd(&self, pid: u32) -> io::Result<PathBuf> {
        Ok(self.get(pid)?.cwd.clone())
    }

    fn fd_targets(&self, pid: u32) -> io::Result<Vec<PathBuf>> {
        Ok(self.get(pid)?.fds.clone())
    }

    fn comm(&self, pid: u32) -> io::Result<String> {
        Ok(self.get(pid)?.comm.clone())
    }
}
