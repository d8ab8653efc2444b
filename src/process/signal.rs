use std::collections::BTreeSet;
use std::io;
use std::sync::Mutex;

/// Signals the alarm system sends between its processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Cancel a running job (SIGTERM).
    Terminate,
    /// Ask a watcher to show its dismiss prompt (SIGUSR1).
    Wake,
}

impl Signal {
    fn as_raw(self) -> libc::c_int {
        match self {
            Signal::Terminate => libc::SIGTERM,
            Signal::Wake => libc::SIGUSR1,
        }
    }
}

pub trait Signaller: Send + Sync {
    fn send(&self, pid: u32, signal: Signal) -> io::Result<()>;
}

/// Delivers signals with `kill(2)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LibcSignaller;

impl Signaller for LibcSignaller {
    fn send(&self, pid: u32, signal: Signal) -> io::Result<()> {
        // 0 and values that wrap negative address process groups.
        if pid == 0 || pid > i32::MAX as u32 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("refusing to signal pid {}", pid),
            ));
        }
        let rc = unsafe { libc::kill(pid as i32, signal.as_raw()) };
        if rc == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }
}

// --- Recording implementation for testing ---

/// Records every delivered signal. Pids marked dead fail with ESRCH.
#[derive(Debug, Default)]
pub struct RecordingSignaller {
    sent: Mutex<Vec<(u32, Signal)>>,
    dead: Mutex<BTreeSet<u32>>,
}

impl RecordingSignaller {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dead(self, pid: u32) -> Self {
        self.dead
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(pid);
        self
    }

    pub fn sent(&self) -> Vec<(u32, Signal)> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Signaller for RecordingSignaller {
    fn send(&self, pid: u32, signal: Signal) -> io::Result<()> {
        if self
            .dead
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&pid)
        {
            return Err(io::Error::from_raw_os_error(libc::ESRCH));
        }
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((pid, signal));
        Ok(())
    }
}
