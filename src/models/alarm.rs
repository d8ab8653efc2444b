use serde::{Deserialize, Serialize};

/// Tag embedded in every job file name: `{timestamp}.ffalarms.{pid}`.
pub const JOB_TAG: &str = "ffalarms";

/// Prefix a job script puts in front of its own file name once it starts.
pub const RUNNING_PREFIX: &str = "x";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Running,
}

/// An alarm job found in the spool directory.
///
/// `job_id` is always the pending-form file name; the running file is
/// `x{job_id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmJob {
    pub timestamp: i64,
    pub job_id: String,
    pub state: JobState,
}

/// File name for a freshly scheduled job.
pub fn job_file_name(timestamp: i64, owner_pid: u32) -> String {
    format!("{}.{}.{}", timestamp, JOB_TAG, owner_pid)
}

/// File name the job carries while it is executing.
pub fn running_file_name(job_id: &str) -> String {
    format!("{}{}", RUNNING_PREFIX, job_id)
}

/// Leading timestamp of a pending-form name (`^\d+\.`).
pub fn parse_timestamp(name: &str) -> Option<i64> {
    let (digits, _) = name.split_once('.')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    match digits.parse() {
        Ok(ts) => Some(ts),
        Err(e) => {
            tracing::debug!("Ignoring spool entry {}: timestamp {}", name, e);
            None
        }
    }
}

/// Classify a spool entry name. Returns the pending-form job id, its
/// timestamp and the state implied by the name.
pub fn classify(name: &str) -> Option<(String, i64, JobState)> {
    if let Some(ts) = parse_timestamp(name) {
        return Some((name.to_string(), ts, JobState::Pending));
    }
    let rest = name.strip_prefix(RUNNING_PREFIX)?;
    let ts = parse_timestamp(rest)?;
    Some((rest.to_string(), ts, JobState::Running))
}
