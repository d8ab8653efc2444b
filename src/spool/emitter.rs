use std::fs::OpenOptions;
use std::io::{self, Write};
use std::os::unix::fs::{FileTypeExt, OpenOptionsExt, PermissionsExt};
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset};
use serde::Serialize;

use crate::clock::Clock;
use crate::errors::AlarmError;
use crate::models::alarm::job_file_name;
use crate::models::AlarmConfig;
use crate::spool::fire_time::next_fire_time;
use crate::spool::script::{self, ScriptParams};

/// Name of the FIFO `atd` watches for new work.
pub const TRIGGER: &str = "trigger";

/// Result of a successful `schedule`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduledAlarm {
    pub fire_time: DateTime<FixedOffset>,
    pub job_id: String,
}

impl ScheduledAlarm {
    pub fn timestamp(&self) -> i64 {
        self.fire_time.timestamp()
    }
}

/// Turns alarm requests into job files in the `at` spool.
pub struct JobEmitter {
    config: Arc<AlarmConfig>,
    clock: Arc<dyn Clock>,
}

impl JobEmitter {
    pub fn new(config: Arc<AlarmConfig>, clock: Arc<dyn Clock>) -> Self {
        Self { config, clock }
    }

    /// Schedule an alarm at the next `hour:minute`.
    ///
    /// Nothing is written unless every command the job needs resolves on
    /// `PATH`, the mixer preset exists and the `at` trigger FIFO is there.
    /// If `atd` turns out not to be reading the FIFO, the job file is
    /// removed again and `BackendUnavailable` is returned.
    pub fn schedule(
        &self,
        hour: u32,
        minute: u32,
        player_command: &str,
        repeat: u32,
    ) -> Result<ScheduledAlarm, AlarmError> {
        self.check_preconditions(player_command, repeat)?;

        let fire_time = next_fire_time(
            self.clock.now(),
            hour,
            minute,
            self.config.timezone.as_deref(),
        )?;

        let trigger = self.config.spool_dir.join(TRIGGER);
        check_trigger(&trigger)?;

        let script = script::render(&ScriptParams {
            alarm_cmd: player_command.to_string(),
            repeat,
            mixer_preset: self.config.mixer_preset.to_string_lossy().to_string(),
            state_tool: self.config.state_tool.clone(),
            mixer_tool: self.config.mixer_tool.clone(),
            mixer_control: self.config.mixer_control.clone(),
            volume_start: self.config.volume_start,
            volume_end: self.config.volume_end,
            app: self.config.app_command()?,
        });

        let job_id = job_file_name(fire_time.timestamp(), std::process::id());
        let path = self.config.spool_dir.join(&job_id);
        write_job_file(&path, &script)
            .map_err(|e| AlarmError::Storage(format!("{}: {}", path.display(), e)))?;

        if let Err(e) = poke_trigger(&trigger) {
            if let Err(rm_err) = std::fs::remove_file(&path) {
                tracing::warn!(
                    "Failed to remove job {} after trigger failure: {}",
                    path.display(),
                    rm_err
                );
            }
            return Err(AlarmError::BackendUnavailable(format!(
                "{}: {}; is atd running?",
                trigger.display(),
                e
            )));
        }

        tracing::info!("Scheduled alarm {} for {}", job_id, fire_time);
        Ok(ScheduledAlarm { fire_time, job_id })
    }

    fn check_preconditions(&self, player_command: &str, repeat: u32) -> Result<(), AlarmError> {
        let player = player_command
            .split_whitespace()
            .next()
            .ok_or_else(|| AlarmError::Configuration("player command is empty".to_string()))?;

        for cmd in [
            self.config.state_tool.as_str(),
            self.config.mixer_tool.as_str(),
            player,
        ] {
            if which::which(cmd).is_err() {
                return Err(AlarmError::Configuration(format!(
                    "command {} not found",
                    cmd
                )));
            }
        }

        if !self.config.mixer_preset.exists() {
            return Err(AlarmError::Configuration(format!(
                "{}: file not found",
                self.config.mixer_preset.display()
            )));
        }

        if repeat == 0 {
            return Err(AlarmError::Configuration(
                "repeat: must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

/// The trigger must exist and be a FIFO, otherwise `atd` is not set up.
fn check_trigger(trigger: &Path) -> Result<(), AlarmError> {
    match std::fs::metadata(trigger) {
        Ok(meta) if meta.file_type().is_fifo() => Ok(()),
        Ok(_) => Err(AlarmError::BackendUnavailable(format!(
            "{} is not a FIFO; is atd running?",
            trigger.display()
        ))),
        Err(e) => Err(AlarmError::BackendUnavailable(format!(
            "{}: {}; is atd running?",
            trigger.display(),
            e
        ))),
    }
}

fn write_job_file(path: &Path, script: &str) -> io::Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;
    file.write_all(script.as_bytes())?;
    file.flush()?;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
}

/// Tell `atd` there is new work. Opening non-blocking makes a FIFO without
/// a reader fail with ENXIO instead of hanging.
fn poke_trigger(trigger: &Path) -> io::Result<()> {
    let mut fifo = OpenOptions::new()
        .append(true)
        .custom_flags(libc::O_NONBLOCK)
        .open(trigger)?;
    fifo.write_all(b"\n")
}
