use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::AlarmError;

/// Runtime configuration. Every field has a default so a partial (or empty)
/// JSON document is a valid config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlarmConfig {
    #[serde(default = "default_spool_dir")]
    pub spool_dir: PathBuf,
    #[serde(default = "default_proc_root")]
    pub proc_root: PathBuf,
    #[serde(default = "default_shell")]
    pub shell: String,
    #[serde(default = "default_state_tool")]
    pub state_tool: String,
    #[serde(default = "default_mixer_tool")]
    pub mixer_tool: String,
    #[serde(default = "default_mixer_preset")]
    pub mixer_preset: PathBuf,
    #[serde(default = "default_mixer_control")]
    pub mixer_control: String,
    #[serde(default = "default_volume_start")]
    pub volume_start: u32,
    #[serde(default = "default_volume_end")]
    pub volume_end: u32,
    /// Command the job script uses to reach this program. Defaults to the
    /// running executable.
    #[serde(default)]
    pub app_command: Option<String>,
    #[serde(default = "default_app_name")]
    pub app_name: String,
    /// IANA zone for wall-clock computations; the process local zone if unset.
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default = "default_prompt_timeout_secs")]
    pub prompt_timeout_secs: u64,
    #[serde(default)]
    pub alarm: PlayerConfig,
    #[serde(default)]
    pub clock: ClockConfig,
    /// File this configuration was loaded from, if any.
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerConfig {
    /// Player command template; `{file}` is replaced with the quoted file.
    #[serde(default = "default_player")]
    pub player: String,
    #[serde(default = "default_alarm_file")]
    pub file: String,
    #[serde(default = "default_repeat")]
    pub repeat: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClockConfig {
    #[serde(default = "default_true", alias = "24hr_format")]
    pub time_24hr_format: bool,
}

fn default_spool_dir() -> PathBuf {
    PathBuf::from("/var/spool/at")
}

fn default_proc_root() -> PathBuf {
    PathBuf::from("/proc")
}

fn default_shell() -> String {
    "/bin/sh".to_string()
}

fn default_state_tool() -> String {
    "alsactl".to_string()
}

fn default_mixer_tool() -> String {
    "amixer".to_string()
}

fn default_mixer_preset() -> PathBuf {
    PathBuf::from("/usr/share/openmoko/scenarios/stereoout.state")
}

fn default_mixer_control() -> String {
    "PCM,0".to_string()
}

fn default_volume_start() -> u32 {
    150
}

fn default_volume_end() -> u32 {
    255
}

fn default_app_name() -> String {
    "ffalarms".to_string()
}

fn default_prompt_timeout_secs() -> u64 {
    10
}

fn default_player() -> String {
    "aplay {file}".to_string()
}

fn default_alarm_file() -> String {
    "/usr/share/ffalarms/alarm.wav".to_string()
}

fn default_repeat() -> u32 {
    300
}

fn default_true() -> bool {
    true
}

impl Default for AlarmConfig {
    fn default() -> Self {
        Self {
            spool_dir: default_spool_dir(),
            proc_root: default_proc_root(),
            shell: default_shell(),
            state_tool: default_state_tool(),
            mixer_tool: default_mixer_tool(),
            mixer_preset: default_mixer_preset(),
            mixer_control: default_mixer_control(),
            volume_start: default_volume_start(),
            volume_end: default_volume_end(),
            app_command: None,
            app_name: default_app_name(),
            timezone: None,
            prompt_timeout_secs: default_prompt_timeout_secs(),
            alarm: PlayerConfig::default(),
            clock: ClockConfig::default(),
            source: None,
        }
    }
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            player: default_player(),
            file: default_alarm_file(),
            repeat: default_repeat(),
        }
    }
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            time_24hr_format: default_true(),
        }
    }
}

impl AlarmConfig {
    /// Render the player command with the alarm file substituted.
    ///
    /// Fails if the alarm file does not exist, since the job would otherwise
    /// fire in silence.
    pub fn player_command(&self) -> Result<String, AlarmError> {
        let file = expand_home(&self.alarm.file);
        if !file.exists() {
            return Err(AlarmError::Configuration(format!(
                "{}: given alarm file does not exist",
                file.display()
            )));
        }
        let quoted = shell_quote(&file.to_string_lossy());
        Ok(self.alarm.player.replace("{file}", &quoted))
    }

    pub fn repeat(&self) -> Result<u32, AlarmError> {
        if self.alarm.repeat == 0 {
            return Err(AlarmError::Configuration(
                "repeat: must be at least 1".to_string(),
            ));
        }
        Ok(self.alarm.repeat)
    }

    pub fn time_24hr_format(&self) -> bool {
        self.clock.time_24hr_format
    }

    /// Shell-ready command for invoking this program from a job script.
    ///
    /// Without an explicit `app_command` this is the running executable,
    /// pointed at the same config file and spool directory as the caller so
    /// `notify` and `prompt` from the job see the same alarms.
    pub fn app_command(&self) -> Result<String, AlarmError> {
        if let Some(cmd) = &self.app_command {
            return Ok(cmd.clone());
        }
        let exe = std::env::current_exe().map_err(|e| {
            AlarmError::Configuration(format!("cannot determine executable path: {}", e))
        })?;
        Ok(self.app_command_for(&exe))
    }

    fn app_command_for(&self, exe: &Path) -> String {
        let mut cmd = shell_quote(&exe.to_string_lossy());
        if let Some(source) = &self.source {
            cmd.push_str(" --config ");
            cmd.push_str(&shell_quote(&absolute(source).to_string_lossy()));
        }
        cmd.push_str(" --spool-dir ");
        cmd.push_str(&shell_quote(&absolute(&self.spool_dir).to_string_lossy()));
        cmd
    }
}

/// `path` made absolute: resolved if it exists, otherwise joined to the
/// current directory.
pub fn absolute(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    })
}

/// Quote a string for `/bin/sh`. Single quotes unless the string contains
/// one, in which case double quotes with `$`, backtick, `\` and `"` escaped.
pub fn shell_quote(s: &str) -> String {
    if !s.contains('\'') {
        return format!("'{}'", s);
    }
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        if matches!(c, '$' | '`' | '\\' | '"') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

/// Expand a leading `~` to the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    } else if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    Path::new(path).to_path_buf()
}
