// Configuration loading and wiring of the core components.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::clock::SystemClock;
use crate::controller::AlarmController;
use crate::errors::AlarmError;
use crate::models::AlarmConfig;
use crate::process::{LibcSignaller, MatchPolicy, ProcFs, ProcessLocator};
use crate::spool::{JobEmitter, JobRegistry, RenameFlag};

/// Environment variable naming a directory that holds `config.json`.
pub const CONFIG_DIR_ENV: &str = "FFALARMS_CONFIG_DIR";

/// Load configuration with the following resolution order:
/// 1. Explicit `config_path` (must exist)
/// 2. `$FFALARMS_CONFIG_DIR/config.json`
/// 3. Platform config dir (`~/.config/ffalarms/config.json` on Linux)
/// 4. Defaults
pub fn load_config(config_path: Option<&Path>) -> Result<AlarmConfig, AlarmError> {
    // 1. Explicit config path
    if let Some(path) = config_path {
        if path.exists() {
            return read_config(path);
        }
        return Err(AlarmError::Configuration(format!(
            "Config file not found: {}",
            path.display()
        )));
    }

    // 2. FFALARMS_CONFIG_DIR env var
    if let Ok(config_dir) = std::env::var(CONFIG_DIR_ENV) {
        let path = PathBuf::from(&config_dir).join("config.json");
        if path.exists() {
            return read_config(&path);
        }
    }

    // 3. Platform config dir
    if let Some(config_dir) = dirs::config_dir() {
        let path = config_dir.join("ffalarms").join("config.json");
        if path.exists() {
            return read_config(&path);
        }
    }

    // 4. Defaults
    tracing::debug!("No config file found, using defaults");
    Ok(AlarmConfig::default())
}

fn read_config(path: &Path) -> Result<AlarmConfig, AlarmError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        AlarmError::Configuration(format!("Failed to read {}: {}", path.display(), e))
    })?;
    let mut config: AlarmConfig = serde_json::from_str(&content).map_err(|e| {
        AlarmError::Configuration(format!("Failed to parse {}: {}", path.display(), e))
    })?;
    config.source = Some(path.to_path_buf());
    tracing::info!("Loaded config from: {}", path.display());
    Ok(config)
}

/// The core components, built once per invocation from the configuration.
pub struct App {
    pub config: Arc<AlarmConfig>,
    pub emitter: JobEmitter,
    pub controller: AlarmController,
}

impl App {
    pub fn new(config: AlarmConfig) -> Self {
        let config = Arc::new(config);
        let emitter = JobEmitter::new(config.clone(), Arc::new(SystemClock));
        let locator = ProcessLocator::new(
            Arc::new(ProcFs::new(config.proc_root.clone())),
            MatchPolicy::new(&config.shell, &config.spool_dir),
        );
        let controller = AlarmController::new(
            JobRegistry::new(config.spool_dir.clone()),
            Arc::new(RenameFlag::new(config.spool_dir.clone())),
            locator,
            Arc::new(LibcSignaller),
        );
        Self {
            config,
            emitter,
            controller,
        }
    }

    pub fn registry(&self) -> &JobRegistry {
        self.controller.registry()
    }
}
