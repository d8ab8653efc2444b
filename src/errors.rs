use thiserror::Error;

#[derive(Debug, Error)]
pub enum AlarmError {
    /// A required command or file is missing, or a config value is malformed.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The `at` trigger FIFO is missing or not a FIFO, or nobody reads it.
    #[error("Scheduling backend unavailable: {0}")]
    BackendUnavailable(String),

    /// The spool directory itself cannot be listed.
    #[error("Registry unavailable: {0}")]
    RegistryUnavailable(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid time: {0}")]
    InvalidTime(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<std::io::Error> for AlarmError {
    fn from(err: std::io::Error) -> Self {
        AlarmError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for AlarmError {
    fn from(err: serde_json::Error) -> Self {
        AlarmError::Serialization(err.to_string())
    }
}
