pub mod alarm;
pub mod config;

pub use alarm::{AlarmJob, JobState};
pub use config::{AlarmConfig, ClockConfig, PlayerConfig};
