//! Configuration types for gpuq

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main scheduler configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Control file configuration
    pub control: ControlConfig,
    /// Job invocation configuration
    pub job: JobConfig,
    /// Resource monitor configuration
    pub monitor: MonitorConfig,
    /// Supervisor configuration
    pub supervisor: SupervisorConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl SchedulerConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &std::path::Path) -> Result<Self, crate::GpuqError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            crate::GpuqError::Config(format!("Failed to read config file: {}", e))
        })?;
        toml::from_str(&content)
            .map_err(|e| crate::GpuqError::Config(format!("Failed to parse config: {}", e)))
    }
}

/// Control file configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Directory scanned for control files
    pub dir: PathBuf,
    /// File name stem (`command` matches `command.json`, `command3.json`)
    pub base_name: String,
    /// File extension, without the dot
    pub extension: String,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("control"),
            base_name: "command".to_string(),
            extension: "json".to_string(),
        }
    }
}

/// Job invocation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobConfig {
    /// Launcher executable
    pub program: String,
    /// Argument template; `{env}` and `{job}` are substituted
    pub args: Vec<String>,
    /// Named execution environment
    pub environment: String,
    /// Directory job identifiers are resolved against
    pub base_dir: PathBuf,
    /// What to do with a finished job's exit status
    pub exit_status: ExitStatusPolicy,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            program: "conda".to_string(),
            args: vec![
                "run".to_string(),
                "-n".to_string(),
                "{env}".to_string(),
                "python".to_string(),
                "{job}".to_string(),
            ],
            environment: "base".to_string(),
            base_dir: PathBuf::from("."),
            exit_status: ExitStatusPolicy::Discard,
        }
    }
}

/// Handling of a job's exit status.
///
/// The scheduler never acts on a job's success or failure; the policy only
/// decides whether a non-zero status is logged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExitStatusPolicy {
    /// Never inspect the status
    #[default]
    Discard,
    /// Log non-zero statuses at warn level
    Log,
}

/// Resource monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Process-listing command
    pub command: PathBuf,
    /// Extra arguments for the command
    pub args: Vec<String>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            command: PathBuf::from("nvidia-smi"),
            args: Vec::new(),
        }
    }
}

const DEFAULT_IDLE_INTERVAL_SECS: f64 = 60.0;

/// Supervisor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Seconds to wait between idle polls (fractions allowed)
    pub idle_interval_secs: f64,
    /// Keep running on an empty queue instead of exiting
    pub background_mode: bool,
}

impl SupervisorConfig {
    pub fn idle_interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.idle_interval_secs)
            .unwrap_or(Duration::from_secs(DEFAULT_IDLE_INTERVAL_SECS as u64))
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            idle_interval_secs: DEFAULT_IDLE_INTERVAL_SECS,
            background_mode: false,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
