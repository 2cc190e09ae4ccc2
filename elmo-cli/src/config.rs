use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use elmo_pdo::ControllerConfig;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    pub velocity_low: i32,
    pub velocity_high: i32,
    pub feedback_low: i32,
    pub feedback_high: i32,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            velocity_low: -320000,
            velocity_high: 320000,
            feedback_low: -320000,
            feedback_high: 320000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Milliseconds between readings.
    pub interval_ms: u64,
    /// Number of readings; 0 reads until the process is killed.
    pub count: u32,
    /// Directory for CSV telemetry logs. No log is written when unset.
    pub log_directory: Option<PathBuf>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            interval_ms: 500,
            count: 20,
            log_directory: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub interface: String,
    pub node_id: u8,
    pub speed: i32,
    pub position: i32,
    /// Torque for the force test, in amperes.
    pub force: f32,
    pub limits: Limits,
    pub telemetry: TelemetryConfig,
    pub controller: ControllerConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            interface: "can0".to_string(),
            node_id: 127,
            speed: 30000,
            position: 500000,
            force: 0.6,
            limits: Limits::default(),
            telemetry: TelemetryConfig::default(),
            controller: ControllerConfig::default(),
        }
    }
}

impl AppConfig {
    /// Get the path to the config file
    pub fn config_file_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "elmo", "elmo")
            .map(|proj_dirs| proj_dirs.config_dir().join("config.toml"))
    }

    /// Loads `path` if given, otherwise the platform config file.
    ///
    /// A missing platform config file yields the defaults; a missing explicit path is an error.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::load_from(path),
            None => match Self::config_file_path() {
                Some(path) if path.exists() => Self::load_from(&path),
                _ => {
                    debug!("no config file, using defaults");
                    Ok(Self::default())
                }
            },
        }
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config = toml::from_str(&contents)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        info!("loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Writes the configuration to `path`, or to the platform config file.
    pub fn save(&self, path: Option<&Path>) -> anyhow::Result<PathBuf> {
        let config_path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::config_file_path().context("could not determine config file path")?,
        };

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(&config_path, toml::to_string_pretty(self)?)?;
        info!("saved configuration to {}", config_path.display());
        Ok(config_path)
    }
}
