//! CSV log of telemetry readings and sequence events.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use chrono::Local;
use csv::Writer;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub enum LogEvent {
    Reading { position: i32, force: f32 },
    ReadingFailed(String),
    Sequence { operation: &'static str, result: Result<(), String> },
}

pub struct TelemetryLog {
    writer: Writer<File>,
    path: PathBuf,
}

impl TelemetryLog {
    /// Creates a timestamped log file in `directory`.
    pub fn create(directory: &Path) -> anyhow::Result<Self> {
        fs::create_dir_all(directory)?;

        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        let path = directory.join(format!("elmo_telemetry_{}.csv", timestamp));

        let mut writer = Writer::from_writer(File::create(&path)?);
        writer.write_record(["Timestamp", "Event", "Position", "Force", "Message"])?;
        writer.flush()?;

        info!("telemetry log: {}", path.display());
        Ok(Self { writer, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn log(&mut self, event: LogEvent) {
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S%.3f").to_string();

        let (kind, position, force, message) = match event {
            LogEvent::Reading { position, force } => {
                ("READING", position.to_string(), force.to_string(), String::new())
            }
            LogEvent::ReadingFailed(err) => ("READING_FAILED", String::new(), String::new(), err),
            LogEvent::Sequence { operation, result } => match result {
                Ok(()) => ("SEQUENCE", String::new(), String::new(), format!("{} ok", operation)),
                Err(err) => ("SEQUENCE_FAILED", String::new(), String::new(), format!("{}: {}", operation, err)),
            },
        };

        if let Err(e) = self.writer.write_record([timestamp.as_str(), kind, position.as_str(), force.as_str(), message.as_str()]) {
            warn!("failed to write log entry: {}", e);
        }
        if let Err(e) = self.writer.flush() {
            warn!("failed to flush log file: {}", e);
        }
    }
}
