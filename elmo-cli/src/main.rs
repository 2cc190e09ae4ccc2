//! # elmo
//!
//! Runs the start-up sequence against an Elmo controller (open, operational, echo
//! self-test), then a position or force test with periodic telemetry, then stops the
//! motor and closes the bus.
//!
//! ```bash
//! elmo --interface vcan0 position --target 500000 --speed 30000
//! elmo force --amps 0.6
//! ```

mod config;
mod telemetry;

use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use elmo_pdo::{BusError, BusHandle, CompositePolicy, MotorController, NodeId, SequenceError};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use config::AppConfig;
use telemetry::{LogEvent, TelemetryLog};

#[derive(Debug, Parser)]
#[command(name = "elmo", about = "Drive an Elmo motor controller over SocketCAN")]
struct Cli {
    /// Config file; defaults to the platform config directory.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// CAN interface name.
    #[arg(short, long, global = true)]
    interface: Option<String>,

    /// Controller node id (1-127).
    #[arg(short, long, global = true)]
    node_id: Option<u8>,

    /// Stop composite operations at the first failing step.
    #[arg(long, global = true)]
    strict: bool,

    /// Receive timeout in milliseconds.
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    /// Number of telemetry readings; 0 reads until killed.
    #[arg(long, global = true)]
    readings: Option<u32>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Set limits, drive to a position and print telemetry (default).
    Position {
        #[arg(long, allow_hyphen_values = true)]
        target: Option<i32>,
        #[arg(long)]
        speed: Option<i32>,
    },
    /// Set limits, drive with a constant torque and print telemetry.
    Force {
        #[arg(long, allow_hyphen_values = true)]
        amps: Option<f32>,
    },
    /// Open the bus and run the echo self-test only.
    Echo,
    /// Stop the motor.
    Stop,
    /// Write the effective configuration to the config file.
    WriteConfig,
}

impl Cli {
    fn apply(&self, config: &mut AppConfig) {
        if let Some(interface) = &self.interface {
            config.interface = interface.clone();
        }
        if let Some(node_id) = self.node_id {
            config.node_id = node_id;
        }
        if self.strict {
            config.controller.policy = CompositePolicy::Strict;
        }
        if let Some(ms) = self.timeout_ms {
            config.controller.receive_timeout = Some(Duration::from_millis(ms));
        }
        if let Some(readings) = self.readings {
            config.telemetry.count = readings;
        }
        match &self.command {
            Some(Command::Position { target, speed }) => {
                if let Some(target) = target {
                    config.position = *target;
                }
                if let Some(speed) = speed {
                    config.speed = *speed;
                }
            }
            Some(Command::Force { amps: Some(amps) }) => config.force = *amps,
            _ => {}
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let mut config = AppConfig::load(cli.config.as_deref())?;
    cli.apply(&mut config);

    if let Some(Command::WriteConfig) = cli.command {
        let path = config.save(cli.config.as_deref())?;
        println!("Configuration written to {}", path.display());
        return Ok(());
    }

    let node = NodeId::new(config.node_id)?;
    let mut log = match &config.telemetry.log_directory {
        Some(dir) => Some(TelemetryLog::create(dir)?),
        None => None,
    };

    let mut bus: BusHandle = BusHandle::new(&config.interface)?;
    bus.open(node)
        .with_context(|| format!("opening {} for node {}", config.interface, node))?;
    info!(interface = %config.interface, %node, "bus open");

    let mut motor = MotorController::new(bus, config.controller.clone())?;
    motor.send_echo_message().context("echo self-test failed")?;
    info!("echo self-test passed");

    let result = match cli.command {
        None | Some(Command::Position { .. }) => run_position(&mut motor, &config, &mut log),
        Some(Command::Force { .. }) => run_force(&mut motor, &config, &mut log),
        Some(Command::Echo) => {
            println!("Echo OK");
            return close(motor);
        }
        Some(Command::Stop) | Some(Command::WriteConfig) => Ok(()),
    };

    let stopped = motor.stop();
    record(&mut log, "stop", &stopped);
    if let Err(err) = &stopped {
        warn!("stop reported failures: {}", err);
    }

    close(motor)?;
    result?;
    stopped?;
    Ok(())
}

fn close(motor: MotorController) -> anyhow::Result<()> {
    motor.into_bus().close().context("closing the bus")?;
    info!("bus closed");
    Ok(())
}

fn set_limits(motor: &mut MotorController, config: &AppConfig, log: &mut Option<TelemetryLog>) -> Result<(), SequenceError> {
    let limits = &config.limits;
    let result = motor.set_limits(
        limits.velocity_low,
        limits.velocity_high,
        limits.feedback_low,
        limits.feedback_high,
    );
    record(log, "set_limits", &result);
    result
}

fn run_position(
    motor: &mut MotorController,
    config: &AppConfig,
    log: &mut Option<TelemetryLog>,
) -> anyhow::Result<()> {
    set_limits(motor, config, log)?;
    motor.set_speed(config.speed)?;

    let result = motor.set_position(config.position);
    record(log, "set_position", &result);
    result?;
    info!(target = config.position, speed = config.speed, "position move started");

    print_telemetry(motor, config, log);
    Ok(())
}

fn run_force(
    motor: &mut MotorController,
    config: &AppConfig,
    log: &mut Option<TelemetryLog>,
) -> anyhow::Result<()> {
    set_limits(motor, config, log)?;

    let result = motor.set_force(config.force);
    record(log, "set_force", &result);
    result?;
    info!(amps = config.force, "torque applied");

    print_telemetry(motor, config, log);
    Ok(())
}

/// Prints position and force readings until the configured count is reached.
fn print_telemetry(motor: &mut MotorController, config: &AppConfig, log: &mut Option<TelemetryLog>) {
    let interval = Duration::from_millis(config.telemetry.interval_ms);
    let mut taken = 0u32;

    let count = config.telemetry.count;
    while count == 0 || taken < count {
        match read_telemetry(motor) {
            Ok((position, force)) => {
                println!("position = {}\tforce = {:.3}", position, force);
                if let Some(log) = log {
                    log.log(LogEvent::Reading { position, force });
                }
            }
            Err(err) => {
                error!("telemetry read failed: {}", err);
                if let Some(log) = log {
                    log.log(LogEvent::ReadingFailed(err.to_string()));
                }
            }
        }

        taken = taken.saturating_add(1);
        thread::sleep(interval);
    }
}

fn read_telemetry(motor: &mut MotorController) -> Result<(i32, f32), BusError> {
    let position = motor.get_position()?;
    let force = motor.get_force()?;
    Ok((position, force))
}

fn record(log: &mut Option<TelemetryLog>, operation: &'static str, result: &Result<(), SequenceError>) {
    if let Some(log) = log {
        let result = result.as_ref().map(|_| ()).map_err(|err| err.to_string());
        log.log(LogEvent::Sequence { operation, result });
    }
}
