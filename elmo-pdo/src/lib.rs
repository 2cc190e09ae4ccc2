//! # Elmo PDO
//!
//! Drives an Elmo motor controller over SocketCAN using its ASCII command set carried
//! in PDO frames.
//!
//! This library provides:
//! - A raw CAN transport bound to one controller node ([`BusHandle`])
//! - Bit-exact argument encoding and the firmware command table
//! - The command sequencer enforcing the ordering rules the firmware needs
//!   ([`MotorController`])
//! - An in-memory [`ScriptedBus`] for running all of the above without hardware
//!
//! ```no_run
//! use elmo_pdo::{BusHandle, ControllerConfig, MotorController, NodeId};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut bus: BusHandle = BusHandle::new("can0")?;
//! bus.open(NodeId::new(127)?)?;
//! let mut motor = MotorController::new(bus, ControllerConfig::default())?;
//! motor.send_echo_message()?;
//! motor.set_speed(30000)?;
//! motor.set_position(500000)?;
//! println!("position = {}", motor.get_position()?);
//! motor.into_bus().close()?;
//! # Ok(())
//! # }
//! ```

pub mod command;
pub mod config;
pub mod controller;
pub mod encoding;
pub mod error;
pub mod frame;
pub mod mock;
pub mod sequence;
pub mod socket;
pub mod transport;

// Re-export commonly used types for convenience
pub use command::{Argument, ArgumentKind, CommandSpec, PdoCommand, UnitMode};
pub use config::{CompositePolicy, ControllerConfig};
pub use controller::{check_echo_reply, MotorController, ECHO_REPLY};
pub use encoding::{decode_float, decode_int, encode_float, encode_int};
pub use error::{BusError, ControllerError, EchoError, EncodeError, SequenceError, StepFailure};
pub use frame::{make_frame, Frame, NodeId};
pub use mock::ScriptedBus;
pub use socket::RawCanSocket;
pub use transport::{BusHandle, FrameIo};
