//! Error types for the transport, the PDO encoding and the command sequencer.

use std::collections::TryReserveError;
use std::io;

use thiserror::Error;

/// Transport level failures.
///
/// Resource errors (`Allocation`, `Socket`, `InterfaceLookup`, `Bind`) end the attempted
/// operation; I/O errors end the single frame exchange they occurred in.
#[derive(Error, Debug)]
pub enum BusError {
    #[error("could not allocate the interface name: {0}")]
    Allocation(#[from] TryReserveError),
    #[error("node id {0} is outside 1..=127")]
    InvalidNodeId(u8),
    #[error("socket creation failed: {0}")]
    Socket(#[source] io::Error),
    #[error("interface lookup failed for '{interface}': {source}")]
    InterfaceLookup {
        interface: String,
        #[source]
        source: io::Error,
    },
    #[error("bind to '{interface}' failed: {source}")]
    Bind {
        interface: String,
        #[source]
        source: io::Error,
    },
    #[error("closing the socket failed: {0}")]
    Close(#[source] io::Error),
    #[error("write failed: {0}")]
    Write(#[source] io::Error),
    #[error("short write: {written} of {expected} bytes accepted")]
    ShortWrite { written: usize, expected: usize },
    #[error("read failed: {0}")]
    Read(#[source] io::Error),
    #[error("short read: {read} of {expected} bytes")]
    ShortRead { read: usize, expected: usize },
    #[error("no reply within the receive timeout")]
    Timeout,
    #[error("bus handle is not open")]
    NotOpen,
    #[error("invalid frame: {0}")]
    Frame(#[from] EncodeError),
}

/// Frame and command construction failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error("data length code {0} exceeds 8")]
    InvalidLength(u8),
    #[error("identifier 0x{0:X} does not fit in 11 bits")]
    InvalidId(u32),
    #[error("command {command} expects a {expected} argument, got {actual}")]
    ArgumentMismatch {
        command: &'static str,
        expected: &'static str,
        actual: &'static str,
    },
}

/// Reasons the start-up echo self-test can fail.
#[derive(Error, Debug)]
pub enum EchoError {
    #[error("sending the echo request failed: {0}")]
    Send(#[source] BusError),
    #[error("receiving the echo reply failed: {0}")]
    Receive(#[source] BusError),
    #[error("echo reply on COB-ID 0x{actual:03X}, expected 0x{expected:03X}")]
    CobId { expected: u16, actual: u16 },
    #[error("echo reply has DLC {0}, expected 8")]
    Length(u8),
    #[error("echo reply byte {index} is 0x{actual:02X}, expected 0x{expected:02X}")]
    Byte { index: usize, expected: u8, actual: u8 },
}

/// One failing step of a composite operation.
#[derive(Debug)]
pub struct StepFailure {
    pub step: &'static str,
    pub error: BusError,
}

/// Failure of a composite operation, listing every step that failed.
#[derive(Error, Debug)]
#[error("{operation} failed in {} step(s): {}", .failures.len(), summarize(.failures))]
pub struct SequenceError {
    pub operation: &'static str,
    pub failures: Vec<StepFailure>,
}

fn summarize(failures: &[StepFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{} ({})", f.step, f.error))
        .collect::<Vec<_>>()
        .join(", ")
}

impl SequenceError {
    /// Names of the failed steps, in execution order.
    pub fn failed_steps(&self) -> Vec<&'static str> {
        self.failures.iter().map(|f| f.step).collect()
    }
}

/// Umbrella error for callers that do not care which layer failed.
#[derive(Error, Debug)]
pub enum ControllerError {
    #[error(transparent)]
    Bus(#[from] BusError),
    #[error(transparent)]
    Echo(#[from] EchoError),
    #[error(transparent)]
    Sequence(#[from] SequenceError),
    #[error("invalid configuration: {0}")]
    Config(String),
}
