//! The ASCII command table understood by the controller firmware.
//!
//! Every command is a two-letter mnemonic in bytes 0..2, an array index in byte 2, the
//! float marker in byte 3 and an optional 32-bit argument in bytes 4..8.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::encoding::{encode_float, encode_int};
use crate::error::EncodeError;

/// Kind of argument a command carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgumentKind {
    None,
    Int,
    Float,
}

impl ArgumentKind {
    fn name(self) -> &'static str {
        match self {
            Self::None => "no",
            Self::Int => "integer",
            Self::Float => "float",
        }
    }
}

/// A single entry of the command table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandSpec {
    pub name: &'static str,
    pub mnemonic: [u8; 2],
    pub index: u8,
    pub dlc: u8,
    pub argument: ArgumentKind,
}

const fn query(name: &'static str, mnemonic: [u8; 2], index: u8) -> CommandSpec {
    CommandSpec { name, mnemonic, index, dlc: 4, argument: ArgumentKind::None }
}

const fn set_int(name: &'static str, mnemonic: [u8; 2], index: u8) -> CommandSpec {
    CommandSpec { name, mnemonic, index, dlc: 8, argument: ArgumentKind::Int }
}

/// Motor enable; MO=1 enables, MO=0 disables.
pub const MOTOR_ON: CommandSpec = set_int("MO", *b"MO", 0);
/// Begin motion.
pub const BEGIN: CommandSpec = query("BG", *b"BG", 0);
/// Stop motion. Only honoured in position mode.
pub const STOP: CommandSpec = query("ST", *b"ST", 0);
/// Unit mode.
pub const UNIT_MODE: CommandSpec = set_int("UM", *b"UM", 0);
/// Speed used by position commands.
pub const SPEED: CommandSpec = set_int("SP", *b"SP", 0);
/// Absolute position target.
pub const POSITION_ABSOLUTE: CommandSpec = set_int("PA", *b"PA", 0);
/// Relative position target.
pub const POSITION_RELATIVE: CommandSpec = set_int("PR", *b"PR", 0);
/// Torque command, in amperes.
pub const TORQUE: CommandSpec = CommandSpec {
    name: "TC",
    mnemonic: *b"TC",
    index: 0,
    dlc: 8,
    argument: ArgumentKind::Float,
};
/// Main position feedback.
pub const POSITION_FEEDBACK: CommandSpec = query("PX", *b"PX", 0);
/// Active current.
pub const ACTIVE_CURRENT: CommandSpec = query("IQ", *b"IQ", 0);
/// Maximum current.
pub const MAX_CURRENT: CommandSpec = query("MC", *b"MC", 0);
/// Velocity low limit.
pub const VELOCITY_LOW: CommandSpec = set_int("VL[2]", *b"VL", 2);
/// Velocity high limit.
pub const VELOCITY_HIGH: CommandSpec = set_int("VH[2]", *b"VH", 2);
/// Feedback low limit.
pub const FEEDBACK_LOW: CommandSpec = set_int("LL[2]", *b"LL", 2);
/// Feedback high limit.
pub const FEEDBACK_HIGH: CommandSpec = set_int("HL[2]", *b"HL", 2);
/// Serial number query used as the echo self-test.
pub const ECHO: CommandSpec = query("SN[2]", *b"SN", 2);

/// Every command the sequencer issues.
pub const COMMAND_TABLE: &[CommandSpec] = &[
    MOTOR_ON,
    BEGIN,
    STOP,
    UNIT_MODE,
    SPEED,
    POSITION_ABSOLUTE,
    POSITION_RELATIVE,
    TORQUE,
    POSITION_FEEDBACK,
    ACTIVE_CURRENT,
    MAX_CURRENT,
    VELOCITY_LOW,
    VELOCITY_HIGH,
    FEEDBACK_LOW,
    FEEDBACK_HIGH,
    ECHO,
];

impl CommandSpec {
    /// Looks up a command by its mnemonic and index bytes.
    pub fn lookup(mnemonic: [u8; 2], index: u8) -> Option<&'static CommandSpec> {
        COMMAND_TABLE
            .iter()
            .find(|spec| spec.mnemonic == mnemonic && spec.index == index)
    }

    /// Payload with the mnemonic and index filled in and a zero argument.
    pub fn header(&self) -> [u8; 8] {
        [self.mnemonic[0], self.mnemonic[1], self.index, 0, 0, 0, 0, 0]
    }
}

/// Argument value of a command.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Argument {
    None,
    Int(i32),
    Float(f32),
}

impl Argument {
    fn kind(self) -> ArgumentKind {
        match self {
            Self::None => ArgumentKind::None,
            Self::Int(_) => ArgumentKind::Int,
            Self::Float(_) => ArgumentKind::Float,
        }
    }
}

/// A command together with its argument.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PdoCommand {
    pub spec: &'static CommandSpec,
    pub argument: Argument,
}

impl PdoCommand {
    pub fn new(spec: &'static CommandSpec, argument: Argument) -> Self {
        Self { spec, argument }
    }

    /// Command without an argument.
    pub fn bare(spec: &'static CommandSpec) -> Self {
        Self::new(spec, Argument::None)
    }

    pub fn int(spec: &'static CommandSpec, value: i32) -> Self {
        Self::new(spec, Argument::Int(value))
    }

    pub fn float(spec: &'static CommandSpec, value: f32) -> Self {
        Self::new(spec, Argument::Float(value))
    }

    /// Builds the 8-byte payload, checking the argument against the table entry.
    pub fn payload(&self) -> Result<[u8; 8], EncodeError> {
        if self.argument.kind() != self.spec.argument {
            return Err(EncodeError::ArgumentMismatch {
                command: self.spec.name,
                expected: self.spec.argument.name(),
                actual: self.argument.kind().name(),
            });
        }

        let mut data = self.spec.header();
        match self.argument {
            Argument::None => {}
            Argument::Int(value) => encode_int(&mut data, value),
            Argument::Float(value) => encode_float(&mut data, value),
        }
        Ok(data)
    }
}

impl fmt::Display for PdoCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.argument {
            Argument::None => write!(f, "{}", self.spec.name),
            Argument::Int(v) => write!(f, "{}={}", self.spec.name, v),
            Argument::Float(v) => write!(f, "{}={}", self.spec.name, v),
        }
    }
}

/// Controller unit mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitMode {
    /// Motor follows position commands.
    Position,
    /// Motor follows torque commands.
    Torque,
}

impl UnitMode {
    /// Value written with `UM`.
    pub fn code(self) -> i32 {
        match self {
            Self::Position => 5,
            Self::Torque => 1,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            5 => Some(Self::Position),
            1 => Some(Self::Torque),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_matches_firmware_bytes() {
        assert_eq!(PdoCommand::int(&MOTOR_ON, 1).payload().unwrap(), [0x4d, 0x4f, 0, 0, 1, 0, 0, 0]);
        assert_eq!(PdoCommand::int(&MOTOR_ON, 0).payload().unwrap(), [0x4d, 0x4f, 0, 0, 0, 0, 0, 0]);
        assert_eq!(PdoCommand::bare(&BEGIN).payload().unwrap(), [0x42, 0x47, 0, 0, 0, 0, 0, 0]);
        assert_eq!(PdoCommand::bare(&STOP).payload().unwrap(), [0x53, 0x54, 0, 0, 0, 0, 0, 0]);
        assert_eq!(
            PdoCommand::int(&UNIT_MODE, UnitMode::Position.code()).payload().unwrap(),
            [0x55, 0x4d, 0, 0, 5, 0, 0, 0]
        );
        assert_eq!(PdoCommand::bare(&ECHO).payload().unwrap(), [0x53, 0x4e, 0x02, 0, 0, 0, 0, 0]);
        assert_eq!(VELOCITY_LOW.header(), [0x56, 0x4c, 0x02, 0, 0, 0, 0, 0]);
        assert_eq!(VELOCITY_HIGH.header(), [0x56, 0x48, 0x02, 0, 0, 0, 0, 0]);
        assert_eq!(FEEDBACK_LOW.header(), [0x4c, 0x4c, 0x02, 0, 0, 0, 0, 0]);
        assert_eq!(FEEDBACK_HIGH.header(), [0x48, 0x4c, 0x02, 0, 0, 0, 0, 0]);
        assert_eq!(POSITION_FEEDBACK.header(), [0x50, 0x58, 0, 0, 0, 0, 0, 0]);
        assert_eq!(ACTIVE_CURRENT.header(), [0x49, 0x51, 0, 0, 0, 0, 0, 0]);
        assert_eq!(MAX_CURRENT.header(), [0x4d, 0x43, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn queries_use_short_frames() {
        for spec in COMMAND_TABLE {
            let expected = if spec.argument == ArgumentKind::None { 4 } else { 8 };
            assert_eq!(spec.dlc, expected, "{}", spec.name);
        }
    }

    #[test]
    fn argument_kind_is_checked() {
        let err = PdoCommand::float(&SPEED, 1.0).payload().unwrap_err();
        assert!(matches!(err, EncodeError::ArgumentMismatch { command: "SP", .. }));
        assert!(PdoCommand::bare(&TORQUE).payload().is_err());
    }

    #[test]
    fn only_float_commands_set_the_marker() {
        let torque = PdoCommand::float(&TORQUE, -1.5).payload().unwrap();
        assert_eq!(torque[3], 0x80);
        let speed = PdoCommand::int(&SPEED, -1).payload().unwrap();
        assert_eq!(speed[3], 0x00);
    }

    #[test]
    fn lookup_distinguishes_index() {
        assert_eq!(CommandSpec::lookup(*b"SN", 2), Some(&ECHO));
        assert_eq!(CommandSpec::lookup(*b"SN", 0), None);
        assert_eq!(CommandSpec::lookup(*b"PX", 0).map(|s| s.name), Some("PX"));
    }

    #[test]
    fn unit_mode_codes() {
        assert_eq!(UnitMode::Position.code(), 5);
        assert_eq!(UnitMode::Torque.code(), 1);
        assert_eq!(UnitMode::from_code(1), Some(UnitMode::Torque));
        assert_eq!(UnitMode::from_code(3), None);
    }
}
