//! Motor control operations built from PDO command exchanges.
//!
//! Every command the controller accepts produces a reply frame. Set-style commands go
//! through send-and-discard so that reply never lingers in the socket and gets mistaken
//! for the answer to a later query.

use tracing::debug;

use crate::command::{self, PdoCommand, UnitMode};
use crate::config::{CompositePolicy, ControllerConfig};
use crate::encoding::{decode_float, decode_int};
use crate::error::{BusError, ControllerError, EchoError, SequenceError};
use crate::frame::{make_frame, Frame};
use crate::sequence::Sequence;
use crate::socket::RawCanSocket;
use crate::transport::{BusHandle, FrameIo};

/// Reply expected for the echo self-test (`SN[2]`).
pub const ECHO_REPLY: [u8; 8] = [0x53, 0x4e, 0x02, 0x00, 0x2a, 0x01, 0x03, 0x00];

/// Command sequencer for one controller node.
#[derive(Debug)]
pub struct MotorController<IO = RawCanSocket> {
    bus: BusHandle<IO>,
    config: ControllerConfig,
}

impl<IO: FrameIo> MotorController<IO> {
    /// Wraps an open bus handle.
    pub fn new(mut bus: BusHandle<IO>, config: ControllerConfig) -> Result<Self, ControllerError> {
        config.validate()?;
        if !bus.is_open() {
            return Err(BusError::NotOpen.into());
        }
        bus.set_receive_timeout(config.receive_timeout);
        Ok(Self { bus, config })
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn bus(&self) -> &BusHandle<IO> {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut BusHandle<IO> {
        &mut self.bus
    }

    /// Gives the bus handle back, e.g. to close it.
    pub fn into_bus(self) -> BusHandle<IO> {
        self.bus
    }

    fn policy(&self) -> CompositePolicy {
        self.config.policy
    }

    fn send_command(&mut self, command: &PdoCommand) -> Result<(), BusError> {
        let node = self.bus.node_id().ok_or(BusError::NotOpen)?;
        let data = command.payload()?;
        let frame = make_frame(node.tx_cob_id(), command.spec.dlc, &data)?;
        debug!(node = node.get(), "send {}", command);
        self.bus.send_frame(&frame)
    }

    /// Sends a command and drains exactly one reply without looking at it.
    ///
    /// Under [`CompositePolicy::BestEffort`] the reply is always drained, even after a
    /// failed send, and only the send status is returned. Under
    /// [`CompositePolicy::Strict`] a failed send returns straight away and a failed
    /// drain read is reported.
    pub fn send_and_discard(&mut self, command: &PdoCommand) -> Result<(), BusError> {
        let sent = self.send_command(command);
        match self.policy() {
            CompositePolicy::BestEffort => {
                if let Err(error) = self.bus.receive_frame() {
                    debug!(%error, "drained reply for {} ignored", command);
                }
                sent
            }
            CompositePolicy::Strict => {
                sent?;
                self.bus.receive_frame().map(|_| ())
            }
        }
    }

    /// Sends a command and returns its reply frame.
    pub fn send_and_read(&mut self, command: &PdoCommand) -> Result<Frame, BusError> {
        self.send_command(command)?;
        self.bus.receive_frame()
    }

    fn settle(&self) {
        debug!(delay = ?self.config.settle_delay, "settling after motor enable toggle");
        spin_sleep::sleep(self.config.settle_delay);
    }

    /// Start-up self-test: `SN[2]` must come back as [`ECHO_REPLY`], byte for byte.
    pub fn send_echo_message(&mut self) -> Result<(), EchoError> {
        let node = self.bus.node_id().ok_or(EchoError::Send(BusError::NotOpen))?;
        self.send_command(&PdoCommand::bare(&command::ECHO))
            .map_err(EchoError::Send)?;
        let reply = self.bus.receive_frame().map_err(EchoError::Receive)?;
        check_echo_reply(&reply, node.reply_cob_id())
    }

    /// MO=1, then the settle delay.
    pub fn start_motor(&mut self) -> Result<(), BusError> {
        let result = self.send_and_discard(&PdoCommand::int(&command::MOTOR_ON, 1));
        self.settle();
        result
    }

    /// MO=0, then the settle delay.
    pub fn stop_motor(&mut self) -> Result<(), BusError> {
        let result = self.send_and_discard(&PdoCommand::int(&command::MOTOR_ON, 0));
        self.settle();
        result
    }

    /// BG. The target must have been set beforehand.
    pub fn begin_motion(&mut self) -> Result<(), BusError> {
        self.send_and_discard(&PdoCommand::bare(&command::BEGIN))
    }

    /// Stops the motor, changes the unit mode.
    ///
    /// Unlike the bare firmware exchange, a failing `stop_motor` is reported as well as
    /// a failing `UM`.
    pub fn set_unit_mode(&mut self, mode: UnitMode) -> Result<(), SequenceError> {
        let mut seq = Sequence::new("set_unit_mode", self.policy());
        seq.step("stop_motor", || self.stop_motor());
        seq.step("unit_mode", || {
            self.send_and_discard(&PdoCommand::int(&command::UNIT_MODE, mode.code()))
        });
        seq.finish()
    }

    /// ST, after forcing position mode; ST is ignored in any other mode.
    ///
    /// The error lists every failing step, including `stop_motor` and the unit mode
    /// change, not just the `ST` exchange.
    pub fn stop(&mut self) -> Result<(), SequenceError> {
        let mut seq = Sequence::new("stop", self.policy());
        seq.step("stop_motor", || self.stop_motor());
        seq.nested("set_unit_mode", || self.set_unit_mode(UnitMode::Position));
        seq.step("stop", || self.send_and_discard(&PdoCommand::bare(&command::STOP)));
        seq.finish()
    }

    /// Speed used by subsequent position commands.
    pub fn set_speed(&mut self, speed: i32) -> Result<(), BusError> {
        self.send_and_discard(&PdoCommand::int(&command::SPEED, speed))
    }

    /// PA. Only effective in position mode.
    pub fn set_absolute_position(&mut self, position: i32) -> Result<(), BusError> {
        self.send_and_discard(&PdoCommand::int(&command::POSITION_ABSOLUTE, position))
    }

    /// PR. Only effective in position mode.
    pub fn set_relative_position(&mut self, offset: i32) -> Result<(), BusError> {
        self.send_and_discard(&PdoCommand::int(&command::POSITION_RELATIVE, offset))
    }

    /// TC, in amperes. Only effective in torque mode.
    pub fn set_torque(&mut self, torque: f32) -> Result<(), BusError> {
        self.send_and_discard(&PdoCommand::float(&command::TORQUE, torque))
    }

    /// Drives to an absolute position:
    /// stop motor, position mode, start motor, PA, BG.
    pub fn set_position(&mut self, position: i32) -> Result<(), SequenceError> {
        let mut seq = Sequence::new("set_position", self.policy());
        seq.step("stop_motor", || self.stop_motor());
        seq.nested("set_unit_mode", || self.set_unit_mode(UnitMode::Position));
        seq.step("start_motor", || self.start_motor());
        seq.step("set_absolute_position", || self.set_absolute_position(position));
        seq.step("begin_motion", || self.begin_motion());
        seq.finish()
    }

    /// Drives with a constant torque:
    /// stop motor, torque mode, start motor, TC.
    pub fn set_force(&mut self, force: f32) -> Result<(), SequenceError> {
        let mut seq = Sequence::new("set_force", self.policy());
        seq.step("stop_motor", || self.stop_motor());
        seq.nested("set_unit_mode", || self.set_unit_mode(UnitMode::Torque));
        seq.step("start_motor", || self.start_motor());
        seq.step("set_torque", || self.set_torque(force));
        seq.finish()
    }

    /// Sets the velocity and feedback limits, in that order, in position mode.
    ///
    /// Under the default best-effort policy this always succeeds, whatever the
    /// individual commands returned. Strict mode reports the first failure.
    pub fn set_limits(
        &mut self,
        vmin: i32,
        vmax: i32,
        fmin: i32,
        fmax: i32,
    ) -> Result<(), SequenceError> {
        let mut seq = Sequence::new("set_limits", self.policy());
        seq.step("stop_motor", || self.stop_motor());
        seq.nested("set_unit_mode", || self.set_unit_mode(UnitMode::Position));
        for (name, spec, value) in [
            ("velocity_low", &command::VELOCITY_LOW, vmin),
            ("velocity_high", &command::VELOCITY_HIGH, vmax),
            ("feedback_low", &command::FEEDBACK_LOW, fmin),
            ("feedback_high", &command::FEEDBACK_HIGH, fmax),
        ] {
            seq.step(name, || self.send_and_discard(&PdoCommand::int(spec, value)));
        }

        match self.policy() {
            CompositePolicy::BestEffort => {
                if let Err(masked) = seq.finish() {
                    debug!(error = %masked, "set_limits failures masked");
                }
                Ok(())
            }
            CompositePolicy::Strict => seq.finish(),
        }
    }

    /// PX, the main position feedback.
    pub fn get_position(&mut self) -> Result<i32, BusError> {
        let reply = self.send_and_read(&PdoCommand::bare(&command::POSITION_FEEDBACK))?;
        Ok(decode_int(reply.data()))
    }

    /// IQ, the active current in amperes.
    pub fn get_force(&mut self) -> Result<f32, BusError> {
        let reply = self.send_and_read(&PdoCommand::bare(&command::ACTIVE_CURRENT))?;
        Ok(decode_float(reply.data()))
    }

    /// MC, the maximum current in amperes.
    pub fn get_max_current(&mut self) -> Result<f32, BusError> {
        let reply = self.send_and_read(&PdoCommand::bare(&command::MAX_CURRENT))?;
        Ok(decode_float(reply.data()))
    }
}

/// Checks an echo reply: COB-ID, then DLC, then every payload byte.
pub fn check_echo_reply(reply: &Frame, expected_cob_id: u16) -> Result<(), EchoError> {
    if reply.id() != expected_cob_id {
        return Err(EchoError::CobId {
            expected: expected_cob_id,
            actual: reply.id(),
        });
    }
    if reply.dlc() != 8 {
        return Err(EchoError::Length(reply.dlc()));
    }
    if let Some((index, (&actual, &expected))) = reply
        .data()
        .iter()
        .zip(ECHO_REPLY.iter())
        .enumerate()
        .find(|(_, (actual, expected))| actual != expected)
    {
        return Err(EchoError::Byte {
            index,
            expected,
            actual,
        });
    }
    Ok(())
}
