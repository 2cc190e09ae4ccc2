//! Answers PDO commands the way the controller firmware does.

use std::time::Duration;

use elmo_pdo::command::{self, CommandSpec};
use elmo_pdo::{
    decode_float, decode_int, encode_float, encode_int, make_frame, Argument, ArgumentKind, Frame,
    NodeId, UnitMode, ECHO_REPLY,
};
use rand::Rng;
use tracing::{debug, info, warn};

use crate::registers::RegisterTable;

/// Motion state of the simulated drive.
#[derive(Debug, Clone, Copy)]
struct Motion {
    enabled: bool,
    mode: UnitMode,
    position: f64,
    /// Target latched by PA/PR, started by BG.
    pending_target: Option<i32>,
    target: Option<i32>,
    torque: f32,
}

pub struct PdoServer {
    node: NodeId,
    registers: RegisterTable,
    motion: Motion,
    current_noise: f32,
}

impl PdoServer {
    pub fn new(node: NodeId, registers: RegisterTable, position: i32) -> Self {
        Self {
            node,
            registers,
            motion: Motion {
                enabled: false,
                mode: UnitMode::Position,
                position: position as f64,
                pending_target: None,
                target: None,
                torque: 0.0,
            },
            current_noise: 0.01,
        }
    }

    /// Turns off the random noise on IQ readings.
    pub fn without_noise(mut self) -> Self {
        self.current_noise = 0.0;
        self
    }

    pub fn position(&self) -> i32 {
        self.motion.position.round() as i32
    }

    /// Handle an incoming frame.
    /// Returns the reply if the frame was a command for this node.
    pub fn handle_frame(&mut self, frame: &Frame) -> Option<Frame> {
        if frame.id() != self.node.tx_cob_id() {
            return None;
        }

        let request = *frame.data();
        let Some(spec) = CommandSpec::lookup([request[0], request[1]], request[2]) else {
            warn!(
                "unknown command {:?}[{}]",
                String::from_utf8_lossy(&request[..2]),
                request[2]
            );
            return None;
        };

        let argument = match spec.argument {
            ArgumentKind::None => Argument::None,
            ArgumentKind::Int => Argument::Int(decode_int(&request)),
            ArgumentKind::Float => Argument::Float(decode_float(&request)),
        };
        debug!(command = spec.name, ?argument, "request");

        let reply = self.execute(spec, argument, request);
        make_frame(self.node.reply_cob_id(), 8, &reply).ok()
    }

    fn execute(&mut self, spec: &CommandSpec, argument: Argument, request: [u8; 8]) -> [u8; 8] {
        let mut reply = request;

        match (*spec, argument) {
            (command::ECHO, _) => return ECHO_REPLY,
            (command::POSITION_FEEDBACK, _) => encode_int(&mut reply, self.position()),
            (command::ACTIVE_CURRENT, _) => encode_float(&mut reply, self.active_current()),
            (command::MAX_CURRENT, _) => {
                let max = self.registers.get_float(spec).unwrap_or_default();
                encode_float(&mut reply, max);
            }
            (command::MOTOR_ON, Argument::Int(on)) => {
                self.motion.enabled = on != 0;
                if !self.motion.enabled {
                    self.motion.target = None;
                }
                info!(enabled = self.motion.enabled, "motor enable");
                self.registers.set(spec, argument);
            }
            (command::UNIT_MODE, Argument::Int(code)) => match UnitMode::from_code(code) {
                Some(_) if self.motion.enabled => {
                    warn!("unit mode change ignored while the motor is enabled");
                }
                Some(mode) => {
                    self.motion.mode = mode;
                    self.registers.set(spec, argument);
                    info!(?mode, "unit mode");
                }
                None => warn!(code, "unsupported unit mode"),
            },
            (command::POSITION_ABSOLUTE, Argument::Int(target)) => {
                self.motion.pending_target = Some(target);
            }
            (command::POSITION_RELATIVE, Argument::Int(offset)) => {
                self.motion.pending_target = Some(self.position().saturating_add(offset));
            }
            (command::BEGIN, _) => {
                if self.motion.enabled && self.motion.mode == UnitMode::Position {
                    self.motion.target = self.motion.pending_target;
                    info!(target = ?self.motion.target, "begin motion");
                }
            }
            (command::STOP, _) => {
                self.motion.target = None;
                info!("stop");
            }
            (command::TORQUE, Argument::Float(torque)) => self.motion.torque = torque,
            // SP and the limit registers are just stored.
            _ => self.registers.set(spec, argument),
        }

        reply
    }

    fn active_current(&self) -> f32 {
        let base = if self.motion.enabled && self.motion.mode == UnitMode::Torque {
            self.motion.torque
        } else {
            0.0
        };
        if self.current_noise > 0.0 {
            let mut rng = rand::rng();
            base + rng.random_range(-self.current_noise..self.current_noise)
        } else {
            base
        }
    }

    /// Advances the simulated motion by `dt`.
    pub fn tick(&mut self, dt: Duration) {
        if !self.motion.enabled {
            return;
        }
        let Some(target) = self.motion.target else {
            return;
        };

        let speed = self.registers.get_int(&command::SPEED).unwrap_or(0).unsigned_abs() as f64;
        let step = speed * dt.as_secs_f64();
        let distance = target as f64 - self.motion.position;

        if distance.abs() <= step {
            self.motion.position = target as f64;
            self.motion.target = None;
            info!(position = target, "target reached");
        } else {
            self.motion.position += step.copysign(distance);
        }
    }
}
