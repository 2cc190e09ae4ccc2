//! Shared helpers: a scripted controller that answers like the firmware does.

#![allow(dead_code)]

use std::time::Duration;

use elmo_pdo::{
    decode_float, decode_int, encode_float, encode_int, make_frame, ArgumentKind, BusHandle,
    CommandSpec, CompositePolicy, ControllerConfig, Frame, MotorController, NodeId, ScriptedBus,
    ECHO_REPLY,
};

pub const POSITION: i32 = 4242;
pub const CURRENT: f32 = 0.6;
pub const MAX_CURRENT: f32 = 10.0;

pub fn node(id: u8) -> NodeId {
    NodeId::new(id).unwrap()
}

pub fn fast_config(policy: CompositePolicy) -> ControllerConfig {
    ControllerConfig {
        settle_delay: Duration::from_millis(10),
        policy,
        ..ControllerConfig::default()
    }
}

/// Replies to every command frame addressed to `node` on its reply COB-ID.
pub fn firmware(node: NodeId) -> impl FnMut(&Frame) -> Vec<Frame> + Send + 'static {
    move |frame| {
        if frame.id() != node.tx_cob_id() {
            return Vec::new();
        }
        let mut data = *frame.data();
        match (&data[0..2], data[2]) {
            (b"SN", 2) => data = ECHO_REPLY,
            (b"PX", _) => encode_int(&mut data, POSITION),
            (b"IQ", _) => encode_float(&mut data, CURRENT),
            (b"MC", _) => encode_float(&mut data, MAX_CURRENT),
            _ => {}
        }
        vec![make_frame(node.reply_cob_id(), 8, &data).unwrap()]
    }
}

pub fn controller_with(bus: ScriptedBus, id: NodeId, policy: CompositePolicy) -> MotorController<ScriptedBus> {
    let mut handle = BusHandle::new("vcan0").unwrap();
    handle.attach(bus, id).unwrap();
    MotorController::new(handle, fast_config(policy)).unwrap()
}

pub fn simulated(id: u8) -> MotorController<ScriptedBus> {
    let id = node(id);
    controller_with(ScriptedBus::with_responder(firmware(id)), id, CompositePolicy::BestEffort)
}

/// Commands sent on the node's command COB-ID, rendered like `MO=1` or `BG`.
pub fn sent_commands(motor: &MotorController<ScriptedBus>) -> Vec<String> {
    let tx_id = motor.bus().node_id().unwrap().tx_cob_id();
    motor
        .bus()
        .io()
        .unwrap()
        .sent()
        .iter()
        .filter(|frame| frame.id() == tx_id)
        .map(|frame| {
            let data = frame.data();
            let spec = CommandSpec::lookup([data[0], data[1]], data[2]).expect("unknown command");
            match spec.argument {
                ArgumentKind::None => spec.name.to_string(),
                ArgumentKind::Int => format!("{}={}", spec.name, decode_int(data)),
                ArgumentKind::Float => format!("{}={}", spec.name, decode_float(data)),
            }
        })
        .collect()
}
