mod common;

use std::time::Duration;

use common::*;
use elmo_pdo::{
    check_echo_reply, make_frame, BusHandle, CompositePolicy, EchoError, MotorController,
    ScriptedBus, ECHO_REPLY,
};

/// Bus that answers the echo request with `reply` bytes and `dlc`.
fn echo_bus(id: u8, dlc: u8, reply: [u8; 8]) -> MotorController<ScriptedBus> {
    let id = node(id);
    let bus = ScriptedBus::with_responder(move |frame| {
        if frame.id() == id.tx_cob_id() {
            vec![make_frame(id.reply_cob_id(), dlc, &reply).unwrap()]
        } else {
            Vec::new()
        }
    });
    controller_with(bus, id, CompositePolicy::BestEffort)
}

#[test]
fn open_then_echo_succeeds_on_exact_pattern() {
    let mut motor = simulated(127);
    motor.send_echo_message().unwrap();

    let sent = motor.bus().io().unwrap().sent();
    // Operational frame first, then SN[2] on 0x37F with DLC 4.
    assert_eq!(sent[0].id(), 127);
    assert_eq!(sent[0].dlc(), 2);
    assert_eq!(sent[0].data()[0], 0x01);
    assert_eq!(sent[1].id(), 0x37F);
    assert_eq!(sent[1].dlc(), 4);
    assert_eq!(&sent[1].data()[..3], &[0x53, 0x4e, 0x02]);
}

#[test]
fn echo_with_short_dlc_fails_on_length() {
    let mut motor = echo_bus(127, 7, ECHO_REPLY);
    assert!(matches!(motor.send_echo_message(), Err(EchoError::Length(7))));
}

#[test]
fn echo_with_wrong_byte_names_the_byte() {
    let mut reply = ECHO_REPLY;
    reply[4] = 0x2b;
    let mut motor = echo_bus(127, 8, reply);

    match motor.send_echo_message() {
        Err(EchoError::Byte { index, expected, actual }) => {
            assert_eq!(index, 4);
            assert_eq!(expected, 0x2a);
            assert_eq!(actual, 0x2b);
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn every_byte_is_checked() {
    for index in 0..8 {
        let mut reply = ECHO_REPLY;
        reply[index] ^= 0xFF;
        let mut motor = echo_bus(127, 8, reply);
        assert!(
            matches!(motor.send_echo_message(), Err(EchoError::Byte { index: i, .. }) if i == index),
            "byte {} not checked",
            index
        );
    }
}

#[test]
fn wrong_cob_id_is_its_own_failure() {
    let frame = make_frame(0x2FE, 8, &ECHO_REPLY).unwrap();
    assert!(matches!(
        check_echo_reply(&frame, 0x2FF),
        Err(EchoError::CobId { expected: 0x2FF, actual: 0x2FE })
    ));
}

#[test]
fn echo_from_another_node_is_never_accepted() {
    let me = node(127);
    let other = node(126);
    let bus = ScriptedBus::with_responder(move |frame| {
        if frame.id() == me.tx_cob_id() {
            vec![make_frame(other.reply_cob_id(), 8, &ECHO_REPLY).unwrap()]
        } else {
            Vec::new()
        }
    });
    let mut handle = BusHandle::new("vcan0").unwrap();
    handle.attach(bus, me).unwrap();
    let mut config = fast_config(CompositePolicy::BestEffort);
    config.receive_timeout = Some(Duration::from_millis(20));
    let mut motor = MotorController::new(handle, config).unwrap();

    assert!(matches!(
        motor.send_echo_message(),
        Err(EchoError::Receive(elmo_pdo::BusError::Timeout))
    ));
}

#[test]
fn send_failure_is_distinct_from_receive_failure() {
    let id = node(127);
    let mut bus = ScriptedBus::new();
    bus.script_writes([false, true]);
    let mut motor = controller_with(bus, id, CompositePolicy::BestEffort);
    assert!(matches!(motor.send_echo_message(), Err(EchoError::Send(_))));
}
