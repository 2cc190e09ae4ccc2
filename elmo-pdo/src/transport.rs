//! Bus transport: one handle, one socket, one node.
//!
//! The transport knows nothing about commands. It writes frames, reads frames, and
//! filters incoming traffic down to the replies of the node it is bound to.

use std::time::{Duration, Instant};

use tracing::trace;

use crate::error::BusError;
use crate::frame::{make_frame, Frame, NodeId};
use crate::socket::RawCanSocket;

/// NMT-style state change commands, first payload byte.
const NMT_OPERATIONAL: u8 = 0x01;
const NMT_PRE_OPERATIONAL: u8 = 0x81;

/// Frame level I/O on an opened bus.
pub trait FrameIo {
    /// Writes one whole frame.
    fn write_frame(&mut self, frame: &Frame) -> Result<(), BusError>;

    /// Reads the next frame on any identifier.
    ///
    /// `None` blocks until a frame arrives; `Some(t)` fails with [`BusError::Timeout`]
    /// once `t` has elapsed.
    fn read_frame(&mut self, timeout: Option<Duration>) -> Result<Frame, BusError>;

    /// Releases the underlying resource.
    fn close(self) -> Result<(), BusError>
    where
        Self: Sized;
}

/// Handle on a CAN interface talking to one controller node.
///
/// Constructing a handle performs no I/O. [`BusHandle::open`] binds the socket and
/// switches the node operational; [`BusHandle::close`] releases it again.
///
/// A handle is not meant to be shared: it owns exactly one socket and every exchange
/// on it is a blocking write followed by a blocking read.
#[derive(Debug)]
pub struct BusHandle<IO = RawCanSocket> {
    interface: String,
    node_id: Option<NodeId>,
    io: Option<IO>,
    receive_timeout: Option<Duration>,
}

impl<IO> BusHandle<IO> {
    /// Allocates a handle for `interface`. No socket is created yet.
    pub fn new(interface: &str) -> Result<Self, BusError> {
        let mut name = String::new();
        name.try_reserve_exact(interface.len())?;
        name.push_str(interface);

        Ok(Self {
            interface: name,
            node_id: None,
            io: None,
            receive_timeout: None,
        })
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    /// Node id bound by the last successful open.
    pub fn node_id(&self) -> Option<NodeId> {
        self.node_id
    }

    pub fn is_open(&self) -> bool {
        self.io.is_some()
    }

    pub fn receive_timeout(&self) -> Option<Duration> {
        self.receive_timeout
    }

    /// Bounds how long [`BusHandle::receive_frame`] waits for a reply. `None`, the
    /// default, waits forever.
    pub fn set_receive_timeout(&mut self, timeout: Option<Duration>) {
        self.receive_timeout = timeout;
    }
}

impl BusHandle<RawCanSocket> {
    /// Creates and binds the raw socket, then switches the node operational.
    ///
    /// A socket, lookup or bind failure leaves the handle closed. If only the
    /// operational command fails to go out, the socket stays bound.
    pub fn open(&mut self, node_id: NodeId) -> Result<(), BusError> {
        let socket = RawCanSocket::open(&self.interface)?;
        self.attach(socket, node_id)
    }
}

impl<IO: FrameIo> BusHandle<IO> {
    /// Opens the handle on an already created frame I/O, e.g. a simulated bus.
    ///
    /// Sends the operational command like [`BusHandle::open`] does.
    pub fn attach(&mut self, io: IO, node_id: NodeId) -> Result<(), BusError> {
        self.node_id = Some(node_id);
        self.io = Some(io);
        self.set_operational()
    }

    /// Releases the socket. The handle can be opened again afterwards.
    pub fn close(&mut self) -> Result<(), BusError> {
        let io = self.io.take().ok_or(BusError::NotOpen)?;
        io.close()
    }

    /// Direct access to the frame I/O, mainly for inspecting a simulated bus.
    pub fn io(&self) -> Option<&IO> {
        self.io.as_ref()
    }

    pub fn io_mut(&mut self) -> Option<&mut IO> {
        self.io.as_mut()
    }

    fn bound_node(&self) -> Result<NodeId, BusError> {
        match (&self.io, self.node_id) {
            (Some(_), Some(node)) => Ok(node),
            _ => Err(BusError::NotOpen),
        }
    }

    /// Writes one frame.
    pub fn send_frame(&mut self, frame: &Frame) -> Result<(), BusError> {
        let io = self.io.as_mut().ok_or(BusError::NotOpen)?;
        io.write_frame(frame)?;
        trace!(interface = %self.interface, "tx {}", frame);
        Ok(())
    }

    /// Blocks until this node's reply arrives, discarding every other frame.
    pub fn receive_frame(&mut self) -> Result<Frame, BusError> {
        let reply_id = self.bound_node()?.reply_cob_id();
        self.receive_matching(|frame| frame.id() == reply_id)
    }

    /// Reads frames until one satisfies `accept`, discarding the rest.
    ///
    /// Read errors, including short reads, end the wait immediately. With a receive
    /// timeout set, the deadline covers the whole wait.
    pub fn receive_matching<F>(&mut self, mut accept: F) -> Result<Frame, BusError>
    where
        F: FnMut(&Frame) -> bool,
    {
        let deadline = self.receive_timeout.map(|t| Instant::now() + t);
        let io = self.io.as_mut().ok_or(BusError::NotOpen)?;

        loop {
            let remaining = match deadline {
                Some(deadline) => Some(
                    deadline
                        .checked_duration_since(Instant::now())
                        .ok_or(BusError::Timeout)?,
                ),
                None => None,
            };

            let frame = io.read_frame(remaining)?;
            if accept(&frame) {
                trace!(interface = %self.interface, "rx {}", frame);
                return Ok(frame);
            }
            trace!(interface = %self.interface, "discarded {}", frame);
        }
    }

    /// Sends the NMT-style "operational" command (DLC 2, byte 0 = 0x01).
    pub fn set_operational(&mut self) -> Result<(), BusError> {
        self.send_nmt(NMT_OPERATIONAL)
    }

    /// Sends the NMT-style "pre-operational" command (DLC 2, byte 0 = 0x81).
    pub fn set_pre_operational(&mut self) -> Result<(), BusError> {
        self.send_nmt(NMT_PRE_OPERATIONAL)
    }

    fn send_nmt(&mut self, state: u8) -> Result<(), BusError> {
        let node = self.bound_node()?;
        let data = [state, 0, 0, 0, 0, 0, 0, 0];
        let frame = make_frame(node.nmt_cob_id(), 2, &data)?;
        self.send_frame(&frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::ScriptedBus;

    fn node(id: u8) -> NodeId {
        NodeId::new(id).unwrap()
    }

    fn reply(node: NodeId, first: u8) -> Frame {
        make_frame(node.reply_cob_id(), 8, &[first, 0, 0, 0, 0, 0, 0, 0]).unwrap()
    }

    #[test]
    fn construct_does_no_io() {
        let handle: BusHandle<ScriptedBus> = BusHandle::new("vcan0").unwrap();
        assert_eq!(handle.interface(), "vcan0");
        assert!(!handle.is_open());
        assert!(handle.node_id().is_none());
    }

    #[test]
    fn attach_sends_operational_frame() {
        let mut handle = BusHandle::new("vcan0").unwrap();
        handle.attach(ScriptedBus::new(), node(127)).unwrap();

        let sent = handle.io().unwrap().sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].id(), 127);
        assert_eq!(sent[0].dlc(), 2);
        assert_eq!(sent[0].data(), &[0x01, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn pre_operational_frame() {
        let mut handle = BusHandle::new("vcan0").unwrap();
        handle.attach(ScriptedBus::new(), node(5)).unwrap();
        handle.set_pre_operational().unwrap();

        let last = *handle.io().unwrap().sent().last().unwrap();
        assert_eq!(last.id(), 5);
        assert_eq!(last.data()[0], 0x81);
    }

    #[test]
    fn receive_discards_foreign_frames() {
        let me = node(127);
        let other = node(3);
        let mut bus = ScriptedBus::new();
        bus.push_reply(reply(other, 0xAA));
        bus.push_reply(make_frame(0x080, 0, &[0; 8]).unwrap());
        bus.push_reply(reply(me, 0x42));
        bus.push_reply(reply(me, 0x43));

        let mut handle = BusHandle::new("vcan0").unwrap();
        handle.attach(bus, me).unwrap();

        let frame = handle.receive_frame().unwrap();
        assert_eq!(frame.id(), 0x2FF);
        assert_eq!(frame.data()[0], 0x42);
        // The frame after the match stays queued for the next exchange.
        assert_eq!(handle.io().unwrap().pending(), 1);
    }

    #[test]
    fn short_read_ends_the_wait() {
        let me = node(1);
        let mut bus = ScriptedBus::new();
        bus.push_reply(reply(node(2), 0));
        bus.push_short_read(8);
        bus.push_reply(reply(me, 0));

        let mut handle = BusHandle::new("can0").unwrap();
        handle.attach(bus, me).unwrap();

        let err = handle.receive_frame().unwrap_err();
        assert!(matches!(err, BusError::ShortRead { read: 8, .. }));
        assert_eq!(handle.io().unwrap().pending(), 1);
    }

    #[test]
    fn receive_timeout_is_reported() {
        let mut handle = BusHandle::new("can0").unwrap();
        handle.attach(ScriptedBus::new(), node(1)).unwrap();
        handle.set_receive_timeout(Some(Duration::from_millis(5)));

        assert!(matches!(handle.receive_frame(), Err(BusError::Timeout)));
    }

    #[test]
    fn operations_require_open_handle() {
        let mut handle: BusHandle<ScriptedBus> = BusHandle::new("can0").unwrap();
        let frame = make_frame(0x301, 4, &[0; 8]).unwrap();
        assert!(matches!(handle.send_frame(&frame), Err(BusError::NotOpen)));
        assert!(matches!(handle.receive_frame(), Err(BusError::NotOpen)));
        assert!(matches!(handle.close(), Err(BusError::NotOpen)));
    }

    #[test]
    fn close_releases_and_allows_reopen() {
        let mut handle = BusHandle::new("can0").unwrap();
        handle.attach(ScriptedBus::new(), node(1)).unwrap();
        handle.close().unwrap();
        assert!(!handle.is_open());

        handle.attach(ScriptedBus::new(), node(2)).unwrap();
        assert_eq!(handle.node_id(), Some(node(2)));
    }

    #[test]
    fn failed_close_is_reported() {
        let mut bus = ScriptedBus::new();
        bus.fail_close();
        let mut handle = BusHandle::new("can0").unwrap();
        handle.attach(bus, node(1)).unwrap();
        assert!(matches!(handle.close(), Err(BusError::Close(_))));
        assert!(!handle.is_open());
    }
}
