//! In-memory bus for exercising the protocol without hardware.
//!
//! A [`ScriptedBus`] records every written frame and hands out replies from a queue.
//! Replies can also be produced on the fly by a responder closure, which sees each
//! written frame and may queue frames in response.

use std::collections::VecDeque;
use std::io;
use std::time::Duration;

use crate::error::BusError;
use crate::frame::Frame;
use crate::socket::CAN_FRAME_LEN;
use crate::transport::FrameIo;

type Responder = Box<dyn FnMut(&Frame) -> Vec<Frame> + Send>;

/// One scripted read outcome.
#[derive(Debug)]
enum ReadEvent {
    Frame(Frame),
    ShortRead(usize),
    Error(io::ErrorKind),
}

/// Scripted frame I/O.
#[derive(Default)]
pub struct ScriptedBus {
    sent: Vec<Frame>,
    replies: VecDeque<ReadEvent>,
    write_failures: VecDeque<bool>,
    responder: Option<Responder>,
    fail_close: bool,
}

impl std::fmt::Debug for ScriptedBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedBus")
            .field("sent", &self.sent.len())
            .field("pending", &self.replies.len())
            .field("responder", &self.responder.is_some())
            .finish()
    }
}

impl ScriptedBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bus that answers every written frame through `responder`.
    pub fn with_responder<F>(responder: F) -> Self
    where
        F: FnMut(&Frame) -> Vec<Frame> + Send + 'static,
    {
        Self {
            responder: Some(Box::new(responder)),
            ..Self::default()
        }
    }

    /// Queues a frame to be returned by a future read.
    pub fn push_reply(&mut self, frame: Frame) {
        self.replies.push_back(ReadEvent::Frame(frame));
    }

    /// Queues a read that returns only `bytes` bytes.
    pub fn push_short_read(&mut self, bytes: usize) {
        self.replies.push_back(ReadEvent::ShortRead(bytes));
    }

    /// Queues a low-level read failure.
    pub fn push_read_error(&mut self, kind: io::ErrorKind) {
        self.replies.push_back(ReadEvent::Error(kind));
    }

    /// Scripts the outcome of upcoming writes, `true` meaning the write fails.
    /// Writes past the end of the script succeed.
    pub fn script_writes<I: IntoIterator<Item = bool>>(&mut self, failures: I) {
        self.write_failures.extend(failures);
    }

    pub fn fail_close(&mut self) {
        self.fail_close = true;
    }

    /// Every frame written so far, in order.
    pub fn sent(&self) -> &[Frame] {
        &self.sent
    }

    /// Number of scripted reads not consumed yet.
    pub fn pending(&self) -> usize {
        self.replies.len()
    }

    pub fn clear_sent(&mut self) {
        self.sent.clear();
    }
}

impl FrameIo for ScriptedBus {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), BusError> {
        if self.write_failures.pop_front().unwrap_or(false) {
            return Err(BusError::ShortWrite {
                written: 0,
                expected: CAN_FRAME_LEN,
            });
        }
        self.sent.push(*frame);
        if let Some(responder) = self.responder.as_mut() {
            for reply in responder(frame) {
                self.replies.push_back(ReadEvent::Frame(reply));
            }
        }
        Ok(())
    }

    fn read_frame(&mut self, timeout: Option<Duration>) -> Result<Frame, BusError> {
        match self.replies.pop_front() {
            Some(ReadEvent::Frame(frame)) => Ok(frame),
            Some(ReadEvent::ShortRead(read)) => Err(BusError::ShortRead {
                read,
                expected: CAN_FRAME_LEN,
            }),
            Some(ReadEvent::Error(kind)) => Err(BusError::Read(io::Error::from(kind))),
            // A real bus would block here forever; a script cannot.
            None if timeout.is_some() => Err(BusError::Timeout),
            None => Err(BusError::Read(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "scripted bus has no more frames",
            ))),
        }
    }

    fn close(self) -> Result<(), BusError> {
        if self.fail_close {
            return Err(BusError::Close(io::Error::from(io::ErrorKind::BrokenPipe)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::make_frame;

    #[test]
    fn responder_queues_replies_per_write() {
        let mut bus = ScriptedBus::with_responder(|frame| {
            vec![make_frame(frame.id() - 0x80, 8, frame.data()).unwrap()]
        });
        let frame = make_frame(0x301, 4, &[1, 2, 3, 4, 0, 0, 0, 0]).unwrap();
        bus.write_frame(&frame).unwrap();

        let reply = bus.read_frame(None).unwrap();
        assert_eq!(reply.id(), 0x281);
        assert_eq!(bus.sent(), &[frame]);
    }

    #[test]
    fn scripted_write_failure_is_not_recorded() {
        let mut bus = ScriptedBus::new();
        bus.script_writes([true, false]);
        let frame = make_frame(0x301, 4, &[0; 8]).unwrap();
        assert!(bus.write_frame(&frame).is_err());
        assert!(bus.write_frame(&frame).is_ok());
        assert_eq!(bus.sent().len(), 1);
    }

    #[test]
    fn exhausted_script_reports_read_error() {
        let mut bus = ScriptedBus::new();
        bus.push_read_error(io::ErrorKind::ConnectionReset);
        assert!(matches!(bus.read_frame(None), Err(BusError::Read(_))));
        assert!(matches!(bus.read_frame(None), Err(BusError::Read(_))));
    }
}
