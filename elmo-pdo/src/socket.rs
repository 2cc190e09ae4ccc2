//! Linux raw CAN socket.
//!
//! Socket creation, interface lookup and bind are done as separate steps so each can
//! fail with its own error. Frames are written and read as whole `struct can_frame`
//! images; anything shorter is reported instead of retried.

use std::io;
use std::mem;
use std::os::fd::{AsFd, AsRawFd, FromRawFd, IntoRawFd, OwnedFd};
use std::time::{Duration, Instant};

use nix::net::if_::if_nametoindex;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use tracing::trace;

use crate::error::BusError;
use crate::frame::Frame;
use crate::transport::FrameIo;

/// Size of `struct can_frame`: id (4), dlc (1), padding (3), data (8).
pub const CAN_FRAME_LEN: usize = mem::size_of::<libc::can_frame>();

/// Raw `CAN_RAW` socket bound to one interface.
#[derive(Debug)]
pub struct RawCanSocket {
    fd: OwnedFd,
    ifindex: u32,
}

impl RawCanSocket {
    pub fn open(interface: &str) -> Result<Self, BusError> {
        let raw = unsafe { libc::socket(libc::PF_CAN, libc::SOCK_RAW, libc::CAN_RAW) };
        if raw < 0 {
            return Err(BusError::Socket(io::Error::last_os_error()));
        }
        // Owned from here on so every early return closes it.
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };

        let ifindex = if_nametoindex(interface).map_err(|e| BusError::InterfaceLookup {
            interface: interface.to_string(),
            source: io::Error::from(e),
        })?;

        let mut addr: libc::sockaddr_can = unsafe { mem::zeroed() };
        addr.can_family = libc::AF_CAN as libc::sa_family_t;
        addr.can_ifindex = ifindex as libc::c_int;

        let ret = unsafe {
            libc::bind(
                fd.as_raw_fd(),
                &addr as *const libc::sockaddr_can as *const libc::sockaddr,
                mem::size_of::<libc::sockaddr_can>() as libc::socklen_t,
            )
        };
        if ret < 0 {
            return Err(BusError::Bind {
                interface: interface.to_string(),
                source: io::Error::last_os_error(),
            });
        }

        Ok(Self { fd, ifindex })
    }

    pub fn ifindex(&self) -> u32 {
        self.ifindex
    }

    /// Waits until the socket is readable or `timeout` passes.
    fn wait_readable(&self, timeout: Duration) -> Result<(), BusError> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            // PollTimeout only takes u16 milliseconds; longer waits go round again.
            let ms = remaining.as_millis().min(u16::MAX as u128) as u16;
            let mut fds = [PollFd::new(self.fd.as_fd(), PollFlags::POLLIN)];
            match poll(&mut fds, PollTimeout::from(ms)) {
                Ok(0) if Instant::now() >= deadline => return Err(BusError::Timeout),
                Ok(0) => continue,
                Ok(_) => return Ok(()),
                Err(nix::errno::Errno::EINTR) => continue,
                Err(e) => return Err(BusError::Read(io::Error::from(e))),
            }
        }
    }
}

/// Serializes a frame into the kernel `struct can_frame` layout.
fn to_raw(frame: &Frame) -> [u8; CAN_FRAME_LEN] {
    let mut buf = [0u8; CAN_FRAME_LEN];
    buf[..4].copy_from_slice(&(frame.id() as u32).to_ne_bytes());
    buf[4] = frame.dlc();
    buf[8..16].copy_from_slice(frame.data());
    buf
}

/// Parses a kernel `struct can_frame`.
///
/// Extended, remote and error frames carry flag bits above the 11-bit id. None of them
/// can be a controller reply, so they come back as `None` for the caller to skip.
fn from_raw(buf: &[u8; CAN_FRAME_LEN]) -> Option<Frame> {
    let can_id = u32::from_ne_bytes([buf[0], buf[1], buf[2], buf[3]]);
    if can_id > libc::CAN_SFF_MASK {
        return None;
    }
    let mut data = [0u8; 8];
    data.copy_from_slice(&buf[8..16]);
    Frame::new(can_id as u16, buf[4].min(8), data).ok()
}

impl FrameIo for RawCanSocket {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), BusError> {
        let buf = to_raw(frame);
        let written = unsafe {
            libc::write(
                self.fd.as_raw_fd(),
                buf.as_ptr() as *const libc::c_void,
                CAN_FRAME_LEN,
            )
        };
        if written < 0 {
            return Err(BusError::Write(io::Error::last_os_error()));
        }
        if (written as usize) < CAN_FRAME_LEN {
            return Err(BusError::ShortWrite {
                written: written as usize,
                expected: CAN_FRAME_LEN,
            });
        }
        Ok(())
    }

    fn read_frame(&mut self, timeout: Option<Duration>) -> Result<Frame, BusError> {
        let deadline = timeout.map(|t| Instant::now() + t);

        loop {
            if let Some(deadline) = deadline {
                self.wait_readable(deadline.saturating_duration_since(Instant::now()))?;
            }

            let mut buf = [0u8; CAN_FRAME_LEN];
            let read = unsafe {
                libc::read(
                    self.fd.as_raw_fd(),
                    buf.as_mut_ptr() as *mut libc::c_void,
                    CAN_FRAME_LEN,
                )
            };
            if read < 0 {
                return Err(BusError::Read(io::Error::last_os_error()));
            }
            if (read as usize) < CAN_FRAME_LEN {
                return Err(BusError::ShortRead {
                    read: read as usize,
                    expected: CAN_FRAME_LEN,
                });
            }

            match from_raw(&buf) {
                Some(frame) => return Ok(frame),
                None => trace!(
                    can_id = u32::from_ne_bytes([buf[0], buf[1], buf[2], buf[3]]),
                    "skipped non-standard frame"
                ),
            }
        }
    }

    fn close(self) -> Result<(), BusError> {
        let raw = self.fd.into_raw_fd();
        if unsafe { libc::close(raw) } < 0 {
            return Err(BusError::Close(io::Error::last_os_error()));
        }
        Ok(())
    }
}
