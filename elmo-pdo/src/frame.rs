//! Raw CAN data frames and node addressing.

use std::fmt;

use serde::{Deserialize, Serialize};
use socketcan::{CanFrame, EmbeddedFrame, StandardId};

use crate::error::{BusError, EncodeError};

/// Largest 11-bit arbitration id.
pub const MAX_STANDARD_ID: u16 = 0x7FF;

/// Function code of the PDO the controller listens on (RPDO2 from its point of view).
const TX_FUNCTION: u16 = 0x6;
/// Function code the controller answers on.
const REPLY_FUNCTION: u16 = 0x5;

/// CANopen node identifier, 1..=127.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct NodeId(u8);

impl NodeId {
    pub fn new(id: u8) -> Result<Self, BusError> {
        if (1..=127).contains(&id) {
            Ok(Self(id))
        } else {
            Err(BusError::InvalidNodeId(id))
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// COB-ID our commands are sent on: `id | (0x6 << 7)`.
    pub fn tx_cob_id(self) -> u16 {
        self.0 as u16 | (TX_FUNCTION << 7)
    }

    /// COB-ID the controller replies on: `id | (0x5 << 7)`.
    pub fn reply_cob_id(self) -> u16 {
        self.0 as u16 | (REPLY_FUNCTION << 7)
    }

    /// NMT-style state frames are addressed to the bare node id.
    pub fn nmt_cob_id(self) -> u16 {
        self.0 as u16
    }
}

impl TryFrom<u8> for NodeId {
    type Error = BusError;

    fn try_from(id: u8) -> Result<Self, Self::Error> {
        Self::new(id)
    }
}

impl From<NodeId> for u8 {
    fn from(id: NodeId) -> Self {
        id.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One classic CAN data frame with a standard identifier.
///
/// The payload is always 8 bytes; bytes past `dlc` are carried along but are not
/// meaningful on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    id: u16,
    dlc: u8,
    data: [u8; 8],
}

impl Frame {
    pub fn new(id: u16, dlc: u8, data: [u8; 8]) -> Result<Self, EncodeError> {
        if id > MAX_STANDARD_ID {
            return Err(EncodeError::InvalidId(id as u32));
        }
        if dlc > 8 {
            return Err(EncodeError::InvalidLength(dlc));
        }
        Ok(Self { id, dlc, data })
    }

    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn dlc(&self) -> u8 {
        self.dlc
    }

    /// All 8 payload bytes, including the ones past the DLC.
    pub fn data(&self) -> &[u8; 8] {
        &self.data
    }

    /// Only the bytes covered by the DLC.
    pub fn payload(&self) -> &[u8] {
        &self.data[..self.dlc as usize]
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03X} [{}] {:02X?}", self.id, self.dlc, self.payload())
    }
}

/// Builds a frame from a full 8-byte buffer.
///
/// All 8 bytes of `data` are copied whatever `len` says; `len` only becomes the DLC.
pub fn make_frame(id: u16, len: u8, data: &[u8; 8]) -> Result<Frame, EncodeError> {
    Frame::new(id, len, *data)
}

impl TryFrom<&Frame> for CanFrame {
    type Error = EncodeError;

    fn try_from(frame: &Frame) -> Result<Self, EncodeError> {
        let id = StandardId::new(frame.id).ok_or(EncodeError::InvalidId(frame.id as u32))?;
        CanFrame::new(id, frame.payload()).ok_or(EncodeError::InvalidLength(frame.dlc))
    }
}

impl TryFrom<&CanFrame> for Frame {
    type Error = EncodeError;

    fn try_from(frame: &CanFrame) -> Result<Self, Self::Error> {
        let id = match frame.id() {
            socketcan::Id::Standard(std_id) => std_id.as_raw(),
            socketcan::Id::Extended(ext_id) => return Err(EncodeError::InvalidId(ext_id.as_raw())),
        };

        let bytes = frame.data();
        let mut data = [0u8; 8];
        let len = bytes.len().min(8);
        data[..len].copy_from_slice(&bytes[..len]);

        Frame::new(id, len as u8, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_id_range_is_enforced() {
        assert!(NodeId::new(0).is_err());
        assert!(NodeId::new(128).is_err());
        assert_eq!(NodeId::new(1).unwrap().get(), 1);
        assert_eq!(NodeId::new(127).unwrap().get(), 127);
    }

    #[test]
    fn cob_ids_follow_function_codes() {
        let node = NodeId::new(127).unwrap();
        assert_eq!(node.tx_cob_id(), 0x37F);
        assert_eq!(node.reply_cob_id(), 0x2FF);

        let node = NodeId::new(1).unwrap();
        assert_eq!(node.tx_cob_id(), 0x301);
        assert_eq!(node.reply_cob_id(), 0x281);
        assert_eq!(node.nmt_cob_id(), 0x001);
    }

    #[test]
    fn make_frame_copies_all_bytes_past_the_dlc() {
        let data = [0x50, 0x58, 0x00, 0x00, 0xAA, 0xBB, 0xCC, 0xDD];
        let frame = make_frame(0x37F, 4, &data).unwrap();

        assert_eq!(frame.dlc(), 4);
        assert_eq!(frame.data(), &data);
        assert_eq!(frame.payload(), &data[..4]);
    }

    #[test]
    fn make_frame_rejects_oversized_dlc_and_id() {
        assert_eq!(make_frame(0x100, 9, &[0; 8]), Err(EncodeError::InvalidLength(9)));
        assert_eq!(make_frame(0x800, 8, &[0; 8]), Err(EncodeError::InvalidId(0x800)));
    }

    #[test]
    fn socketcan_conversion_keeps_id_and_payload() {
        let frame = make_frame(0x2FF, 8, &[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
        let can_frame = CanFrame::try_from(&frame).unwrap();
        let back = Frame::try_from(&can_frame).unwrap();
        assert_eq!(back, frame);
    }

    #[test]
    fn node_id_deserializes_with_range_check() {
        #[derive(Deserialize)]
        struct Wrapper {
            node: NodeId,
        }
        let ok: Wrapper = toml::from_str("node = 127").unwrap();
        assert_eq!(ok.node.get(), 127);
        assert!(toml::from_str::<Wrapper>("node = 200").is_err());
    }
}
