//! Packing of 32-bit command arguments into bytes 4..8 of a PDO payload.
//!
//! Arguments are little-endian: byte 4 is the least significant byte, byte 7 the most
//! significant. Floats travel as their IEEE-754 bit pattern and additionally set bit 7 of
//! byte 3 so the firmware interprets the argument as a float.

/// Offset of the argument inside the payload.
pub const ARGUMENT_OFFSET: usize = 4;
/// Byte holding the float marker.
pub const FLOAT_MARKER_BYTE: usize = 3;
/// Float marker bit in [`FLOAT_MARKER_BYTE`].
pub const FLOAT_MARKER: u8 = 1 << 7;

/// Writes `value` into bytes 4..8. Byte 3 is left untouched.
pub fn encode_int(payload: &mut [u8; 8], value: i32) {
    payload[ARGUMENT_OFFSET..].copy_from_slice(&value.to_le_bytes());
}

/// Writes the bit pattern of `value` into bytes 4..8 and sets the float marker.
pub fn encode_float(payload: &mut [u8; 8], value: f32) {
    payload[ARGUMENT_OFFSET..].copy_from_slice(&value.to_bits().to_le_bytes());
    payload[FLOAT_MARKER_BYTE] |= FLOAT_MARKER;
}

/// Reads bytes 4..8 as a signed integer; payload[7] is the most significant byte.
pub fn decode_int(payload: &[u8; 8]) -> i32 {
    i32::from_le_bytes(argument_bytes(payload))
}

/// Reads bytes 4..8 as an IEEE-754 bit pattern. The float marker is not required.
pub fn decode_float(payload: &[u8; 8]) -> f32 {
    f32::from_bits(u32::from_le_bytes(argument_bytes(payload)))
}

/// Whether the float marker bit is set.
pub fn has_float_marker(payload: &[u8; 8]) -> bool {
    payload[FLOAT_MARKER_BYTE] & FLOAT_MARKER != 0
}

fn argument_bytes(payload: &[u8; 8]) -> [u8; 4] {
    [payload[4], payload[5], payload[6], payload[7]]
}
