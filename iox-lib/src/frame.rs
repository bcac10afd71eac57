use crate::constants::{
    CONFIRMATION_DEVICE_ID, CONFIRMATION_FLAGS, ETX, MIN_FRAME_SIZE, STX,
};
use crate::error::IoxError;
use bytes::Bytes;
use num_enum::{FromPrimitive, IntoPrimitive};

/// Message type byte carried in the second position of every
/// checksum-framed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, FromPrimitive)]
#[repr(u8)]
pub enum MessageType {
    /// Sent by the device to begin a session (always the fixed
    /// empty-payload token on the wire)
    Handshake = 0x01,
    /// Sent by the device to confirm our handshake confirmation
    HandshakeAck = 0x02,
    /// Telemetry record from the device
    TelemetryData = 0x21,
    /// Our reply to a handshake
    HandshakeConfirmation = 0x81,

    #[num_enum(catch_all)]
    Unknown(u8),
}

/// Running two-byte checksum over a byte slice.
///
/// `c1` accumulates the bytes, `c2` accumulates `c1`, both modulo 256.
/// The wire order is `[c1, c2]`.
pub fn checksum(bytes: &[u8]) -> [u8; 2] {
    let mut c1: u8 = 0;
    let mut c2: u8 = 0;
    for &b in bytes {
        c1 = c1.wrapping_add(b);
        c2 = c2.wrapping_add(c1);
    }
    [c1, c2]
}

/// One checksum-framed wire message.
///
/// Layout: `[STX] [type] [len] [payload; len] [c1] [c2] [ETX]`, where the
/// checksum covers everything from STX through the payload. The fixed
/// sync/handshake/acknowledgement tokens are matched by byte equality and
/// never go through this codec on the inbound path.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub message_type: MessageType,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(message_type: MessageType, payload: Bytes) -> Self {
        Frame {
            message_type,
            payload,
        }
    }

    /// The fixed handshake confirmation we send in response to the
    /// device's handshake token: constant device identifier plus
    /// constant flags.
    pub fn handshake_confirmation() -> Self {
        let mut payload = Vec::with_capacity(4);
        payload.extend_from_slice(&CONFIRMATION_DEVICE_ID);
        payload.extend_from_slice(&CONFIRMATION_FLAGS);
        Frame {
            message_type: MessageType::HandshakeConfirmation,
            payload: Bytes::from(payload),
        }
    }

    /// Encode into the full wire representation.
    ///
    /// The length field is a single byte; payloads longer than 255 bytes
    /// are not representable and are masked, matching the device.
    pub fn encode(&self) -> Bytes {
        let mut out = Vec::with_capacity(self.payload.len() + MIN_FRAME_SIZE);
        out.push(STX);
        out.push(self.message_type.into());
        out.push((self.payload.len() & 0xFF) as u8);
        out.extend_from_slice(&self.payload);
        let ck = checksum(&out);
        out.extend_from_slice(&ck);
        out.push(ETX);
        Bytes::from(out)
    }

    /// Decode a complete frame from a raw byte slice, validating the
    /// markers, the declared length and the checksum.
    pub fn decode(raw: &[u8]) -> Result<Frame, IoxError> {
        if raw.len() < MIN_FRAME_SIZE {
            return Err(IoxError::Framing(format!(
                "frame too short: {} bytes",
                raw.len()
            )));
        }
        if raw[0] != STX {
            return Err(IoxError::Framing(format!(
                "bad start marker: {:#04x}",
                raw[0]
            )));
        }
        let last = raw.len() - 1;
        if raw[last] != ETX {
            return Err(IoxError::Framing(format!(
                "bad end marker: {:#04x}",
                raw[last]
            )));
        }
        let declared = raw[2] as usize;
        if declared + MIN_FRAME_SIZE != raw.len() {
            return Err(IoxError::Framing(format!(
                "length mismatch: declared {} byte payload in a {} byte frame",
                declared,
                raw.len()
            )));
        }
        let expected = checksum(&raw[..raw.len() - 3]);
        let actual = [raw[raw.len() - 3], raw[raw.len() - 2]];
        if expected != actual {
            return Err(IoxError::ChecksumMismatch { expected, actual });
        }
        Ok(Frame {
            message_type: MessageType::from_primitive(raw[1]),
            payload: Bytes::copy_from_slice(&raw[3..raw.len() - 3]),
        })
    }
}
