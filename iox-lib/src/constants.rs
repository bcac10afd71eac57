// Wire constants for the IOX accessory protocol

use std::time::Duration;

/// Frame start marker
pub const STX: u8 = 0x02;

/// Frame end marker
pub const ETX: u8 = 0x03;

/// Single-byte sync token, sent repeatedly while waiting for the device
/// to begin handshaking
pub const SYNC_BYTE: u8 = 0x55;

/// Handshake token the device sends once it has seen our sync byte.
/// This is the empty-payload encoding of message type 0x01.
pub const HANDSHAKE_TOKEN: [u8; 6] = [0x02, 0x01, 0x00, 0x03, 0x08, 0x03];

/// Acknowledgement token the device sends after our handshake
/// confirmation. Empty-payload encoding of message type 0x02.
pub const ACK_TOKEN: [u8; 6] = [0x02, 0x02, 0x00, 0x04, 0x0A, 0x03];

/// Telemetry data message type byte
pub const TELEMETRY_TYPE: u8 = 0x21;

/// Handshake confirmation message type byte
pub const HANDSHAKE_CONFIRMATION_TYPE: u8 = 0x81;

/// Device identifier carried in the handshake confirmation payload
pub const CONFIRMATION_DEVICE_ID: [u8; 2] = [0x10, 0x27];

/// Flags carried in the handshake confirmation payload (bit 0 enables
/// binary telemetry streaming)
pub const CONFIRMATION_FLAGS: [u8; 2] = [0x01, 0x00];

/// Bytes of framing around a payload: STX, type, length, two checksum
/// bytes, ETX
pub const FRAME_OVERHEAD: usize = 6;

/// Smallest possible frame (empty payload)
pub const MIN_FRAME_SIZE: usize = FRAME_OVERHEAD;

/// Size of the fixed telemetry record (40 bytes)
pub const TELEMETRY_PAYLOAD_SIZE: usize = 40;

/// Seconds between the Unix epoch and the device epoch
/// (2002-01-01T00:00:00Z)
pub const DEVICE_EPOCH_OFFSET_SECS: i64 = 1_009_843_200;

/// Interval between sync byte retransmissions while syncing
pub const SYNC_RETRY_INTERVAL: Duration = Duration::from_secs(1);
