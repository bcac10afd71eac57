use crate::constants::{MIN_FRAME_SIZE, STX, TELEMETRY_TYPE};
use bytes::{Bytes, BytesMut};
use tracing::{debug, warn};

/// A telemetry frame under reconstruction from MTU-limited reads.
///
/// `expected` stays unset until the six header bytes have been buffered
/// and the length byte can be trusted.
#[derive(Debug)]
struct PartialFrame {
    buf: BytesMut,
    expected: Option<usize>,
}

/// Accumulates fragmented transport reads into whole telemetry frames.
///
/// BLE delivers a frame as several MTU-sized chunks, and a chunk can be
/// arbitrarily small — the type and length bytes may themselves arrive
/// split across reads. Accumulation starts on any STX-leading chunk;
/// whether the buffer really is a telemetry frame (and how long it will
/// be) is judged once the full header is present. Reads on a
/// non-fragmenting transport never go through here. At most one partial
/// frame exists at a time, and only while a session is connected.
#[derive(Debug, Default)]
pub struct FragmentReassembler {
    partial: Option<PartialFrame>,
}

impl FragmentReassembler {
    pub fn new() -> Self {
        FragmentReassembler { partial: None }
    }

    /// Feed one raw transport read. Returns the completed frame bytes
    /// once the accumulated length reaches the length declared in the
    /// frame header.
    ///
    /// A leading chunk that does not begin with STX is dropped; the
    /// protocol has no resynchronization mechanism, so nothing better
    /// can be done with it.
    pub fn push(&mut self, chunk: &[u8]) -> Option<Bytes> {
        match self.partial.as_mut() {
            None => {
                if chunk.first() != Some(&STX) {
                    debug!(len = chunk.len(), "dropping non-frame-start chunk");
                    return None;
                }
                let mut buf = BytesMut::with_capacity(MIN_FRAME_SIZE);
                buf.extend_from_slice(chunk);
                self.partial = Some(PartialFrame {
                    buf,
                    expected: None,
                });
            }
            Some(partial) => {
                partial.buf.extend_from_slice(chunk);
            }
        }

        let mut not_telemetry = false;
        if let Some(partial) = self.partial.as_mut() {
            if partial.expected.is_none() && partial.buf.len() >= MIN_FRAME_SIZE {
                if partial.buf[1] == TELEMETRY_TYPE {
                    partial.expected = Some(partial.buf[2] as usize + MIN_FRAME_SIZE);
                } else {
                    not_telemetry = true;
                }
            }
        }
        if not_telemetry {
            debug!("buffered header is not a telemetry frame, dropping");
            self.partial = None;
            return None;
        }

        let partial = self.partial.as_ref()?;
        let expected = partial.expected?;
        if partial.buf.len() == expected {
            let done = self.partial.take()?;
            return Some(done.buf.freeze());
        }
        if partial.buf.len() > expected {
            // Only possible with a corrupted length or start byte;
            // discard so a later frame start can resync.
            warn!(
                accumulated = partial.buf.len(),
                expected, "partial frame overran its declared length, discarding"
            );
            self.partial = None;
        }
        None
    }

    /// Drop any pending partial frame. Called whenever the session
    /// leaves the connected state.
    pub fn reset(&mut self) {
        self.partial = None;
    }

    pub fn is_pending(&self) -> bool {
        self.partial.is_some()
    }
}
