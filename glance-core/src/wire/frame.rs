//! Length-prefixed framing for the viewer channel.
//!
//! ## Wire format
//!
//! Every frame is a fixed header followed by a JSON event payload
//! (little-endian):
//!
//! ```text
//! magic:     [u8; 4]  b"GLNC"
//! checksum:  u32      first 4 bytes of blake3(payload)
//! len:       u32      payload length in bytes
//! payload:   [u8]     one serialized Event
//! ```

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::GlanceError;
use crate::wire::event::Event;

// ── Constants ────────────────────────────────────────────────────

/// Frame magic sequence.
pub const FRAME_MAGIC: [u8; 4] = *b"GLNC";

/// Encoded header size on the wire.
pub const HEADER_SIZE: usize = 12;

/// Upper bound on a single event payload (a quality-75 JPEG of a large
/// display is well under this).
pub const MAX_EVENT_SIZE: usize = 16 * 1024 * 1024;

/// First 4 little-endian bytes of the blake3 hash of `payload`.
fn payload_checksum(payload: &[u8]) -> u32 {
    let hash = blake3::hash(payload);
    let bytes = hash.as_bytes();
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

// ── FrameHeader ──────────────────────────────────────────────────

/// Fixed per-frame metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub checksum: u32,
    pub len: u32,
}

impl FrameHeader {
    /// Serialize to bytes (little-endian).
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&FRAME_MAGIC);
        buf[4..8].copy_from_slice(&self.checksum.to_le_bytes());
        buf[8..12].copy_from_slice(&self.len.to_le_bytes());
        buf
    }

    /// Deserialize from bytes, verifying the magic sequence.
    pub fn decode(data: &[u8]) -> Result<Self, GlanceError> {
        if data.len() < HEADER_SIZE {
            return Err(GlanceError::Encoding(format!(
                "header too short: {} < {HEADER_SIZE}",
                data.len()
            )));
        }
        if data[0..4] != FRAME_MAGIC {
            return Err(GlanceError::InvalidMagic);
        }
        Ok(Self {
            checksum: u32::from_le_bytes([data[4], data[5], data[6], data[7]]),
            len: u32::from_le_bytes([data[8], data[9], data[10], data[11]]),
        })
    }
}

// ── EventCodec ───────────────────────────────────────────────────

/// `tokio_util` codec carrying [`Event`]s over a framed TCP stream.
#[derive(Debug, Default)]
pub struct EventCodec;

impl Decoder for EventCodec {
    type Item = Event;
    type Error = GlanceError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Event>, GlanceError> {
        if src.len() < HEADER_SIZE {
            return Ok(None);
        }
        let header = FrameHeader::decode(&src[..HEADER_SIZE])?;
        let len = header.len as usize;
        if len > MAX_EVENT_SIZE {
            return Err(GlanceError::FrameTooLarge {
                size: len,
                max: MAX_EVENT_SIZE,
            });
        }
        if src.len() < HEADER_SIZE + len {
            src.reserve(HEADER_SIZE + len - src.len());
            return Ok(None);
        }

        src.advance(HEADER_SIZE);
        let payload = src.split_to(len);
        if payload_checksum(&payload) != header.checksum {
            return Err(GlanceError::ChecksumMismatch);
        }
        Ok(Some(Event::from_bytes(&payload)?))
    }
}

impl Encoder<Event> for EventCodec {
    type Error = GlanceError;

    fn encode(&mut self, item: Event, dst: &mut BytesMut) -> Result<(), GlanceError> {
        let payload = item.to_bytes()?;
        if payload.len() > MAX_EVENT_SIZE {
            return Err(GlanceError::FrameTooLarge {
                size: payload.len(),
                max: MAX_EVENT_SIZE,
            });
        }
        let header = FrameHeader {
            checksum: payload_checksum(&payload),
            len: payload.len() as u32,
        };
        dst.reserve(HEADER_SIZE + payload.len());
        dst.extend_from_slice(&header.encode());
        dst.extend_from_slice(&payload);
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_roundtrip() {
        let header = FrameHeader {
            checksum: 0xDEAD_BEEF,
            len: 4096,
        };
        let decoded = FrameHeader::decode(&header.encode()).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn header_rejects_bad_magic() {
        let mut bytes = FrameHeader {
            checksum: 0,
            len: 0,
        }
        .encode();
        bytes[0] = b'X';
        assert!(matches!(
            FrameHeader::decode(&bytes),
            Err(GlanceError::InvalidMagic)
        ));
    }

    #[test]
    fn codec_roundtrip() {
        let mut codec = EventCodec;
        let mut buf = BytesMut::new();
        codec.encode(Event::Ping, &mut buf).unwrap();

        let decoded = codec.decode(&mut buf).unwrap();
        assert_eq!(decoded, Some(Event::Ping));
        assert!(buf.is_empty());
    }

    #[test]
    fn partial_frame_waits_for_more_bytes() {
        let mut codec = EventCodec;
        let mut full = BytesMut::new();
        codec.encode(Event::Ping, &mut full).unwrap();

        let mut partial = BytesMut::from(&full[..HEADER_SIZE + 2]);
        assert_eq!(codec.decode(&mut partial).unwrap(), None);

        partial.extend_from_slice(&full[HEADER_SIZE + 2..]);
        assert_eq!(codec.decode(&mut partial).unwrap(), Some(Event::Ping));
    }

    #[test]
    fn corrupted_payload_fails_checksum() {
        let mut codec = EventCodec;
        let mut buf = BytesMut::new();
        codec.encode(Event::Ping, &mut buf).unwrap();

        let last = buf.len() - 1;
        buf[last] ^= 0xFF;
        assert!(matches!(
            codec.decode(&mut buf),
            Err(GlanceError::ChecksumMismatch)
        ));
    }

    #[test]
    fn oversized_length_rejected_before_buffering() {
        let mut codec = EventCodec;
        let header = FrameHeader {
            checksum: 0,
            len: (MAX_EVENT_SIZE + 1) as u32,
        };
        let mut buf = BytesMut::from(&header.encode()[..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(GlanceError::FrameTooLarge { .. })
        ));
    }

    #[test]
    fn back_to_back_frames_decode_in_order() {
        let mut codec = EventCodec;
        let mut buf = BytesMut::new();
        let update = Event::ScreenUpdate(crate::wire::event::ScreenUpdate {
            image_data: Some("YWJj".to_string()),
            cursor_pos: None,
        });
        codec.encode(update.clone(), &mut buf).unwrap();
        codec.encode(Event::Ping, &mut buf).unwrap();

        assert_eq!(codec.decode(&mut buf).unwrap(), Some(update));
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Event::Ping));
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
    }
}
