//! Wire protocol for the viewer channel.
//!
//! Each frame on the persistent duplex connection is a fixed 12-byte
//! header (magic, blake3 payload checksum, payload length) followed by
//! one JSON-encoded [`Event`]. Viewers receive a `screen_update` event
//! per non-empty payload and periodic `ping` events; anything they send
//! back is drained and logged.

pub mod event;
pub mod frame;

pub use event::{Event, ScreenUpdate};
pub use frame::{EventCodec, FrameHeader, HEADER_SIZE, MAX_EVENT_SIZE};
