//! # glance-core
//!
//! Core library for glance: periodic screen-region capture, encoded as
//! JPEG, with only the *changes* (image bytes and pointer position)
//! streamed to connected viewers over a persistent push channel.
//!
//! ## Architecture
//!
//! ```text
//! CAPTURE TASK                                 BROADCAST TASK
//! ┌──────────────────────────┐                ┌─────────────────────────┐
//! │ FrameSource (xcap)       │                │ BroadcastServer         │
//! │   ↓                      │    bounded     │   accept / drain / ping │
//! │ JpegCodec                │   Dispatcher   │   ↓ per-viewer queue    │
//! │   ↓                      │ ─────────────► │ ViewerConnection × N    │
//! │ ChangeDetector           │  (capacity 2)  │   Framed<EventCodec>    │
//! │   (TransmittedState)     │                │                         │
//! └──────────────────────────┘                └─────────────────────────┘
//! ```
//!
//! The capture cadence never blocks on network send cadence: the
//! dispatcher rejects under backpressure and the transmitted state only
//! advances on an accepted hand-off, so suppressed deltas are retried
//! rather than lost.
//!
//! ## Modules
//!
//! | Module     | Purpose                                             |
//! |------------|-----------------------------------------------------|
//! | `capture`  | Regions, raw frames, `FrameSource` seam, xcap source |
//! | `codec`    | JPEG encoding with byte-equality comparison          |
//! | `diff`     | Change detection against the last transmitted state |
//! | `dispatch` | Bounded, non-blocking capture→broadcast conduit      |
//! | `session`  | Fixed-rate capture loop and session lifecycle        |
//! | `net`      | Broadcast endpoint and viewer connection lifecycle   |
//! | `wire`     | JSON event payloads and length-prefixed framing      |
//! | `error`    | `GlanceError` — typed, `thiserror`-based hierarchy   |

pub mod capture;
pub mod codec;
pub mod diff;
pub mod dispatch;
pub mod error;
pub mod net;
pub mod session;
pub mod wire;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use capture::{
    CaptureRegion, CursorPosition, FrameSource, MonitorInfo, MonitorSource, PixelFormat, RawFrame,
    list_monitors,
};
pub use codec::{DEFAULT_QUALITY, EncodedFrame, ImageFormat, JpegCodec};
pub use diff::{ChangeDetector, CursorSample, TransmittedState, UpdatePayload};
pub use dispatch::{DispatchReceiver, DispatchStats, DispatchStatsHandle, Dispatcher};
pub use error::GlanceError;
pub use net::BroadcastServer;
pub use session::{CaptureSession, DISPATCH_CAPACITY, SessionConfig, SessionHealth};
pub use wire::{Event, EventCodec, ScreenUpdate};
