//! Domain-specific error types for the glance pipeline.
//!
//! All fallible operations return `Result<T, GlanceError>`.
//! No panics on invalid input — every error is typed and recoverable.

use thiserror::Error;

/// The canonical error type for the glance pipeline.
#[derive(Debug, Error)]
pub enum GlanceError {
    // ── Configuration Errors ─────────────────────────────────────
    /// The capture region has a non-positive dimension.
    #[error("degenerate capture region: {width}x{height}")]
    InvalidRegion { width: u32, height: u32 },

    /// The target frame rate is not a positive integer.
    #[error("invalid target frame rate: {0}")]
    InvalidFps(u32),

    // ── Pipeline Errors ──────────────────────────────────────────
    /// The OS screen read failed or the region is no longer valid.
    #[error("capture failed: {0}")]
    Capture(String),

    /// Image encoding failed on a captured buffer.
    #[error("encode failed: {0}")]
    Codec(String),

    // ── Wire Errors ──────────────────────────────────────────────
    /// Received bytes that do not start with the GLNC magic sequence.
    #[error("invalid magic bytes: expected GLNC")]
    InvalidMagic,

    /// The event payload failed checksum verification.
    #[error("checksum mismatch")]
    ChecksumMismatch,

    /// An event frame exceeds the codec limit.
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// Serialization or deserialization of an event failed.
    #[error("encoding error: {0}")]
    Encoding(String),

    // ── Connection Errors ────────────────────────────────────────
    /// The TCP/IO layer reported an error.
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    /// An mpsc channel was closed unexpectedly.
    #[error("channel closed")]
    ChannelClosed,
}

// ── Convenient From implementations ──────────────────────────────

impl From<serde_json::Error> for GlanceError {
    fn from(e: serde_json::Error) -> Self {
        GlanceError::Encoding(e.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for GlanceError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        GlanceError::ChannelClosed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let e = GlanceError::InvalidRegion {
            width: 0,
            height: 600,
        };
        assert!(e.to_string().contains("0x600"));

        let e = GlanceError::FrameTooLarge {
            size: 1000,
            max: 500,
        };
        assert!(e.to_string().contains("1000"));
        assert!(e.to_string().contains("500"));
    }

    #[test]
    fn from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broke");
        let e: GlanceError = io_err.into();
        assert!(matches!(e, GlanceError::Connection(_)));
    }

    #[test]
    fn from_serde_json() {
        let bad = serde_json::from_str::<serde_json::Value>("{");
        let e: GlanceError = bad.unwrap_err().into();
        assert!(matches!(e, GlanceError::Encoding(_)));
    }
}
