//! Still-image frame encoding.
//!
//! Each tick's [`RawFrame`] is compressed into an [`EncodedFrame`] —
//! a whole-frame lossy JPEG at a quality fixed for the session. The
//! change detector compares encoded frames by raw byte content, so the
//! encoder must be deterministic: the same pixel buffer at the same
//! quality yields byte-identical output.

use std::borrow::Cow;

use image::ExtendedColorType;
use image::codecs::jpeg::JpegEncoder;
use serde::{Deserialize, Serialize};

use crate::capture::{PixelFormat, RawFrame};
use crate::error::GlanceError;

// ── ImageFormat ──────────────────────────────────────────────────

/// Encoding applied to transmitted frames.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum ImageFormat {
    /// JPEG — lossy, good compression, fast.
    #[default]
    Jpeg,
}

impl std::fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImageFormat::Jpeg => write!(f, "jpeg"),
        }
    }
}

// ── EncodedFrame ─────────────────────────────────────────────────

/// An opaque compressed frame ready for transmission.
///
/// Equality is raw byte equality of the compressed data — two visually
/// identical frames that re-encode to different bytes count as changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedFrame {
    /// Encoding format tag.
    pub format: ImageFormat,
    /// Compressed image bytes.
    pub data: Vec<u8>,
}

impl EncodedFrame {
    /// Compressed size in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

// ── JpegCodec ────────────────────────────────────────────────────

/// JPEG encoder with a quality fixed at construction.
///
/// Quality is a session-wide configuration value (default 75) and is
/// never renegotiated mid-session.
pub struct JpegCodec {
    quality: u8,
}

/// Default encode quality when the caller does not choose one.
pub const DEFAULT_QUALITY: u8 = 75;

impl JpegCodec {
    /// Create a codec with `quality` clamped to 1..=100.
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }

    /// The quality this codec encodes at.
    pub fn quality(&self) -> u8 {
        self.quality
    }

    /// Compress a raw frame into a JPEG [`EncodedFrame`].
    ///
    /// Fails with [`GlanceError::Codec`] when the buffer does not match
    /// its declared dimensions.
    pub fn encode(&self, frame: &RawFrame) -> Result<EncodedFrame, GlanceError> {
        if frame.data.len() != frame.expected_len() {
            return Err(GlanceError::Codec(format!(
                "buffer length {} does not match {}x{} {:?}",
                frame.data.len(),
                frame.width,
                frame.height,
                frame.format
            )));
        }

        let rgb = Self::to_rgb(frame);
        let mut out = Vec::new();
        JpegEncoder::new_with_quality(&mut out, self.quality)
            .encode(&rgb, frame.width, frame.height, ExtendedColorType::Rgb8)
            .map_err(|e| GlanceError::Codec(e.to_string()))?;

        Ok(EncodedFrame {
            format: ImageFormat::Jpeg,
            data: out,
        })
    }

    /// Repack the buffer as tightly-packed RGB, dropping alpha and
    /// fixing up channel order where needed.
    fn to_rgb(frame: &RawFrame) -> Cow<'_, [u8]> {
        match frame.format {
            PixelFormat::Rgb8 => Cow::Borrowed(frame.data.as_slice()),
            PixelFormat::Rgba8 => {
                let mut rgb = Vec::with_capacity(frame.data.len() / 4 * 3);
                for px in frame.data.chunks_exact(4) {
                    rgb.extend_from_slice(&px[..3]);
                }
                Cow::Owned(rgb)
            }
            PixelFormat::Bgra8 => {
                let mut rgb = Vec::with_capacity(frame.data.len() / 4 * 3);
                for px in frame.data.chunks_exact(4) {
                    rgb.extend_from_slice(&[px[2], px[1], px[0]]);
                }
                Cow::Owned(rgb)
            }
        }
    }
}

impl Default for JpegCodec {
    fn default() -> Self {
        Self::new(DEFAULT_QUALITY)
    }
}

// ── Tests ────────────────────────────────────────────────────────
