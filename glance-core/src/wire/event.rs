//! Typed wire events.
//!
//! The `screen_update` payload is sparse: `image_data` is present only
//! when the image changed, `cursor_pos` only when the cursor state
//! changed — with explicit `null` meaning the pointer left the captured
//! region. An event with neither key is never produced; the capture
//! loop suppresses empty payloads before they reach the wire.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Deserializer, Serialize};

use crate::capture::CursorPosition;
use crate::diff::{CursorSample, UpdatePayload};
use crate::error::GlanceError;

// ── ScreenUpdate ─────────────────────────────────────────────────

/// Body of a `screen_update` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenUpdate {
    /// Base64 of the compressed image bytes; absent when unchanged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_data: Option<String>,

    /// Region-relative cursor position, `null` for outside-region;
    /// absent entirely when unchanged.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "double_option"
    )]
    pub cursor_pos: Option<CursorSample>,
}

/// Keeps `"cursor_pos": null` distinguishable from an absent key:
/// an explicit null deserializes to `Some(None)`, a missing key falls
/// back to the field default of `None`.
fn double_option<'de, D>(de: D) -> Result<Option<CursorSample>, D::Error>
where
    D: Deserializer<'de>,
{
    CursorSample::deserialize(de).map(Some)
}

impl ScreenUpdate {
    /// Decode the image field back into compressed bytes.
    pub fn image_bytes(&self) -> Result<Option<Vec<u8>>, GlanceError> {
        match &self.image_data {
            Some(b64) => BASE64
                .decode(b64)
                .map(Some)
                .map_err(|e| GlanceError::Encoding(e.to_string())),
            None => Ok(None),
        }
    }

    /// The cursor field, if present: `Some(Some(_))` for a position,
    /// `Some(None)` for outside-region, `None` for unchanged.
    pub fn cursor(&self) -> Option<Option<CursorPosition>> {
        self.cursor_pos
    }
}

// ── Event ────────────────────────────────────────────────────────

/// One event on the viewer channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum Event {
    /// A sparse screen/cursor delta pushed to every viewer.
    ScreenUpdate(ScreenUpdate),
    /// Liveness probe; viewers are not required to answer.
    Ping,
}

impl Event {
    /// Build a `screen_update` event from a non-empty payload.
    pub fn screen_update(payload: &UpdatePayload) -> Event {
        Event::ScreenUpdate(ScreenUpdate {
            image_data: payload.image.as_ref().map(|f| BASE64.encode(&f.data)),
            cursor_pos: payload.cursor,
        })
    }

    /// Serialize to the JSON bytes carried inside a wire frame.
    pub fn to_bytes(&self) -> Result<Vec<u8>, GlanceError> {
        serde_json::to_vec(self).map_err(Into::into)
    }

    /// Deserialize from the JSON bytes of a wire frame.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, GlanceError> {
        serde_json::from_slice(bytes).map_err(Into::into)
    }
}

// ── Tests ────────────────────────────────────────────────────────
