//! Change detection between the current tick and the last transmitted
//! state.
//!
//! Image changes and cursor changes are detected independently: a
//! stationary cursor never forces a frame re-send, and a cursor-only
//! move never forces an image re-send. That independence is the central
//! bandwidth-saving property of the pipeline.
//!
//! Image comparison is raw byte equality of the encoded frames — not
//! pixel-semantic diffing. That is an accepted approximation, kept
//! deliberately.

use crate::capture::CursorPosition;
use crate::codec::EncodedFrame;

/// One cursor observation: a region-relative position, or `None` when
/// the pointer lies outside the captured region.
pub type CursorSample = Option<CursorPosition>;

// ── TransmittedState ─────────────────────────────────────────────

/// What was last placed on the dispatcher — not what was necessarily
/// delivered to any given viewer.
///
/// The outer `Option` on `cursor` distinguishes "nothing transmitted
/// yet" (which forces a change on the next diff) from "transmitted as
/// outside-region" (further outside samples compare equal).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransmittedState {
    /// Last encoded frame handed off, if any.
    pub frame: Option<EncodedFrame>,
    /// Last cursor sample handed off, if any.
    pub cursor: Option<CursorSample>,
}

impl TransmittedState {
    /// True until the first successful hand-off after session start.
    pub fn is_empty(&self) -> bool {
        self.frame.is_none() && self.cursor.is_none()
    }
}

// ── UpdatePayload ────────────────────────────────────────────────

/// The sparse changed-fields structure handed to the dispatcher.
///
/// A field is present only if that aspect changed since
/// [`TransmittedState`]; a payload with neither field is never
/// dispatched.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdatePayload {
    /// New frame bytes, present only when the image changed.
    pub image: Option<EncodedFrame>,
    /// New cursor sample, present only when the cursor state changed.
    /// `Some(None)` means the pointer moved outside the region.
    pub cursor: Option<CursorSample>,
}

impl UpdatePayload {
    /// Nothing changed this tick — the caller must not dispatch.
    pub fn is_empty(&self) -> bool {
        self.image.is_none() && self.cursor.is_none()
    }
}

// ── ChangeDetector ───────────────────────────────────────────────

/// Stateful detector comparing each tick against the last transmitted
/// state.
///
/// The capture loop is the sole owner: it calls [`diff`](Self::diff)
/// every tick and [`commit`](Self::commit) only after a successful
/// hand-off, so a rejected dispatch leaves the state stale and the same
/// delta is recomputed on the next tick.
#[derive(Debug, Default)]
pub struct ChangeDetector {
    state: TransmittedState,
}

impl ChangeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset to the empty state, forcing the next diff to emit a full
    /// payload (both fields present).
    pub fn reset(&mut self) {
        self.state = TransmittedState::default();
    }

    /// Compare a freshly encoded frame and cursor sample against the
    /// last transmitted state.
    pub fn diff(&self, frame: &EncodedFrame, cursor: CursorSample) -> UpdatePayload {
        let image_changed = match &self.state.frame {
            Some(last) => last != frame,
            None => true,
        };
        let cursor_changed = match self.state.cursor {
            Some(last) => last != cursor,
            None => true,
        };

        UpdatePayload {
            image: image_changed.then(|| frame.clone()),
            cursor: cursor_changed.then_some(cursor),
        }
    }

    /// Advance the transmitted state after a successful, non-empty
    /// hand-off.
    pub fn commit(&mut self, frame: EncodedFrame, cursor: CursorSample) {
        self.state = TransmittedState {
            frame: Some(frame),
            cursor: Some(cursor),
        };
    }

    /// The current transmitted state.
    pub fn state(&self) -> &TransmittedState {
        &self.state
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::ImageFormat;

    fn encoded(byte: u8) -> EncodedFrame {
        EncodedFrame {
            format: ImageFormat::Jpeg,
            data: vec![byte; 16],
        }
    }

    fn cursor(x: i32, y: i32) -> CursorSample {
        Some(CursorPosition { x, y })
    }

    #[test]
    fn first_diff_is_full_payload() {
        let det = ChangeDetector::new();
        let payload = det.diff(&encoded(1), cursor(5, 5));
        assert_eq!(payload.image, Some(encoded(1)));
        assert_eq!(payload.cursor, Some(cursor(5, 5)));
    }

    #[test]
    fn first_diff_with_outside_cursor_still_reports_cursor() {
        let det = ChangeDetector::new();
        let payload = det.diff(&encoded(1), None);
        assert!(payload.image.is_some());
        // Explicit "outside region", not an omitted field.
        assert_eq!(payload.cursor, Some(None));
    }

    #[test]
    fn identical_tick_is_suppressed() {
        let mut det = ChangeDetector::new();
        det.commit(encoded(1), cursor(5, 5));
        let payload = det.diff(&encoded(1), cursor(5, 5));
        assert!(payload.is_empty());
    }

    #[test]
    fn cursor_only_move_omits_image() {
        let mut det = ChangeDetector::new();
        det.commit(encoded(1), cursor(5, 5));
        let payload = det.diff(&encoded(1), cursor(6, 5));
        assert!(payload.image.is_none());
        assert_eq!(payload.cursor, Some(cursor(6, 5)));
    }

    #[test]
    fn image_only_change_omits_cursor() {
        let mut det = ChangeDetector::new();
        det.commit(encoded(1), cursor(5, 5));
        let payload = det.diff(&encoded(2), cursor(5, 5));
        assert_eq!(payload.image, Some(encoded(2)));
        assert!(payload.cursor.is_none());
    }

    #[test]
    fn leaving_region_counts_as_cursor_change() {
        let mut det = ChangeDetector::new();
        det.commit(encoded(1), cursor(5, 5));
        let payload = det.diff(&encoded(1), None);
        assert!(payload.image.is_none());
        assert_eq!(payload.cursor, Some(None));
    }

    #[test]
    fn staying_outside_region_is_not_a_change() {
        let mut det = ChangeDetector::new();
        det.commit(encoded(1), None);
        // Pointer wandered between two outside positions — both map to
        // the same absent sentinel.
        let payload = det.diff(&encoded(1), None);
        assert!(payload.is_empty());
    }

    #[test]
    fn uncommitted_diff_repeats_against_stale_state() {
        let mut det = ChangeDetector::new();
        det.commit(encoded(1), cursor(5, 5));
        // Dispatch of frame 2 was rejected — no commit.
        let first = det.diff(&encoded(2), cursor(5, 5));
        assert!(first.image.is_some());
        let retry = det.diff(&encoded(2), cursor(5, 5));
        assert_eq!(first, retry);
    }

    #[test]
    fn reset_forces_full_payload() {
        let mut det = ChangeDetector::new();
        det.commit(encoded(1), cursor(5, 5));
        det.reset();
        assert!(det.state().is_empty());
        let payload = det.diff(&encoded(1), cursor(5, 5));
        assert!(payload.image.is_some());
        assert!(payload.cursor.is_some());
    }
}
