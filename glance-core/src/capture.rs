//! Screen capture: regions, raw frames, and the OS-backed frame source.
//!
//! The [`FrameSource`] trait is the seam between the capture loop and the
//! operating system. The production implementation, [`MonitorSource`],
//! grabs whole-monitor bitmaps through `xcap` and crops the configured
//! region out of each one. Tests substitute scripted sources.

use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::GlanceError;

// ── PixelFormat ──────────────────────────────────────────────────

/// Pixel layout for raw captured frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 4 bytes per pixel: Red, Green, Blue, Alpha.
    Rgba8,
    /// 4 bytes per pixel: Blue, Green, Red, Alpha.
    Bgra8,
    /// 3 bytes per pixel: Red, Green, Blue.
    Rgb8,
}

impl PixelFormat {
    /// Bytes consumed by a single pixel in this format.
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgba8 | PixelFormat::Bgra8 => 4,
            PixelFormat::Rgb8 => 3,
        }
    }
}

// ── RawFrame ─────────────────────────────────────────────────────

/// A raw, uncompressed capture of the configured region.
///
/// The buffer is dense — `height` rows of `width * bytes_per_pixel`
/// bytes with no padding; the source resolves any GPU row alignment
/// before handing the frame over. A `RawFrame` is owned by the capture
/// tick that produced it and never retained past encoding.
#[derive(Debug, Clone)]
pub struct RawFrame {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Pixel layout.
    pub format: PixelFormat,
    /// Pixel data — `width * height * bytes_per_pixel` bytes.
    pub data: Vec<u8>,
    /// Monotonic capture timestamp.
    pub timestamp: Instant,
}

impl RawFrame {
    /// Byte size a well-formed buffer of these dimensions must have.
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_pixel()
    }
}

// ── CursorPosition ───────────────────────────────────────────────

/// Pointer position relative to the capture region origin.
///
/// The "pointer is outside the region" sentinel is the absence of a
/// value (`Option<CursorPosition>`), not a special coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorPosition {
    pub x: i32,
    pub y: i32,
}

// ── CaptureRegion ────────────────────────────────────────────────

/// The screen rectangle sampled each tick, in pixel coordinates of the
/// chosen display. Immutable for the duration of a capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureRegion {
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
}

impl CaptureRegion {
    pub fn new(left: i32, top: i32, width: u32, height: u32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    /// Rejects degenerate rectangles before a session starts.
    pub fn validate(&self) -> Result<(), GlanceError> {
        if self.width == 0 || self.height == 0 {
            return Err(GlanceError::InvalidRegion {
                width: self.width,
                height: self.height,
            });
        }
        Ok(())
    }

    /// Maps a display-space pointer position into region-relative
    /// coordinates, or `None` when the pointer lies outside the region.
    pub fn locate(&self, x: i32, y: i32) -> Option<CursorPosition> {
        let dx = x - self.left;
        let dy = y - self.top;
        if dx < 0 || dy < 0 || dx >= self.width as i32 || dy >= self.height as i32 {
            return None;
        }
        Some(CursorPosition { x: dx, y: dy })
    }
}

// ── FrameSource ──────────────────────────────────────────────────

/// Acquires raw pixel buffers for a configured screen region.
#[async_trait]
pub trait FrameSource: Send {
    /// Acquire one raw frame. Every call re-samples the screen — no
    /// caching. Fails with [`GlanceError::Capture`] when the region is
    /// no longer valid or the underlying OS call errors.
    async fn capture(&mut self) -> Result<RawFrame, GlanceError>;

    /// Current pointer position in the coordinate space of the
    /// captured display, or `None` when unavailable. The session maps
    /// this through [`CaptureRegion::locate`].
    fn cursor(&mut self) -> Option<(i32, i32)>;
}

// ── MonitorInfo ──────────────────────────────────────────────────

/// A display available for capture, as reported by the OS.
#[derive(Debug, Clone)]
pub struct MonitorInfo {
    pub id: u32,
    pub name: String,
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub is_primary: bool,
}

impl std::fmt::Display for MonitorInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Display {}: {}x{} @ {},{}",
            self.id, self.width, self.height, self.x, self.y
        )
    }
}

/// Enumerate the displays available for capture.
pub fn list_monitors() -> Result<Vec<MonitorInfo>, GlanceError> {
    let monitors = xcap::Monitor::all().map_err(|e| GlanceError::Capture(e.to_string()))?;
    let mut infos = Vec::with_capacity(monitors.len());
    for m in &monitors {
        infos.push(MonitorInfo {
            id: m.id().map_err(|e| GlanceError::Capture(e.to_string()))?,
            name: m.name().map_err(|e| GlanceError::Capture(e.to_string()))?,
            x: m.x().map_err(|e| GlanceError::Capture(e.to_string()))?,
            y: m.y().map_err(|e| GlanceError::Capture(e.to_string()))?,
            width: m.width().map_err(|e| GlanceError::Capture(e.to_string()))?,
            height: m.height().map_err(|e| GlanceError::Capture(e.to_string()))?,
            is_primary: m
                .is_primary()
                .map_err(|e| GlanceError::Capture(e.to_string()))?,
        });
    }
    Ok(infos)
}

// ── MonitorSource ────────────────────────────────────────────────

/// OS-backed [`FrameSource`] that captures one monitor via `xcap` and
/// crops the configured region out of each grab.
pub struct MonitorSource {
    monitor: xcap::Monitor,
    region: CaptureRegion,
}

impl MonitorSource {
    /// Open a source for `monitor_id` (the primary display when `None`)
    /// capturing `region` (the full display when `None`).
    ///
    /// Region coordinates are relative to the chosen display's origin.
    pub fn open(
        monitor_id: Option<u32>,
        region: Option<CaptureRegion>,
    ) -> Result<Self, GlanceError> {
        let monitors = xcap::Monitor::all().map_err(|e| GlanceError::Capture(e.to_string()))?;
        let mut chosen = None;
        for m in monitors {
            let id = m.id().map_err(|e| GlanceError::Capture(e.to_string()))?;
            let primary = m
                .is_primary()
                .map_err(|e| GlanceError::Capture(e.to_string()))?;
            match monitor_id {
                Some(wanted) if id == wanted => {
                    chosen = Some(m);
                    break;
                }
                None if primary => {
                    chosen = Some(m);
                    break;
                }
                _ => {}
            }
        }
        let monitor = chosen.ok_or_else(|| {
            GlanceError::Capture(match monitor_id {
                Some(id) => format!("monitor {id} not found"),
                None => "no primary monitor".to_string(),
            })
        })?;

        let region = match region {
            Some(r) => r,
            None => CaptureRegion::new(
                0,
                0,
                monitor.width().map_err(|e| GlanceError::Capture(e.to_string()))?,
                monitor
                    .height()
                    .map_err(|e| GlanceError::Capture(e.to_string()))?,
            ),
        };
        region.validate()?;

        Ok(Self { monitor, region })
    }

    /// The region this source crops out of each capture.
    pub fn region(&self) -> CaptureRegion {
        self.region
    }
}

#[async_trait]
impl FrameSource for MonitorSource {
    async fn capture(&mut self) -> Result<RawFrame, GlanceError> {
        let image = self
            .monitor
            .capture_image()
            .map_err(|e| GlanceError::Capture(e.to_string()))?;

        let r = self.region;
        let (img_w, img_h) = (image.width(), image.height());
        if r.left < 0
            || r.top < 0
            || r.left as u32 + r.width > img_w
            || r.top as u32 + r.height > img_h
        {
            return Err(GlanceError::Capture(format!(
                "region {}x{} @ {},{} outside monitor bounds {img_w}x{img_h}",
                r.width, r.height, r.left, r.top
            )));
        }

        let bpp = PixelFormat::Rgba8.bytes_per_pixel();
        let src = image.as_raw();
        let row_len = r.width as usize * bpp;
        let mut data = Vec::with_capacity(row_len * r.height as usize);
        for row in 0..r.height as usize {
            let y = r.top as usize + row;
            let offset = (y * img_w as usize + r.left as usize) * bpp;
            data.extend_from_slice(&src[offset..offset + row_len]);
        }

        Ok(RawFrame {
            width: r.width,
            height: r.height,
            format: PixelFormat::Rgba8,
            data,
            timestamp: Instant::now(),
        })
    }

    fn cursor(&mut self) -> Option<(i32, i32)> {
        // Global virtual-screen position, translated into this
        // display's coordinate space.
        let (gx, gy) = cursor::global_position()?;
        let ox = self.monitor.x().ok()?;
        let oy = self.monitor.y().ok()?;
        Some((gx - ox, gy - oy))
    }
}

// ── Cursor sampling (platform gate) ──────────────────────────────

#[cfg(target_os = "windows")]
mod cursor {
    use windows::Win32::Foundation::POINT;
    use windows::Win32::UI::WindowsAndMessaging::GetCursorPos;

    /// Global pointer position in virtual-screen coordinates.
    pub fn global_position() -> Option<(i32, i32)> {
        let mut point = POINT::default();
        // SAFETY: GetCursorPos writes through a valid POINT pointer.
        match unsafe { GetCursorPos(&mut point) } {
            Ok(()) => Some((point.x, point.y)),
            Err(_) => None,
        }
    }
}

#[cfg(not(target_os = "windows"))]
mod cursor {
    /// Pointer sampling is only wired up on Windows. Other platforms
    /// report no position; the pipeline treats that as a pointer
    /// permanently outside the captured region.
    pub fn global_position() -> Option<(i32, i32)> {
        None
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_per_pixel() {
        assert_eq!(PixelFormat::Rgba8.bytes_per_pixel(), 4);
        assert_eq!(PixelFormat::Bgra8.bytes_per_pixel(), 4);
        assert_eq!(PixelFormat::Rgb8.bytes_per_pixel(), 3);
    }

    #[test]
    fn degenerate_region_rejected() {
        assert!(CaptureRegion::new(0, 0, 0, 600).validate().is_err());
        assert!(CaptureRegion::new(0, 0, 800, 0).validate().is_err());
        assert!(CaptureRegion::new(10, 20, 800, 600).validate().is_ok());
    }

    #[test]
    fn locate_inside_region() {
        let region = CaptureRegion::new(100, 50, 800, 600);
        assert_eq!(
            region.locate(100, 50),
            Some(CursorPosition { x: 0, y: 0 })
        );
        assert_eq!(
            region.locate(899, 649),
            Some(CursorPosition { x: 799, y: 599 })
        );
    }

    #[test]
    fn locate_outside_region() {
        let region = CaptureRegion::new(100, 50, 800, 600);
        assert_eq!(region.locate(99, 50), None);
        assert_eq!(region.locate(100, 49), None);
        // Right/bottom edges are exclusive.
        assert_eq!(region.locate(900, 300), None);
        assert_eq!(region.locate(400, 650), None);
    }

    #[test]
    fn raw_frame_expected_len() {
        let frame = RawFrame {
            width: 4,
            height: 3,
            format: PixelFormat::Rgba8,
            data: vec![0; 48],
            timestamp: Instant::now(),
        };
        assert_eq!(frame.expected_len(), 48);
        assert_eq!(frame.data.len(), frame.expected_len());
    }
}
