//! Capture session lifecycle and the fixed-rate capture loop.
//!
//! Orchestrates the full pipeline each tick:
//!
//! 1. [`FrameSource`] acquires a raw frame for the configured region.
//! 2. [`JpegCodec`] compresses it.
//! 3. The cursor is sampled and mapped into the region.
//! 4. [`ChangeDetector`] decides what, if anything, changed.
//! 5. A non-empty payload is offered to the bounded [`Dispatcher`].
//!
//! The transmitted state advances only on a successful, non-empty
//! hand-off: a rejected offer leaves it stale, so the same delta is
//! recomputed and re-attempted on the next tick and no change is ever
//! permanently lost, only delayed.
//!
//! The capture task and the broadcast task communicate exclusively
//! through the dispatcher — no other mutable state crosses that
//! boundary, and the capture task is the sole mutator of the
//! transmitted state.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::capture::{CaptureRegion, FrameSource, RawFrame};
use crate::codec::JpegCodec;
use crate::diff::ChangeDetector;
use crate::dispatch::{DispatchStats, DispatchStatsHandle, Dispatcher};
use crate::error::GlanceError;
use crate::net::BroadcastServer;

/// Pending-payload bound between capture and broadcast. Small on
/// purpose: it caps memory and bounds staleness to at most this many
/// queued payloads under sustained backpressure.
pub const DISPATCH_CAPACITY: usize = 2;

/// Consecutive tick failures before the session reports degraded.
const DEGRADED_THRESHOLD: u32 = 3;

// ── SessionHealth ────────────────────────────────────────────────

/// Operator-facing capture health, published via a watch channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionHealth {
    #[default]
    Healthy,
    /// Three or more consecutive ticks failed to capture or encode.
    /// Recovers on the next successful tick; never fatal by itself.
    Degraded,
}

// ── SessionConfig ────────────────────────────────────────────────

/// Configuration fixed for the duration of a capture session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Screen rectangle to sample each tick.
    pub region: CaptureRegion,
    /// Target capture rate; any positive integer is accepted.
    pub target_fps: u32,
    /// JPEG quality (1..=100), not renegotiated mid-session.
    pub quality: u8,
    /// Address the broadcast endpoint listens on.
    pub listen_addr: SocketAddr,
}

impl SessionConfig {
    /// Reject degenerate configuration before anything starts.
    pub fn validate(&self) -> Result<(), GlanceError> {
        self.region.validate()?;
        if self.target_fps == 0 {
            return Err(GlanceError::InvalidFps(0));
        }
        Ok(())
    }

    /// Tick period in integer milliseconds: `1000 / fps`, so 30 fps
    /// means 33 ms ticks (not 33.33), floored at 1 ms for rates above
    /// 1000.
    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(u64::from(1000 / self.target_fps).max(1))
    }
}

// ── CaptureSession ───────────────────────────────────────────────

/// One active capture-and-broadcast session.
///
/// Constructed by [`start`](Self::start), which takes exclusive
/// ownership of the frame source, the transmitted state, and the
/// dispatcher; discarded by [`stop`](Self::stop). There is no
/// process-wide singleton.
#[derive(Debug)]
pub struct CaptureSession {
    running: Arc<AtomicBool>,
    loop_handle: JoinHandle<()>,
    server_handle: JoinHandle<()>,
    server: Arc<BroadcastServer>,
    preview_rx: watch::Receiver<Option<RawFrame>>,
    health_rx: watch::Receiver<SessionHealth>,
    stats: DispatchStatsHandle,
    local_addr: SocketAddr,
}

impl CaptureSession {
    /// Validate `config`, bind the broadcast listener, and begin
    /// ticking at the configured rate.
    ///
    /// Configuration and bind errors surface here, synchronously,
    /// before any capture begins. The first tick after a successful
    /// start always emits a full payload: the transmitted state starts
    /// empty.
    pub async fn start(
        config: SessionConfig,
        source: Box<dyn FrameSource>,
    ) -> Result<CaptureSession, GlanceError> {
        config.validate()?;
        let listener = TcpListener::bind(config.listen_addr).await?;
        let local_addr = listener.local_addr()?;

        let (dispatcher, updates) = Dispatcher::new(DISPATCH_CAPACITY);
        let stats = dispatcher.stats_handle();
        let (preview_tx, preview_rx) = watch::channel(None);
        let (health_tx, health_rx) = watch::channel(SessionHealth::Healthy);
        let running = Arc::new(AtomicBool::new(true));

        let server = BroadcastServer::new();
        let server_handle = tokio::spawn(Arc::clone(&server).run(listener, updates));

        let mut capture = CaptureLoop {
            source,
            region: config.region,
            codec: JpegCodec::new(config.quality),
            detector: ChangeDetector::new(),
            dispatcher,
            preview_tx,
            health_tx,
            running: Arc::clone(&running),
            period: config.tick_period(),
        };
        let loop_handle = tokio::spawn(async move { capture.run().await });

        info!(addr = %local_addr, fps = config.target_fps, "capture session started");
        Ok(Self {
            running,
            loop_handle,
            server_handle,
            server,
            preview_rx,
            health_rx,
            stats,
            local_addr,
        })
    }

    /// Stop the session.
    ///
    /// The producer halts within one tick period (an in-flight tick is
    /// allowed to finish); dropping its dispatcher then drains the
    /// broadcast task out, which closes every viewer connection.
    /// Queued-but-unsent payloads are dropped — immediate close, no
    /// best-effort drain.
    pub async fn stop(self) {
        self.running.store(false, Ordering::SeqCst);
        let _ = self.loop_handle.await;
        let _ = self.server_handle.await;
        info!("capture session stopped");
    }

    /// Address the broadcast endpoint is actually bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Whether the capture loop is still ticking.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Side channel for the operator-facing preview: the raw bitmap of
    /// the latest tick whose payload carried an image field.
    pub fn preview(&self) -> watch::Receiver<Option<RawFrame>> {
        self.preview_rx.clone()
    }

    /// Watch the capture health signal.
    pub fn health(&self) -> watch::Receiver<SessionHealth> {
        self.health_rx.clone()
    }

    /// Offer/reject counters of the bounded conduit.
    pub fn dispatch_stats(&self) -> DispatchStats {
        self.stats.snapshot()
    }

    /// Number of currently connected viewers.
    pub fn viewer_count(&self) -> usize {
        self.server.viewer_count()
    }
}

// ── CaptureLoop ──────────────────────────────────────────────────

/// The fixed-interval producer. Lives on its own task; owns the frame
/// source, codec, detector, and the producer half of the dispatcher.
struct CaptureLoop {
    source: Box<dyn FrameSource>,
    region: CaptureRegion,
    codec: JpegCodec,
    detector: ChangeDetector,
    dispatcher: Dispatcher,
    preview_tx: watch::Sender<Option<RawFrame>>,
    health_tx: watch::Sender<SessionHealth>,
    running: Arc<AtomicBool>,
    period: Duration,
}

impl CaptureLoop {
    async fn run(&mut self) {
        let mut ticker = tokio::time::interval(self.period);
        let mut consecutive_failures = 0u32;

        while self.running.load(Ordering::SeqCst) {
            ticker.tick().await;
            if !self.running.load(Ordering::SeqCst) {
                break;
            }

            let raw = match self.source.capture().await {
                Ok(frame) => frame,
                Err(e) => {
                    self.tick_failed(&mut consecutive_failures, &e);
                    continue;
                }
            };
            let encoded = match self.codec.encode(&raw) {
                Ok(frame) => frame,
                Err(e) => {
                    self.tick_failed(&mut consecutive_failures, &e);
                    continue;
                }
            };
            if consecutive_failures >= DEGRADED_THRESHOLD {
                info!("capture recovered");
                let _ = self.health_tx.send(SessionHealth::Healthy);
            }
            consecutive_failures = 0;

            let cursor = self
                .source
                .cursor()
                .and_then(|(x, y)| self.region.locate(x, y));

            let payload = self.detector.diff(&encoded, cursor);
            if payload.is_empty() {
                continue;
            }
            if payload.image.is_some() {
                let _ = self.preview_tx.send(Some(raw));
            }
            if self.dispatcher.offer(payload) {
                self.detector.commit(encoded, cursor);
            } else {
                debug!("dispatch queue full; delta retried next tick");
            }
        }
    }

    /// A failed tick is skipped, never fatal; the transmitted state is
    /// left untouched.
    fn tick_failed(&self, consecutive: &mut u32, err: &GlanceError) {
        *consecutive += 1;
        warn!(error = %err, failures = *consecutive, "tick skipped");
        if *consecutive == DEGRADED_THRESHOLD {
            error!("three consecutive tick failures; capture degraded");
            let _ = self.health_tx.send(SessionHealth::Degraded);
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn config(fps: u32) -> SessionConfig {
        SessionConfig {
            region: CaptureRegion::new(0, 0, 64, 64),
            target_fps: fps,
            quality: 75,
            listen_addr: "127.0.0.1:0".parse().unwrap(),
        }
    }

    #[test]
    fn tick_period_uses_integer_division() {
        assert_eq!(config(30).tick_period(), Duration::from_millis(33));
        assert_eq!(config(60).tick_period(), Duration::from_millis(16));
        assert_eq!(config(24).tick_period(), Duration::from_millis(41));
        assert_eq!(config(1).tick_period(), Duration::from_millis(1000));
    }

    #[test]
    fn tick_period_floors_at_one_millisecond() {
        assert_eq!(config(1500).tick_period(), Duration::from_millis(1));
    }

    #[test]
    fn zero_fps_rejected() {
        let err = config(0).validate().unwrap_err();
        assert!(matches!(err, GlanceError::InvalidFps(0)));
    }

    #[test]
    fn degenerate_region_rejected() {
        let mut cfg = config(30);
        cfg.region = CaptureRegion::new(0, 0, 0, 0);
        assert!(matches!(
            cfg.validate(),
            Err(GlanceError::InvalidRegion { .. })
        ));
    }

    #[test]
    fn health_defaults_to_healthy() {
        assert_eq!(SessionHealth::default(), SessionHealth::Healthy);
    }
}
