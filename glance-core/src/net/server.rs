//! Broadcast endpoint: accepts viewer connections and fans payloads
//! out to every connected viewer.
//!
//! One task owns the listener and the dispatcher's consumer half and
//! multiplexes three concerns: accepting connections, draining
//! payloads, and heartbeating. Fan-out goes through each viewer's
//! bounded outbound queue, so payloads reach every viewer in hand-off
//! order and one slow or dead viewer never stalls the drain.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::StreamExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::codec::Framed;
use tracing::{info, warn};

use crate::dispatch::DispatchReceiver;
use crate::net::viewer::{self, OUTBOUND_CAPACITY, ViewerHandle, ViewerRegistry};
use crate::wire::{Event, EventCodec};

/// How often a `ping` event is enqueued to every viewer so dead
/// sockets are reaped while the screen is static.
pub(crate) const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

// ── BroadcastServer ──────────────────────────────────────────────

/// Pushes every dispatched payload to all currently connected viewers.
#[derive(Debug)]
pub struct BroadcastServer {
    registry: Arc<ViewerRegistry>,
    next_viewer_id: AtomicU64,
}

impl BroadcastServer {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            registry: Arc::new(ViewerRegistry::default()),
            next_viewer_id: AtomicU64::new(1),
        })
    }

    /// Number of currently connected viewers.
    pub fn viewer_count(&self) -> usize {
        self.registry.len()
    }

    /// Serve until the dispatcher closes, then drop every viewer.
    ///
    /// Runs as the session's consumer task: payloads are drained even
    /// with zero viewers connected, which is what keeps the producer's
    /// conduit moving.
    pub(crate) async fn run(self: Arc<Self>, listener: TcpListener, mut updates: DispatchReceiver) {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => self.register(stream, addr),
                    Err(e) => warn!(error = %e, "accept failed"),
                },
                payload = updates.recv() => match payload {
                    Some(p) => self.broadcast(Event::screen_update(&p)),
                    // Producer gone — the session is stopping.
                    None => break,
                },
                _ = heartbeat.tick() => self.broadcast(Event::Ping),
            }
        }

        // Dropping the handles closes every outbound queue; writer
        // tasks drain out and the sockets close.
        self.registry.clear();
        info!("broadcast server stopped");
    }

    /// Register a freshly accepted connection and spawn its I/O tasks.
    fn register(&self, stream: TcpStream, addr: SocketAddr) {
        let id = self.next_viewer_id.fetch_add(1, Ordering::Relaxed);
        let (sink, stream_half) = Framed::new(stream, EventCodec).split();
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);

        self.registry.insert(
            id,
            ViewerHandle {
                outbound: outbound_tx,
            },
        );
        tokio::spawn(viewer::write_loop(
            id,
            sink,
            outbound_rx,
            Arc::clone(&self.registry),
        ));
        tokio::spawn(viewer::read_loop(id, stream_half, Arc::clone(&self.registry)));
        info!(viewer = id, %addr, "viewer connected");
    }

    /// Enqueue `event` to every connected viewer.
    ///
    /// A viewer whose queue is full or closed is removed; delivery to
    /// the others continues.
    fn broadcast(&self, event: Event) {
        for (id, outbound) in self.registry.snapshot() {
            match outbound.try_send(event.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    if self.registry.remove(id).is_some() {
                        info!(viewer = id, "viewer cannot keep up; disconnecting");
                    }
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    self.registry.remove(id);
                }
            }
        }
    }
}
