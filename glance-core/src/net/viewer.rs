//! Per-viewer connection state and I/O tasks.
//!
//! Each accepted connection is split into a writer task (draining the
//! viewer's bounded outbound queue into the framed socket) and a reader
//! task (draining whatever the viewer sends and noticing disconnects).
//! Either task removes the viewer from the registry on failure; removal
//! is idempotent, and dropping the registry's sender half is what makes
//! the writer task exit and the socket close.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use tracing::{debug, info};

use crate::wire::{Event, EventCodec};

/// Events a viewer may lag behind before it is disconnected.
pub(crate) const OUTBOUND_CAPACITY: usize = 8;

// ── ViewerHandle / ViewerRegistry ────────────────────────────────

/// Registry-side handle to one connected viewer. Dropping it closes
/// the viewer's outbound queue, which ends its writer task.
#[derive(Debug, Clone)]
pub(crate) struct ViewerHandle {
    pub outbound: mpsc::Sender<Event>,
}

/// Set of currently connected viewers, shared between the server task
/// and the per-viewer I/O tasks. Supports concurrent add/remove/iterate;
/// no lock is held across an await point.
#[derive(Debug, Default)]
pub(crate) struct ViewerRegistry {
    inner: Mutex<HashMap<u64, ViewerHandle>>,
}

impl ViewerRegistry {
    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<u64, ViewerHandle>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn insert(&self, id: u64, handle: ViewerHandle) {
        self.lock().insert(id, handle);
    }

    pub fn remove(&self, id: u64) -> Option<ViewerHandle> {
        self.lock().remove(&id)
    }

    /// Snapshot of the current viewers in a stable iteration order.
    pub fn snapshot(&self) -> Vec<(u64, mpsc::Sender<Event>)> {
        let mut viewers: Vec<_> = self
            .lock()
            .iter()
            .map(|(id, h)| (*id, h.outbound.clone()))
            .collect();
        viewers.sort_by_key(|(id, _)| *id);
        viewers
    }

    /// Drop every viewer, closing all outbound queues.
    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }
}

// ── I/O tasks ────────────────────────────────────────────────────

/// Drain the viewer's outbound queue into the socket. Ends when the
/// registry drops the sender half or a send fails.
pub(crate) async fn write_loop(
    id: u64,
    mut sink: SplitSink<Framed<TcpStream, EventCodec>, Event>,
    mut outbound: mpsc::Receiver<Event>,
    registry: Arc<ViewerRegistry>,
) {
    while let Some(event) = outbound.recv().await {
        if let Err(e) = sink.send(event).await {
            if registry.remove(id).is_some() {
                info!(viewer = id, error = %e, "viewer delivery failed; disconnecting");
            }
            return;
        }
    }
    // Outbound queue dropped — registry removal already happened.
    let _ = sink.close().await;
}

/// Drain anything the viewer sends on the duplex channel and notice
/// disconnects. Incoming events carry no protocol obligation.
pub(crate) async fn read_loop(
    id: u64,
    mut stream: SplitStream<Framed<TcpStream, EventCodec>>,
    registry: Arc<ViewerRegistry>,
) {
    while let Some(result) = stream.next().await {
        match result {
            Ok(event) => debug!(viewer = id, ?event, "viewer event"),
            Err(e) => {
                if registry.remove(id).is_some() {
                    info!(viewer = id, error = %e, "viewer read error; disconnecting");
                }
                return;
            }
        }
    }
    if registry.remove(id).is_some() {
        info!(viewer = id, "viewer disconnected");
    }
}

// ── Tests ────────────────────────────────────────────────────────
